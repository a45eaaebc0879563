use anyhow::{Context, Result};
use rusqlite::Connection;
use stoloto_lib::database;

pub fn conn(database_url: &str) -> Result<Connection> {
    database::open(database_url).with_context(|| format!("Failed to open store {}", database_url))
}
