use anyhow::Result;
use stoloto_lib::config::{self as shared, LlmConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub llm: LlmConfig,
    pub default_top_n: usize,
}

pub fn load() -> Result<Config> {
    let shared = shared::load()?;

    Ok(Config {
        database_url: shared.database_url,
        llm: shared.llm,
        default_top_n: shared::parse_var("STOLOTO_DEFAULT_TOP_N", 10)?,
    })
}
