pub mod analytics;
pub mod catalog;
pub mod config;
pub mod database;
pub mod draw;
pub mod fetcher;
pub mod llm;
pub mod loader;
pub mod recommendations;
pub mod scoring;
pub mod sitemap;
pub mod types;
pub mod utils;

pub use types::*;
