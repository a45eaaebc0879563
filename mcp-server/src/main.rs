use anyhow::Result;
use std::sync::Arc;
use stoloto_lib::llm::OllamaClient;
use stoloto_lib::recommendations::RecommendationEngine;
use tracing_subscriber::EnvFilter;

mod config;
mod connection;
mod mcp_handler;
mod use_cases;

use connection::conn;
use mcp_handler::{MCPHandler, stdio};
use use_cases::{AnalyticsUseCase, ChatUseCase, LotteryUseCase, RecommendationUseCase};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Let's find you a lottery.");

    let db_conn = conn(&config.database_url)?;
    let db_conn_arc = Arc::new(db_conn);

    let llm = Arc::new(OllamaClient::new(&config.llm)?);
    if !llm.check_connection().await {
        tracing::warn!("⚠ LLM unavailable, explanations will use the built-in fallback");
    }

    let recommendation_use_case = RecommendationUseCase::new(
        Arc::clone(&db_conn_arc),
        RecommendationEngine::new(llm.clone()),
        config.default_top_n,
    );

    let lottery_use_case = LotteryUseCase::new(Arc::clone(&db_conn_arc));

    let analytics_use_case = AnalyticsUseCase::new(Arc::clone(&db_conn_arc));

    let chat_use_case = ChatUseCase::new(Arc::clone(&db_conn_arc), llm);

    let handler = MCPHandler::new(
        Arc::new(recommendation_use_case),
        Arc::new(lottery_use_case),
        Arc::new(analytics_use_case),
        Arc::new(chat_use_case),
    );

    let (reader, writer) = stdio();

    handler.serve(reader, writer).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    Ok(())
}
