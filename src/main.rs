use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stoloto_lib::config;
use stoloto_lib::database;
use stoloto_lib::fetcher::HttpFetcher;
use stoloto_lib::loader::{LoadTargets, Loader};

#[derive(Parser)]
#[command(name = "stoloto-loader")]
#[command(version, about = "Load Stoloto lottery data into the local store", long_about = None)]
struct Cli {
    /// Load lottery catalog pages
    #[arg(long)]
    lotteries: bool,

    /// Load draw archive pages
    #[arg(long)]
    draws: bool,

    /// Load everything (default when no flag is given)
    #[arg(long)]
    all: bool,
}

impl Cli {
    fn targets(&self) -> LoadTargets {
        if self.all || !(self.lotteries || self.draws) {
            return LoadTargets::all();
        }
        LoadTargets {
            lotteries: self.lotteries,
            draws: self.draws,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("🎲 Starting Stoloto data load");

    let conn = database::open(&config.database_url)
        .with_context(|| format!("Failed to open store {}", config.database_url))?;
    let fetcher = HttpFetcher::new(&config.scraper)?;
    let loader = Loader::new(&conn, &fetcher, &config.scraper)?;

    let report = loader.run(cli.targets()).await.inspect_err(|e| {
        tracing::error!("❌ Data load aborted: {}", e);
    })?;

    tracing::info!(
        "✅ Data load complete: {} lotteries, {} draws, {} prize categories",
        report.lotteries.loaded,
        report.draws.loaded,
        report.prize_categories.loaded
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_means_all() {
        let cli = Cli::parse_from(["stoloto-loader"]);
        assert_eq!(cli.targets(), LoadTargets::all());
    }

    #[test]
    fn test_single_target() {
        let cli = Cli::parse_from(["stoloto-loader", "--draws"]);
        assert_eq!(
            cli.targets(),
            LoadTargets {
                lotteries: false,
                draws: true
            }
        );

        let cli = Cli::parse_from(["stoloto-loader", "--lotteries", "--all"]);
        assert_eq!(cli.targets(), LoadTargets::all());
    }
}
