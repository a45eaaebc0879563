//! Pipeline coordinator: discovery, extraction and persistence.
//!
//! Every page and every record is handled in isolation. Only a failure of
//! the store itself (see `database::is_connection_failure`) stops a run;
//! everything else is logged and counted in the `LoadReport`.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogError, CatalogExtractor};
use crate::config::ScraperConfig;
use crate::database;
use crate::draw::extract_draw;
use crate::fetcher::PageSource;
use crate::sitemap::{resolve_archive_urls, resolve_catalog_urls};
use crate::types::{LotteryRecord, LotteryType, ParsedDraw};
use crate::utils::path_segments;

const ARCHIVE_SEGMENT: &str = "archive";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("store is unusable: {0}")]
    Store(#[from] rusqlite::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loaded {}, failed {}, skipped {}",
            self.loaded, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub lotteries: EntityCounts,
    pub draws: EntityCounts,
    pub prize_categories: EntityCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTargets {
    pub lotteries: bool,
    pub draws: bool,
}

impl LoadTargets {
    pub fn all() -> Self {
        Self {
            lotteries: true,
            draws: true,
        }
    }
}

pub struct Loader<'a, S: PageSource + ?Sized> {
    conn: &'a Connection,
    source: &'a S,
    config: &'a ScraperConfig,
    catalog: CatalogExtractor,
}

impl<'a, S: PageSource + ?Sized> Loader<'a, S> {
    pub fn new(
        conn: &'a Connection,
        source: &'a S,
        config: &'a ScraperConfig,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            conn,
            source,
            config,
            catalog: CatalogExtractor::new()?,
        })
    }

    pub async fn run(&self, targets: LoadTargets) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();

        if targets.lotteries {
            self.load_lotteries(&mut report).await?;
        }
        if targets.draws {
            self.load_draws(&mut report).await?;
        }

        info!("🎰 Lotteries: {}", report.lotteries);
        info!("🎰 Draws: {}", report.draws);
        info!("🎰 Prize categories: {}", report.prize_categories);
        Ok(report)
    }

    pub async fn load_lotteries(&self, report: &mut LoadReport) -> Result<(), LoadError> {
        info!("📥 Loading lotteries");
        let urls = resolve_catalog_urls(self.source, &self.config.sitemap_main_url).await;

        if urls.is_empty() {
            warn!("⚠ No lottery pages discovered, loading built-in catalog");
            return self.load_fallback_lotteries(report);
        }

        let mut records = Vec::new();
        for url in urls.iter().take(self.config.max_lottery_pages) {
            let html = match self.source.fetch_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("✗ Skipping lottery page {}: {}", url, e);
                    report.lotteries.failed += 1;
                    continue;
                }
            };
            records.push(self.catalog.extract(url, &html));
        }

        self.load_lottery_records(&records, report)
    }

    pub fn load_lottery_records(
        &self,
        records: &[LotteryRecord],
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        for record in records {
            match database::upsert_lottery(self.conn, record) {
                Ok(id) => {
                    debug!("✓ Lottery {} stored as {}", record.name, id);
                    report.lotteries.loaded += 1;
                }
                Err(e) if database::is_connection_failure(&e) => return Err(e.into()),
                Err(e) => {
                    error!("✗ Error loading lottery {}: {}", record.name, e);
                    report.lotteries.failed += 1;
                }
            }
        }
        Ok(())
    }

    fn load_fallback_lotteries(&self, report: &mut LoadReport) -> Result<(), LoadError> {
        for record in fallback_lotteries() {
            match database::insert_lottery_if_absent(self.conn, &record) {
                Ok(true) => report.lotteries.loaded += 1,
                Ok(false) => report.lotteries.skipped += 1,
                Err(e) if database::is_connection_failure(&e) => return Err(e.into()),
                Err(e) => {
                    error!("✗ Error loading lottery {}: {}", record.name, e);
                    report.lotteries.failed += 1;
                }
            }
        }
        Ok(())
    }

    pub async fn load_draws(&self, report: &mut LoadReport) -> Result<(), LoadError> {
        info!("📥 Loading draws");
        let slugs: HashMap<String, i64> = database::list_lotteries(self.conn, true)?
            .into_iter()
            .map(|row| (row.record.slug, row.id))
            .collect();

        if slugs.is_empty() {
            info!("No active lotteries, nothing to load");
            return Ok(());
        }

        let urls = resolve_archive_urls(self.source, &self.config.sitemap_archive_url).await;

        let mut parsed = Vec::new();
        for url in urls.iter().take(self.config.max_archive_pages) {
            let Some(lottery_id) = owning_lottery_id(url, &slugs) else {
                debug!("No stored lottery owns {}", url);
                report.draws.skipped += 1;
                continue;
            };

            let html = match self.source.fetch_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("✗ Skipping draw page {}: {}", url, e);
                    report.draws.failed += 1;
                    continue;
                }
            };

            match extract_draw(&html, lottery_id) {
                Ok(draw) => parsed.push(draw),
                Err(e) => {
                    warn!("✗ Could not extract draw from {}: {}", url, e);
                    report.draws.failed += 1;
                }
            }
        }

        self.load_parsed_draws(&parsed, report)
    }

    pub fn load_parsed_draws(
        &self,
        draws: &[ParsedDraw],
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        for parsed in draws {
            let category_count = parsed.categories.len();
            match database::save_draw(self.conn, &parsed.draw, &parsed.categories) {
                Ok(_) => {
                    debug!(
                        "✓ Draw {} of lottery {} stored",
                        parsed.draw.draw_number, parsed.draw.lottery_id
                    );
                    report.draws.loaded += 1;
                    report.prize_categories.loaded += category_count;
                }
                Err(e) if database::is_connection_failure(&e) => return Err(e.into()),
                Err(e) => {
                    error!(
                        "✗ Error loading draw {} of lottery {}: {}",
                        parsed.draw.draw_number, parsed.draw.lottery_id, e
                    );
                    report.draws.failed += 1;
                    report.prize_categories.failed += category_count;
                }
            }
        }
        Ok(())
    }
}

/// The stored lottery an archive URL belongs to: the path segment next to
/// `archive`, the one before it taking precedence.
pub fn owning_lottery_id(url: &str, slugs: &HashMap<String, i64>) -> Option<i64> {
    let segments = path_segments(url);
    let pos = segments.iter().position(|s| s == ARCHIVE_SEGMENT)?;

    let before = pos.checked_sub(1).and_then(|i| segments.get(i));
    let after = segments.get(pos + 1);

    [before, after]
        .into_iter()
        .flatten()
        .find_map(|segment| slugs.get(segment).copied())
}

fn fallback(
    name: &str,
    slug: &str,
    lottery_type: LotteryType,
    ticket_price: f64,
    draw_frequency: Option<&str>,
    description: &str,
    max_prize: f64,
) -> LotteryRecord {
    let url = match lottery_type {
        LotteryType::Instant => format!("https://www.stoloto.ru/instant/{}", slug),
        LotteryType::Draw => format!("https://www.stoloto.ru/{}", slug),
    };

    LotteryRecord {
        name: name.to_string(),
        slug: slug.to_string(),
        lottery_type,
        ticket_price: Some(ticket_price),
        draw_frequency: draw_frequency.map(str::to_string),
        description: Some(description.to_string()),
        max_prize: Some(max_prize),
        url,
        is_active: true,
    }
}

/// Built-in catalog used when sitemap discovery yields nothing.
pub fn fallback_lotteries() -> Vec<LotteryRecord> {
    vec![
        fallback(
            "Русское лото",
            "rusloto",
            LotteryType::Draw,
            100.0,
            Some("1 раз в неделю"),
            "Самая популярная числовая лотерея в России",
            500_000_000.0,
        ),
        fallback(
            "Жилищная лотерея",
            "housing",
            LotteryType::Draw,
            100.0,
            Some("1 раз в неделю"),
            "Лотерея с квартирами и крупными денежными призами",
            30_000_000.0,
        ),
        fallback(
            "Рапидо",
            "rapido",
            LotteryType::Draw,
            100.0,
            Some("каждые 15 минут"),
            "Быстрая лотерея с частыми розыгрышами",
            5_000_000.0,
        ),
        fallback(
            "4 из 20",
            "4iz20",
            LotteryType::Draw,
            100.0,
            Some("каждый день"),
            "Ежедневная лотерея с высокой вероятностью выигрыша",
            10_000_000.0,
        ),
        fallback(
            "6 из 45",
            "6iz45",
            LotteryType::Draw,
            60.0,
            Some("2 раза в неделю"),
            "Классическая числовая лотерея",
            250_000_000.0,
        ),
        fallback(
            "Золотая подкова",
            "gold_horseshoe",
            LotteryType::Instant,
            50.0,
            None,
            "Мгновенная лотерея",
            1_000_000.0,
        ),
        fallback(
            "Удача в придачу",
            "luck_extra",
            LotteryType::Instant,
            100.0,
            None,
            "Мгновенная лотерея с крупными призами",
            3_000_000.0,
        ),
    ]
}
