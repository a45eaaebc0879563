//! Catalog (lottery product) page extraction.
//!
//! Every field is recovered independently; a missing field never drops the
//! record. Text fields that the DOM does not expose are recovered from the
//! raw page with ordered regex chains where the first matching pattern wins.

use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::types::{LotteryRecord, LotteryType};
use crate::utils::{slug_from_url, slug_to_title};

const PRICE_PATTERNS: [&str; 3] = [
    r"(?i)(\d+)\s*(?:руб|₽)",
    r"(?i)цена.*?(\d+)",
    r"(?i)стоимость.*?(\d+)",
];

const FREQUENCY_PATTERNS: [&str; 2] = [
    r"(?i)розыгрыш.*?(каждый день|ежедневно|раз в неделю|\d+ раза? в неделю)",
    r"(?i)тираж.*?(каждый день|ежедневно|раз в неделю|\d+ раза? в неделю)",
];

const MAX_PRIZE_PATTERNS: [&str; 3] = [
    r"(?i)джекпот.*?(\d[\d\s]+)",
    r"(?i)главный приз.*?(\d[\d\s]+)",
    r"(?i)максимальный выигрыш.*?(\d[\d\s]+)",
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid field pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid selector {0}")]
    Selector(String),
}

/// Patterns tried in order; the first one that matches decides.
pub struct OrderedMatcher {
    patterns: Vec<Regex>,
}

impl OrderedMatcher {
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// First capture group of the first matching pattern.
    pub fn first_capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

pub struct CatalogExtractor {
    heading: Selector,
    meta_description: Selector,
    price: OrderedMatcher,
    frequency: OrderedMatcher,
    max_prize: OrderedMatcher,
}

fn selector(css: &str) -> Result<Selector, CatalogError> {
    Selector::parse(css).map_err(|e| CatalogError::Selector(format!("{}: {}", css, e)))
}

impl CatalogExtractor {
    pub fn new() -> Result<Self, CatalogError> {
        Ok(Self {
            heading: selector("h1")?,
            meta_description: selector(r#"meta[name="description"]"#)?,
            price: OrderedMatcher::new(&PRICE_PATTERNS)?,
            frequency: OrderedMatcher::new(&FREQUENCY_PATTERNS)?,
            max_prize: OrderedMatcher::new(&MAX_PRIZE_PATTERNS)?,
        })
    }

    pub fn extract(&self, url: &str, html: &str) -> LotteryRecord {
        let document = Html::parse_document(html);
        let slug = slug_from_url(url);
        let lottery_type = LotteryType::from_url(url);

        let name = document
            .select(&self.heading)
            .next()
            .map(|h1| h1.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| slug_to_title(&slug));

        let description = document
            .select(&self.meta_description)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());

        let draw_frequency = match lottery_type {
            LotteryType::Draw => self.frequency.first_capture(html).map(str::to_string),
            LotteryType::Instant => None,
        };

        let record = LotteryRecord {
            name,
            slug,
            lottery_type,
            ticket_price: self.ticket_price(html),
            draw_frequency,
            description,
            max_prize: self.max_prize(html),
            url: url.to_string(),
            is_active: true,
        };

        debug!("Extracted lottery {:?}", record);
        record
    }

    fn ticket_price(&self, text: &str) -> Option<f64> {
        self.price
            .first_capture(text)
            .and_then(|digits| digits.parse().ok())
    }

    fn max_prize(&self, text: &str) -> Option<f64> {
        let captured = self.max_prize.first_capture(text)?;
        parse_grouped_number(captured)
    }
}

/// `"500 000 000"` -> `500000000.0`; digit groups may be split by any whitespace.
pub fn parse_grouped_number(raw: &str) -> Option<f64> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    digits.parse().ok()
}
