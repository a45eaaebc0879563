//! Draw (archive) page extraction.
//!
//! Draw pages ship their data as a dehydrated query cache inside a JSON
//! script tag. Several cached queries can look like a draw; each one is
//! scored by how many result-bearing fields it carries and the most
//! complete one is mapped into a `DrawRecord` plus its prize categories.

use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::types::{DrawRecord, ParsedDraw, PrizeCategoryRecord};
use crate::utils::normalize_draw_day;

pub const STATE_SCRIPT_SELECTOR: &str = "script#__NEXT_DATA__";
const JSON_SCRIPT_SELECTOR: &str = r#"script[type="application/json"]"#;
const QUERIES_POINTER: &str = "/props/pageProps/dehydratedState/queries";
const PAGE_PROPS_POINTER: &str = "/props/pageProps";

const DRAW_QUERY_NAMES: [&str; 2] = ["draw", "tirazh"];
const DRAW_QUERY_MARKER: &str = "draw";

const DRAW_NUMBER_FIELDS: [&str; 2] = ["number", "drawNumber"];
const DRAW_DATE_FIELDS: [&str; 3] = ["date", "drawDate", "drawTime"];
const PRIZE_FUND_FIELDS: [&str; 2] = ["prizeFund", "totalPrizeFund"];
const WIN_CATEGORIES_FIELD: &str = "winCategories";
const WINNING_NUMBERS_FIELD: &str = "winningNumbers";

const CATEGORY_TITLE_FIELDS: [&str; 2] = ["name", "title"];
const CATEGORY_INDEX_FIELDS: [&str; 2] = ["category", "index"];
const CATEGORY_AMOUNT_FIELDS: [&str; 2] = ["amount", "prize"];
const CATEGORY_WINNERS_FIELDS: [&str; 2] = ["winners", "winnersCount"];
const CATEGORY_NUMBERS_FIELD: &str = "numbers";

const SCORE_DRAW_NUMBER: u32 = 1;
const SCORE_WIN_CATEGORIES: u32 = 10;
const SCORE_WINNING_NUMBERS: u32 = 10;
const SCORE_PRIZE_FUND: u32 = 5;

#[derive(Debug, Error)]
pub enum DrawExtractError {
    #[error("page has no embedded state script")]
    MissingState,
    #[error("embedded state is not valid JSON: {0}")]
    MalformedState(#[from] serde_json::Error),
    #[error("no draw payload carries a draw number")]
    MissingDrawNumber,
}

/// Returns the parsed JSON of the page's state script.
pub fn extract_state_blob(html: &str) -> Result<Value, DrawExtractError> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(STATE_SCRIPT_SELECTOR) {
        if let Some(script) = document.select(&selector).next() {
            let text = script.text().collect::<String>();
            return Ok(serde_json::from_str(&text)?);
        }
    }

    if let Ok(selector) = Selector::parse(JSON_SCRIPT_SELECTOR) {
        for script in document.select(&selector) {
            let text = script.text().collect::<String>();
            if text.contains("dehydratedState") {
                return Ok(serde_json::from_str(&text)?);
            }
        }
    }

    Err(DrawExtractError::MissingState)
}

fn first_field<'v>(value: &'v Value, names: &[&str]) -> Option<&'v Value> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .find(|v| !v.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace([' ', '\u{a0}'], "").parse().ok(),
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

/// Integers, integral floats such as `1520.0`, and their string forms.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn query_tag(query: &Value) -> Option<&str> {
    match query.get("queryKey")? {
        Value::String(tag) => Some(tag),
        Value::Array(parts) => parts.first().and_then(Value::as_str),
        _ => None,
    }
}

pub fn is_draw_query(query: &Value) -> bool {
    match query_tag(query) {
        Some(tag) => {
            DRAW_QUERY_NAMES.contains(&tag)
                || tag.to_lowercase().contains(DRAW_QUERY_MARKER)
        }
        None => false,
    }
}

/// Strips one level of list wrapping, then a nested `draw` object.
fn unwrap_payload(data: &Value) -> &Value {
    let data = match data {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => data,
        },
        _ => data,
    };

    match data.get("draw") {
        Some(inner) if inner.is_object() => inner,
        _ => data,
    }
}

/// Payloads of all draw-like queries, in document order.
pub fn draw_candidates(state: &Value) -> Vec<&Value> {
    state
        .pointer(QUERIES_POINTER)
        .and_then(Value::as_array)
        .map(|queries| {
            queries
                .iter()
                .filter(|q| is_draw_query(q))
                .filter_map(|q| q.pointer("/state/data"))
                .map(unwrap_payload)
                .collect()
        })
        .unwrap_or_default()
}

fn has_collection(value: &Value, field: &str) -> bool {
    value.get(field).is_some_and(Value::is_array)
}

pub fn candidate_score(payload: &Value) -> u32 {
    let mut score = 0;
    if first_field(payload, &DRAW_NUMBER_FIELDS).is_some() {
        score += SCORE_DRAW_NUMBER;
    }
    if has_collection(payload, WIN_CATEGORIES_FIELD) {
        score += SCORE_WIN_CATEGORIES;
    }
    if has_collection(payload, WINNING_NUMBERS_FIELD) {
        score += SCORE_WINNING_NUMBERS;
    }
    if first_field(payload, &PRIZE_FUND_FIELDS).is_some() {
        score += SCORE_PRIZE_FUND;
    }
    score
}

/// Highest scoring candidate; on ties the earliest wins and a zero score never does.
pub fn select_candidate<'v>(candidates: &[&'v Value]) -> Option<&'v Value> {
    let mut best: Option<&'v Value> = None;
    let mut best_score = 0;

    for candidate in candidates {
        let score = candidate_score(candidate);
        debug!("Draw candidate scored {}", score);
        if score > best_score {
            best_score = score;
            best = Some(*candidate);
        }
    }

    best
}

fn category_name(category: &Value) -> String {
    let title = first_field(category, &CATEGORY_TITLE_FIELDS).and_then(|title| match title {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(_) => first_field(title, &["ru", "en"])
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        _ => None,
    });

    match title.filter(|t| !t.is_empty()) {
        Some(title) => title,
        None => first_field(category, &CATEGORY_INDEX_FIELDS)
            .and_then(as_i64)
            .map(|index| index.to_string())
            .unwrap_or_default(),
    }
}

fn map_category(category: &Value, lottery_id: i64) -> PrizeCategoryRecord {
    PrizeCategoryRecord {
        lottery_id,
        category_name: category_name(category),
        prize_amount: first_field(category, &CATEGORY_AMOUNT_FIELDS).and_then(as_f64),
        winners_count: first_field(category, &CATEGORY_WINNERS_FIELDS).and_then(as_i64),
        probability: None,
    }
}

fn push_numbers(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| push_numbers(item, out)),
        Value::Number(n) => out.push(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        _ => {}
    }
}

fn winning_numbers(payload: &Value, categories: &[Value]) -> Option<String> {
    let mut numbers = Vec::new();

    if let Some(direct) = payload.get(WINNING_NUMBERS_FIELD) {
        push_numbers(direct, &mut numbers);
    }

    if numbers.is_empty() {
        for category in categories {
            if let Some(per_category) = category.get(CATEGORY_NUMBERS_FIELD) {
                push_numbers(per_category, &mut numbers);
            }
        }
    }

    if numbers.is_empty() {
        None
    } else {
        Some(numbers.join(","))
    }
}

/// Maps a chosen payload to normalized records.
pub fn map_draw(payload: &Value, lottery_id: i64) -> Result<ParsedDraw, DrawExtractError> {
    let draw_number = first_field(payload, &DRAW_NUMBER_FIELDS)
        .and_then(as_i64)
        .ok_or(DrawExtractError::MissingDrawNumber)?;

    let draw_date = first_field(payload, &DRAW_DATE_FIELDS).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let draw_day = draw_date.as_deref().and_then(normalize_draw_day);

    let raw_categories: &[Value] = payload
        .get(WIN_CATEGORIES_FIELD)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let categories: Vec<PrizeCategoryRecord> = raw_categories
        .iter()
        .map(|category| map_category(category, lottery_id))
        .collect();

    let winners_count = categories
        .iter()
        .map(|c| c.winners_count.unwrap_or(0))
        .sum();

    let draw = DrawRecord {
        lottery_id,
        draw_number,
        draw_date,
        draw_day,
        winning_numbers: winning_numbers(payload, raw_categories),
        total_prize_fund: first_field(payload, &PRIZE_FUND_FIELDS).and_then(as_f64),
        winners_count,
    };

    Ok(ParsedDraw { draw, categories })
}

/// Extracts one draw from a draw page's embedded state.
pub fn extract_draw(html: &str, lottery_id: i64) -> Result<ParsedDraw, DrawExtractError> {
    let state = extract_state_blob(html)?;
    let candidates = draw_candidates(&state);

    let payload = match select_candidate(&candidates) {
        Some(payload) => payload,
        None => state
            .pointer(PAGE_PROPS_POINTER)
            .filter(|props| first_field(props, &DRAW_NUMBER_FIELDS).is_some())
            .ok_or(DrawExtractError::MissingDrawNumber)?,
    };

    map_draw(payload, lottery_id)
}
