use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maps a fieldless enum onto its lowercase TEXT column value.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotteryType {
    Instant,
    Draw,
}

text_enum!(LotteryType { Instant => "instant", Draw => "draw" });

impl LotteryType {
    /// The type is a property of the URL shape only.
    pub fn from_url(url: &str) -> Self {
        if url.contains("/instant/") {
            LotteryType::Instant
        } else {
            LotteryType::Draw
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeType {
    Instant,
    Draw,
    Both,
}

text_enum!(PrizeType { Instant => "instant", Draw => "draw", Both => "both" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeSize {
    Small,
    Medium,
    Large,
    Jackpot,
}

text_enum!(PrizeSize {
    Small => "small",
    Medium => "medium",
    Large => "large",
    Jackpot => "jackpot",
});

impl PrizeSize {
    /// Half-open `[lower, upper)` bucket; `upper` is `None` for the open-ended jackpot bucket.
    pub fn bounds(&self) -> (f64, Option<f64>) {
        match self {
            PrizeSize::Small => (0.0, Some(10_000.0)),
            PrizeSize::Medium => (10_000.0, Some(100_000.0)),
            PrizeSize::Large => (100_000.0, Some(1_000_000.0)),
            PrizeSize::Jackpot => (1_000_000.0, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

text_enum!(RiskProfile {
    Conservative => "conservative",
    Moderate => "moderate",
    Aggressive => "aggressive",
});

/// A lottery as produced by the catalog extractor, before it has a store id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryRecord {
    pub name: String,
    pub slug: String,
    pub lottery_type: LotteryType,
    pub ticket_price: Option<f64>,
    pub draw_frequency: Option<String>,
    pub description: Option<String>,
    pub max_prize: Option<f64>,
    pub url: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotteryRow {
    pub id: i64,
    #[serde(flatten)]
    pub record: LotteryRecord,
    pub created_at: String,
    pub updated_at: String,
}

/// Catalog listing filter; `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotteryFilter {
    pub active_only: bool,
    pub lottery_type: Option<LotteryType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotteryStatistics {
    pub total_draws: i64,
    pub avg_prize_fund: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotteryListing {
    #[serde(flatten)]
    pub lottery: LotteryRow,
    pub statistics: LotteryStatistics,
}

/// Scorer input: a stored lottery plus its draw/category aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct LotterySummary {
    pub id: i64,
    #[serde(flatten)]
    pub record: LotteryRecord,
    pub avg_win_probability: Option<f64>,
    pub total_draws: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawRecord {
    pub lottery_id: i64,
    pub draw_number: i64,
    /// Date exactly as the source supplied it.
    pub draw_date: Option<String>,
    pub draw_day: Option<NaiveDate>,
    pub winning_numbers: Option<String>,
    pub total_prize_fund: Option<f64>,
    pub winners_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrizeCategoryRecord {
    pub lottery_id: i64,
    pub category_name: String,
    pub prize_amount: Option<f64>,
    pub winners_count: Option<i64>,
    pub probability: Option<f64>,
}

/// One draw page worth of normalized data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDraw {
    pub draw: DrawRecord,
    pub categories: Vec<PrizeCategoryRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawRow {
    pub id: i64,
    pub lottery_id: i64,
    pub draw_number: i64,
    pub draw_date: Option<String>,
    pub draw_day: Option<String>,
    pub winning_numbers: Option<String>,
    pub total_prize_fund: Option<f64>,
    pub winners_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrizeCategoryRow {
    pub id: i64,
    pub draw_id: i64,
    pub lottery_id: i64,
    pub category_name: String,
    pub prize_amount: Option<f64>,
    pub winners_count: Option<i64>,
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub user_id: i64,
    pub budget: Option<f64>,
    pub preferred_prize_type: Option<PrizeType>,
    pub preferred_prize_size: Option<PrizeSize>,
    pub min_acceptable_probability: Option<f64>,
    pub risk_profile: Option<RiskProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub lottery: LotterySummary,
    pub score: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRow {
    pub id: i64,
    pub user_id: i64,
    pub lottery_id: i64,
    pub score: f64,
    pub explanation: Option<String>,
    pub created_at: String,
}

/// The newest stored recommendation of one lottery for one user.
#[derive(Debug, Clone, Serialize)]
pub struct LatestRecommendation {
    pub lottery_id: i64,
    pub score: f64,
    pub explanation: Option<String>,
    pub created_at: String,
    pub lottery: LotteryRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessageRow {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_user_message: bool,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lottery_type_from_url() {
        assert_eq!(
            LotteryType::from_url("https://www.stoloto.ru/instant/gold_horseshoe"),
            LotteryType::Instant
        );
        assert_eq!(
            LotteryType::from_url("https://www.stoloto.ru/4x20"),
            LotteryType::Draw
        );
        assert_eq!(
            LotteryType::from_url("https://www.stoloto.ru/loto/instantly"),
            LotteryType::Draw
        );
    }

    #[test]
    fn test_text_enum_parse() {
        assert_eq!("both".parse::<PrizeType>(), Ok(PrizeType::Both));
        assert_eq!("jackpot".parse::<PrizeSize>(), Ok(PrizeSize::Jackpot));
        assert!("risky".parse::<RiskProfile>().is_err());
        assert_eq!(RiskProfile::Moderate.to_string(), "moderate");
    }

    #[test]
    fn test_preferences_deserialize_partial() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"budget": 200, "preferred_prize_type": "draw"}"#).unwrap();
        assert_eq!(prefs.budget, Some(200.0));
        assert_eq!(prefs.preferred_prize_type, Some(PrizeType::Draw));
        assert!(prefs.risk_profile.is_none());
    }

    #[test]
    fn test_draw_day_serializes_as_iso_date() {
        let draw = DrawRecord {
            lottery_id: 1,
            draw_number: 1520,
            draw_date: Some("03.05.2024 21:00".to_string()),
            draw_day: NaiveDate::from_ymd_opt(2024, 5, 3),
            winning_numbers: None,
            total_prize_fund: None,
            winners_count: 0,
        };
        let value = serde_json::to_value(&draw).unwrap();
        assert_eq!(value["draw_day"], "2024-05-03");
        assert_eq!(value["draw_date"], "03.05.2024 21:00");
    }
}
