//! Preference match scoring.
//!
//! Each factor contributes only when both the preference and the lottery
//! attribute it compares are present; the final score is the earned share
//! of the weights that applied, scaled to 0..=100.

use std::fmt;

use crate::types::{LotterySummary, LotteryType, PrizeType, RiskProfile, UserPreferences};

pub const BUDGET_WEIGHT: f64 = 30.0;
pub const TYPE_WEIGHT: f64 = 25.0;
pub const PRIZE_SIZE_WEIGHT: f64 = 20.0;
pub const PROBABILITY_WEIGHT: f64 = 15.0;
pub const RISK_WEIGHT: f64 = 10.0;

const OPPOSITE_TYPE_POINTS: f64 = 10.0;
const OFF_BUCKET_POINTS: f64 = 10.0;
const MODERATE_RISK_POINTS: f64 = 7.0;

/// Score when no factor applies.
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    Budget,
    LotteryType,
    PrizeSize,
    WinProbability,
    Risk,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorScore {
    pub factor: Factor,
    pub points: f64,
    pub weight: f64,
}

impl Factor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::Budget => "budget",
            Factor::LotteryType => "lottery_type",
            Factor::PrizeSize => "prize_size",
            Factor::WinProbability => "win_probability",
            Factor::Risk => "risk",
        }
    }
}

impl fmt::Display for FactorScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.1}/{}", self.factor.as_str(), self.points, self.weight)
    }
}

/// One-line breakdown for logs, e.g. `budget 20.0/30, risk 10.0/10`.
pub fn describe_factors(factors: &[FactorScore]) -> String {
    if factors.is_empty() {
        return "no applicable factors".to_string();
    }
    factors
        .iter()
        .map(FactorScore::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn budget_points(price: f64, budget: f64) -> f64 {
    if price <= budget {
        BUDGET_WEIGHT * (price / budget)
    } else {
        (BUDGET_WEIGHT * (1.0 - (price - budget) / budget)).max(0.0)
    }
}

fn type_points(preferred: PrizeType, actual: LotteryType) -> f64 {
    match (preferred, actual) {
        (PrizeType::Both, _)
        | (PrizeType::Instant, LotteryType::Instant)
        | (PrizeType::Draw, LotteryType::Draw) => TYPE_WEIGHT,
        _ => OPPOSITE_TYPE_POINTS,
    }
}

fn prize_size_points(lower: f64, upper: Option<f64>, max_prize: f64) -> f64 {
    let in_bucket = max_prize >= lower && upper.is_none_or(|upper| max_prize < upper);
    if in_bucket {
        PRIZE_SIZE_WEIGHT
    } else if max_prize < lower {
        OFF_BUCKET_POINTS * (max_prize / lower)
    } else {
        OFF_BUCKET_POINTS
    }
}

fn probability_points(avg: f64, min: f64) -> f64 {
    if avg >= min {
        PROBABILITY_WEIGHT
    } else {
        PROBABILITY_WEIGHT * (avg / min)
    }
}

fn risk_points(profile: RiskProfile, actual: LotteryType) -> f64 {
    match (profile, actual) {
        (RiskProfile::Conservative, LotteryType::Instant) => RISK_WEIGHT,
        (RiskProfile::Aggressive, LotteryType::Draw) => RISK_WEIGHT,
        (RiskProfile::Moderate, _) => MODERATE_RISK_POINTS,
        _ => 0.0,
    }
}

/// Per-factor breakdown, containing only the factors that applied.
pub fn explain_factors(lottery: &LotterySummary, prefs: &UserPreferences) -> Vec<FactorScore> {
    let record = &lottery.record;
    let mut factors = Vec::new();

    if let (Some(budget), Some(price)) = (prefs.budget, record.ticket_price) {
        if budget > 0.0 && price > 0.0 {
            factors.push(FactorScore {
                factor: Factor::Budget,
                points: budget_points(price, budget),
                weight: BUDGET_WEIGHT,
            });
        }
    }

    if let Some(preferred) = prefs.preferred_prize_type {
        factors.push(FactorScore {
            factor: Factor::LotteryType,
            points: type_points(preferred, record.lottery_type),
            weight: TYPE_WEIGHT,
        });
    }

    if let (Some(size), Some(max_prize)) = (prefs.preferred_prize_size, record.max_prize) {
        if max_prize > 0.0 {
            let (lower, upper) = size.bounds();
            factors.push(FactorScore {
                factor: Factor::PrizeSize,
                points: prize_size_points(lower, upper, max_prize),
                weight: PRIZE_SIZE_WEIGHT,
            });
        }
    }

    if let (Some(min), Some(avg)) = (prefs.min_acceptable_probability, lottery.avg_win_probability) {
        if min > 0.0 {
            factors.push(FactorScore {
                factor: Factor::WinProbability,
                points: probability_points(avg, min),
                weight: PROBABILITY_WEIGHT,
            });
        }
    }

    if let Some(profile) = prefs.risk_profile {
        factors.push(FactorScore {
            factor: Factor::Risk,
            points: risk_points(profile, record.lottery_type),
            weight: RISK_WEIGHT,
        });
    }

    factors
}

/// Combines a breakdown into a score in `[0, 100]`.
pub fn score_from_factors(factors: &[FactorScore]) -> f64 {
    let max_score: f64 = factors.iter().map(|f| f.weight).sum();
    if max_score <= 0.0 {
        return NEUTRAL_SCORE;
    }

    let earned: f64 = factors.iter().map(|f| f.points).sum();
    (earned / max_score * 100.0).clamp(0.0, 100.0)
}

/// Match score in `[0, 100]`.
pub fn score(lottery: &LotterySummary, prefs: &UserPreferences) -> f64 {
    score_from_factors(&explain_factors(lottery, prefs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LotteryRecord, PrizeSize};

    fn lottery(lottery_type: LotteryType, price: Option<f64>, max_prize: Option<f64>) -> LotterySummary {
        LotterySummary {
            id: 1,
            record: LotteryRecord {
                name: "Test".to_string(),
                slug: "test".to_string(),
                lottery_type,
                ticket_price: price,
                draw_frequency: None,
                description: None,
                max_prize,
                url: "https://www.stoloto.ru/test".to_string(),
                is_active: true,
            },
            avg_win_probability: None,
            total_draws: 0,
        }
    }

    fn budget_only(budget: f64) -> UserPreferences {
        UserPreferences {
            budget: Some(budget),
            ..UserPreferences::default()
        }
    }

    #[test]
    fn test_no_preferences_is_neutral() {
        let l = lottery(LotteryType::Draw, Some(100.0), Some(1_000_000.0));
        assert_eq!(score(&l, &UserPreferences::default()), 50.0);
    }

    #[test]
    fn test_missing_lottery_side_drops_factor() {
        let l = lottery(LotteryType::Draw, None, None);
        let prefs = UserPreferences {
            budget: Some(100.0),
            preferred_prize_size: Some(PrizeSize::Small),
            min_acceptable_probability: Some(0.1),
            ..UserPreferences::default()
        };
        assert!(explain_factors(&l, &prefs).is_empty());
        assert_eq!(score(&l, &prefs), 50.0);
    }

    #[test]
    fn test_zero_budget_or_price_drops_factor() {
        let l = lottery(LotteryType::Draw, Some(0.0), None);
        assert_eq!(score(&l, &budget_only(100.0)), 50.0);

        let l = lottery(LotteryType::Draw, Some(100.0), None);
        assert_eq!(score(&l, &budget_only(0.0)), 50.0);
    }

    #[test]
    fn test_budget_monotonicity() {
        let prefs = budget_only(100.0);
        let below: Vec<f64> = [20.0, 50.0, 80.0, 100.0]
            .iter()
            .map(|p| score(&lottery(LotteryType::Draw, Some(*p), None), &prefs))
            .collect();
        assert!(below.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(below[3], 100.0);

        let above: Vec<f64> = [120.0, 150.0, 190.0]
            .iter()
            .map(|p| score(&lottery(LotteryType::Draw, Some(*p), None), &prefs))
            .collect();
        assert!(above.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(score(&lottery(LotteryType::Draw, Some(300.0), None), &prefs), 0.0);
    }

    #[test]
    fn test_type_factor() {
        let prefs = UserPreferences {
            preferred_prize_type: Some(PrizeType::Instant),
            ..UserPreferences::default()
        };
        assert_eq!(score(&lottery(LotteryType::Instant, None, None), &prefs), 100.0);
        assert_eq!(score(&lottery(LotteryType::Draw, None, None), &prefs), 40.0);

        let both = UserPreferences {
            preferred_prize_type: Some(PrizeType::Both),
            ..UserPreferences::default()
        };
        assert_eq!(score(&lottery(LotteryType::Draw, None, None), &both), 100.0);
    }

    #[test]
    fn test_prize_buckets_are_half_open() {
        let medium = UserPreferences {
            preferred_prize_size: Some(PrizeSize::Medium),
            ..UserPreferences::default()
        };
        let at_upper = lottery(LotteryType::Draw, None, Some(100_000.0));
        assert_eq!(score(&at_upper, &medium), 50.0);

        let at_lower = lottery(LotteryType::Draw, None, Some(10_000.0));
        assert_eq!(score(&at_lower, &medium), 100.0);

        let below = lottery(LotteryType::Draw, None, Some(5_000.0));
        assert_eq!(score(&below, &medium), 25.0);

        let jackpot = UserPreferences {
            preferred_prize_size: Some(PrizeSize::Jackpot),
            ..UserPreferences::default()
        };
        let huge = lottery(LotteryType::Draw, None, Some(500_000_000.0));
        assert_eq!(score(&huge, &jackpot), 100.0);
    }

    #[test]
    fn test_probability_factor() {
        let prefs = UserPreferences {
            min_acceptable_probability: Some(0.2),
            ..UserPreferences::default()
        };
        let mut l = lottery(LotteryType::Draw, None, None);
        l.avg_win_probability = Some(0.1);
        assert_eq!(score(&l, &prefs), 50.0);

        l.avg_win_probability = Some(0.3);
        assert_eq!(score(&l, &prefs), 100.0);
    }

    #[test]
    fn test_risk_mismatch_still_counts() {
        let prefs = UserPreferences {
            risk_profile: Some(RiskProfile::Conservative),
            ..UserPreferences::default()
        };
        assert_eq!(score(&lottery(LotteryType::Draw, None, None), &prefs), 0.0);

        let moderate = UserPreferences {
            risk_profile: Some(RiskProfile::Moderate),
            ..UserPreferences::default()
        };
        let s = score(&lottery(LotteryType::Draw, None, None), &moderate);
        assert!((s - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_end_to_end_score() {
        let l = lottery(LotteryType::Draw, Some(100.0), Some(5_000_000.0));
        let prefs = UserPreferences {
            user_id: 1,
            budget: Some(150.0),
            preferred_prize_type: Some(PrizeType::Draw),
            preferred_prize_size: Some(PrizeSize::Large),
            min_acceptable_probability: None,
            risk_profile: Some(RiskProfile::Aggressive),
        };

        let factors = explain_factors(&l, &prefs);
        let points: Vec<(Factor, f64)> = factors.iter().map(|f| (f.factor, f.points)).collect();
        assert_eq!(points.len(), 4);
        assert!((points[0].1 - 20.0).abs() < 1e-9);
        assert_eq!(points[1], (Factor::LotteryType, 25.0));
        assert_eq!(points[2], (Factor::PrizeSize, 10.0));
        assert_eq!(points[3], (Factor::Risk, 10.0));

        let s = score(&l, &prefs);
        assert!((s - 65.0 / 85.0 * 100.0).abs() < 1e-9);
        assert!((s - 76.47).abs() < 0.01);
    }

    #[test]
    fn test_breakdown_description() {
        let l = lottery(LotteryType::Draw, Some(100.0), Some(5_000_000.0));
        let prefs = UserPreferences {
            budget: Some(150.0),
            risk_profile: Some(RiskProfile::Aggressive),
            ..UserPreferences::default()
        };
        let factors = explain_factors(&l, &prefs);

        assert_eq!(describe_factors(&factors), "budget 20.0/30, risk 10.0/10");
        assert_eq!(score_from_factors(&factors), score(&l, &prefs));
        assert_eq!(describe_factors(&[]), "no applicable factors");
    }

    #[test]
    fn test_score_bounds() {
        let prefs = UserPreferences {
            user_id: 1,
            budget: Some(10.0),
            preferred_prize_type: Some(PrizeType::Instant),
            preferred_prize_size: Some(PrizeSize::Small),
            min_acceptable_probability: Some(0.5),
            risk_profile: Some(RiskProfile::Conservative),
        };
        for price in [1.0, 10.0, 1000.0] {
            for max_prize in [1.0, 9_999.0, 1e9] {
                let mut l = lottery(LotteryType::Draw, Some(price), Some(max_prize));
                l.avg_win_probability = Some(0.01);
                let s = score(&l, &prefs);
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }
}
