use anyhow::Result;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database;
use crate::llm::ExplanationGenerator;
use crate::scoring;
use crate::types::{LatestRecommendation, Recommendation};
use crate::utils::fallback_explanation;

pub const POPULAR_SCORE: f64 = 75.0;
pub const POPULAR_EXPLANATION: &str = "Популярная лотерея";

/// How many stored recommendations `recommended_lotteries` returns.
pub const RECOMMENDED_LIMIT: usize = 10;
/// Size of the popularity list shown before any recommendation exists.
pub const POPULAR_FALLBACK_LIMIT: usize = 5;

/// What a user is shown as "recommended for you".
#[derive(Debug, Clone)]
pub enum RecommendedLotteries {
    /// The newest stored score per lottery.
    Latest(Vec<LatestRecommendation>),
    /// No history yet.
    Popular(Vec<Recommendation>),
}

/// Most recently recommended lotteries, or the popularity list when the
/// user has no stored recommendations.
pub fn recommended_lotteries(conn: &Connection, user_id: i64) -> Result<RecommendedLotteries> {
    let latest = database::get_latest_recommendations(conn, user_id, RECOMMENDED_LIMIT)?;
    if !latest.is_empty() {
        return Ok(RecommendedLotteries::Latest(latest));
    }
    Ok(RecommendedLotteries::Popular(popular_recommendations(
        conn,
        POPULAR_FALLBACK_LIMIT,
    )?))
}

pub fn popular_recommendations(conn: &Connection, limit: usize) -> Result<Vec<Recommendation>> {
    let popular = database::get_popular_lotteries(conn, limit)?
        .into_iter()
        .map(|lottery| Recommendation {
            lottery,
            score: POPULAR_SCORE,
            explanation: POPULAR_EXPLANATION.to_string(),
        })
        .collect();
    Ok(popular)
}

pub struct RecommendationEngine {
    generator: Arc<dyn ExplanationGenerator + Send + Sync>,
}

impl RecommendationEngine {
    pub fn new(generator: Arc<dyn ExplanationGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    /// Ranks active lotteries for a user and appends the result to the history.
    ///
    /// Users without stored preferences get the popularity list instead,
    /// which is not persisted.
    pub async fn generate_recommendations(
        &self,
        conn: &Connection,
        user_id: i64,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let Some(prefs) = database::get_user_preferences(conn, user_id)? else {
            info!("No preferences for user {}, returning popular lotteries", user_id);
            return popular_recommendations(conn, top_n);
        };

        let mut scored: Vec<Recommendation> = database::get_active_lottery_summaries(conn)?
            .into_iter()
            .map(|lottery| {
                let factors = scoring::explain_factors(&lottery, &prefs);
                let score = scoring::score_from_factors(&factors);
                debug!(
                    "{} scored {:.1} ({})",
                    lottery.record.name,
                    score,
                    scoring::describe_factors(&factors)
                );
                Recommendation {
                    score,
                    lottery,
                    explanation: String::new(),
                }
            })
            .collect();

        if scored.is_empty() {
            return Ok(scored);
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_n);

        for rec in scored.iter_mut() {
            rec.explanation = match self
                .generator
                .generate_explanation(&rec.lottery.record, &prefs, rec.score)
                .await
            {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => fallback_explanation(rec.score),
                Err(e) => {
                    warn!("⚠ Explanation for {} unavailable: {:#}", rec.lottery.record.name, e);
                    fallback_explanation(rec.score)
                }
            };
        }

        database::save_recommendations(conn, user_id, &scored)?;
        info!("🎯 {} recommendations generated for user {}", scored.len(), user_id);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::memory_store;
    use crate::loader::fallback_lotteries;
    use crate::types::{LotteryRecord, PrizeSize, PrizeType, RiskProfile, UserPreferences};
    use async_trait::async_trait;

    enum StubGenerator {
        Fixed,
        Empty,
        Failing,
    }

    #[async_trait]
    impl ExplanationGenerator for StubGenerator {
        async fn generate_explanation(
            &self,
            lottery: &LotteryRecord,
            _prefs: &UserPreferences,
            _score: f64,
        ) -> Result<String> {
            match self {
                StubGenerator::Fixed => Ok(format!("{} подходит", lottery.name)),
                StubGenerator::Empty => Ok("  ".to_string()),
                StubGenerator::Failing => Err(anyhow::anyhow!("model offline")),
            }
        }
    }

    fn seeded_store() -> Connection {
        let conn = memory_store();
        for lottery in fallback_lotteries() {
            database::insert_lottery_if_absent(&conn, &lottery).unwrap();
        }
        conn
    }

    fn prefs(user_id: i64) -> UserPreferences {
        UserPreferences {
            user_id,
            budget: Some(100.0),
            preferred_prize_type: Some(PrizeType::Instant),
            preferred_prize_size: Some(PrizeSize::Jackpot),
            min_acceptable_probability: None,
            risk_profile: Some(RiskProfile::Conservative),
        }
    }

    #[tokio::test]
    async fn test_ranked_and_persisted() {
        let conn = seeded_store();
        database::upsert_user_preferences(&conn, &prefs(1)).unwrap();
        let engine = RecommendationEngine::new(Arc::new(StubGenerator::Fixed));

        let recs = engine.generate_recommendations(&conn, 1, 3).await.unwrap();

        assert_eq!(recs.len(), 3);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(recs[0].lottery.record.slug, "luck_extra");
        assert_eq!(recs[0].explanation, "Удача в придачу подходит");

        let history = database::get_recent_recommendations(&conn, 1, 10).unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_ties_keep_store_order() {
        let conn = seeded_store();
        let neutral = UserPreferences {
            user_id: 2,
            ..UserPreferences::default()
        };
        database::upsert_user_preferences(&conn, &neutral).unwrap();
        let engine = RecommendationEngine::new(Arc::new(StubGenerator::Fixed));

        let recs = engine.generate_recommendations(&conn, 2, 10).await.unwrap();
        let slugs: Vec<&str> = recs.iter().map(|r| r.lottery.record.slug.as_str()).collect();
        let expected: Vec<String> = fallback_lotteries().into_iter().map(|l| l.slug).collect();

        assert_eq!(slugs, expected);
        assert!(recs.iter().all(|r| r.score == 50.0));
    }

    #[tokio::test]
    async fn test_explanation_fallbacks() {
        let conn = seeded_store();
        database::upsert_user_preferences(&conn, &prefs(1)).unwrap();

        for generator in [StubGenerator::Failing, StubGenerator::Empty] {
            let engine = RecommendationEngine::new(Arc::new(generator));
            let recs = engine.generate_recommendations(&conn, 1, 2).await.unwrap();
            for rec in &recs {
                assert_eq!(rec.explanation, fallback_explanation(rec.score));
            }
        }
    }

    #[tokio::test]
    async fn test_popular_when_no_preferences() {
        let conn = seeded_store();
        let engine = RecommendationEngine::new(Arc::new(StubGenerator::Fixed));

        let recs = engine.generate_recommendations(&conn, 42, 3).await.unwrap();

        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.score == POPULAR_SCORE));
        assert!(recs.iter().all(|r| r.explanation == POPULAR_EXPLANATION));
        assert_eq!(recs[0].lottery.record.name, "4 из 20");
        assert!(database::get_recent_recommendations(&conn, 42, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_lotteries_yields_nothing() {
        let conn = memory_store();
        database::upsert_user_preferences(&conn, &prefs(1)).unwrap();
        let engine = RecommendationEngine::new(Arc::new(StubGenerator::Fixed));

        let recs = engine.generate_recommendations(&conn, 1, 5).await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_recommended_lotteries_prefer_history() {
        let conn = seeded_store();

        let RecommendedLotteries::Popular(popular) = recommended_lotteries(&conn, 1).unwrap() else {
            panic!("expected the popularity list without history");
        };
        assert_eq!(popular.len(), POPULAR_FALLBACK_LIMIT);

        database::upsert_user_preferences(&conn, &prefs(1)).unwrap();
        let engine = RecommendationEngine::new(Arc::new(StubGenerator::Fixed));
        engine.generate_recommendations(&conn, 1, 3).await.unwrap();
        engine.generate_recommendations(&conn, 1, 3).await.unwrap();

        let RecommendedLotteries::Latest(latest) = recommended_lotteries(&conn, 1).unwrap() else {
            panic!("expected stored recommendations");
        };
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].lottery.slug, "luck_extra");
        assert!(latest.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
