use anyhow::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use stoloto_lib::analytics;
use stoloto_lib::database::{self, *};
use stoloto_lib::llm::{ChatContext, ChatTurn, OllamaClient, CHAT_APOLOGY};
use stoloto_lib::recommendations::{self, RecommendationEngine, RecommendedLotteries};
use stoloto_lib::types::{LotteryFilter, LotteryRow, LotteryType, UserPreferences};
use tracing::error;

const RECENT_DRAWS: i32 = 10;
const CHAT_HISTORY_TURNS: usize = 10;
const CHAT_PAGE_SIZE: usize = 50;
const PERSONALIZE_HINT: &str =
    "Showing popular lotteries. Complete your preferences to get personalized recommendations.";

fn required_i64(arguments: &HashMap<String, Value>, key: &str) -> Result<i64> {
    arguments
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", key))
}

fn optional_f64(arguments: &HashMap<String, Value>, key: &str) -> Option<f64> {
    arguments.get(key).and_then(|v| v.as_f64())
}

fn optional_usize(arguments: &HashMap<String, Value>, key: &str) -> Option<usize> {
    arguments.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
}

fn required_str<'a>(arguments: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", key))
}

pub struct RecommendationUseCase {
    connection: Arc<rusqlite::Connection>,
    engine: RecommendationEngine,
    default_top_n: usize,
}

impl RecommendationUseCase {
    pub fn new(
        connection: Arc<rusqlite::Connection>,
        engine: RecommendationEngine,
        default_top_n: usize,
    ) -> Self {
        Self {
            connection,
            engine,
            default_top_n,
        }
    }

    pub async fn generate_recommendations(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_i64(arguments, "user_id")?;
        let top_n = optional_usize(arguments, "top_n").unwrap_or(self.default_top_n);

        let recommendations = self
            .engine
            .generate_recommendations(&self.connection, user_id, top_n)
            .await?;

        Ok(json!({
            "success": true,
            "count": recommendations.len(),
            "recommendations": recommendations
        })
        .to_string())
    }

    pub async fn get_recommended_lotteries(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_i64(arguments, "user_id")?;

        let result = match recommendations::recommended_lotteries(&self.connection, user_id)? {
            RecommendedLotteries::Latest(latest) => json!({
                "success": true,
                "source": "history",
                "count": latest.len(),
                "recommendations": latest
            }),
            RecommendedLotteries::Popular(popular) => json!({
                "success": true,
                "source": "popular",
                "count": popular.len(),
                "recommendations": popular,
                "message": PERSONALIZE_HINT
            }),
        };

        Ok(result.to_string())
    }

    pub async fn get_preferences(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_i64(arguments, "user_id")?;
        let preferences = get_user_preferences(&self.connection, user_id)?;

        Ok(json!({
            "success": true,
            "preferences": preferences
        })
        .to_string())
    }

    pub async fn set_preferences(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        required_i64(arguments, "user_id")?;

        let raw: serde_json::Map<String, Value> = arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let preferences: UserPreferences = serde_json::from_value(Value::Object(raw))
            .map_err(|e| anyhow::anyhow!("Invalid preferences: {}", e))?;

        upsert_user_preferences(&self.connection, &preferences)?;

        Ok(json!({
            "success": true,
            "preferences": preferences
        })
        .to_string())
    }

    pub async fn delete_preferences(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_i64(arguments, "user_id")?;
        let deleted = delete_user_preferences(&self.connection, user_id)?;

        Ok(json!({
            "success": true,
            "deleted": deleted
        })
        .to_string())
    }
}

pub struct LotteryUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl LotteryUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn list_lotteries(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let lottery_type = match arguments.get("type").and_then(|v| v.as_str()) {
            Some(raw) => Some(
                raw.parse::<LotteryType>()
                    .map_err(|e| anyhow::anyhow!("Invalid type parameter: {}", e))?,
            ),
            None => None,
        };

        let filter = LotteryFilter {
            active_only: arguments
                .get("active_only")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            lottery_type,
            min_price: optional_f64(arguments, "min_price"),
            max_price: optional_f64(arguments, "max_price"),
        };

        let lotteries = search_lotteries(&self.connection, &filter)?;

        Ok(json!({
            "success": true,
            "count": lotteries.len(),
            "lotteries": lotteries
        })
        .to_string())
    }

    pub async fn get_lottery(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let lottery: Option<LotteryRow> = match arguments.get("lottery_id").and_then(|v| v.as_i64()) {
            Some(id) => get_lottery_by_id(&self.connection, id)?,
            None => get_lottery_by_slug(&self.connection, required_str(arguments, "slug")?)?,
        };
        let lottery = lottery.ok_or_else(|| anyhow::anyhow!("Lottery not found"))?;

        let draws = get_draws_by_lottery(&self.connection, lottery.id, Some(RECENT_DRAWS))?;
        let latest_categories = match draws.first() {
            Some(draw) => get_prize_categories_by_draw(&self.connection, draw.id)?,
            None => Vec::new(),
        };

        Ok(json!({
            "success": true,
            "lottery": lottery,
            "recent_draws": draws,
            "latest_prize_categories": latest_categories
        })
        .to_string())
    }
}

pub struct AnalyticsUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl AnalyticsUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn get_summary_statistics(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let stats = analytics::summary_statistics(&self.connection)?;

        Ok(json!({
            "success": true,
            "statistics": stats
        })
        .to_string())
    }

    pub async fn get_lottery_analytics(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let lottery_id = required_i64(arguments, "lottery_id")?;
        let result = analytics::lottery_analytics(&self.connection, lottery_id)?
            .ok_or_else(|| anyhow::anyhow!("Lottery not found"))?;

        Ok(json!({
            "success": true,
            "analytics": result
        })
        .to_string())
    }

    pub async fn get_win_probability(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let lottery_id = required_i64(arguments, "lottery_id")?;
        let result = analytics::win_probability(&self.connection, lottery_id)?;

        let message = if result.probabilities_by_category.is_empty() {
            Some("Insufficient data to calculate probabilities")
        } else {
            None
        };

        Ok(json!({
            "success": true,
            "message": message,
            "probability": result
        })
        .to_string())
    }
}

pub struct ChatUseCase {
    connection: Arc<rusqlite::Connection>,
    client: Arc<OllamaClient>,
}

impl ChatUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>, client: Arc<OllamaClient>) -> Self {
        Self { connection, client }
    }

    fn context(&self, user_id: Option<i64>, arguments: &HashMap<String, Value>) -> Result<ChatContext> {
        let preferences = match user_id {
            Some(user_id) => get_user_preferences(&self.connection, user_id)?,
            None => None,
        };

        let lotteries = list_lotteries(&self.connection, true)?
            .into_iter()
            .map(|row| row.record)
            .collect();

        Ok(ChatContext {
            user_name: arguments
                .get("user_name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            preferences,
            lotteries,
        })
    }

    /// Known users get their stored conversation as history and both turns
    /// persisted; anonymous callers may pass `history` themselves.
    pub async fn chat(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let message = required_str(arguments, "message")?.trim();
        if message.is_empty() {
            return Err(anyhow::anyhow!("Message cannot be empty"));
        }
        let user_id = arguments.get("user_id").and_then(|v| v.as_i64());

        let history: Vec<ChatTurn> = match (user_id, arguments.get("history")) {
            (Some(user_id), _) => {
                database::get_chat_history(&self.connection, user_id, CHAT_HISTORY_TURNS, 0)?
                    .into_iter()
                    .map(ChatTurn::from)
                    .collect()
            }
            (None, Some(raw)) => serde_json::from_value(raw.clone())?,
            (None, None) => Vec::new(),
        };

        let context = self.context(user_id, arguments)?;

        if let Some(user_id) = user_id {
            append_chat_message(&self.connection, user_id, message, true, None)?;
        }

        let answer = match self.client.try_chat(message, &context, &history).await {
            Ok(answer) => {
                if let Some(user_id) = user_id {
                    let context_data = serde_json::to_string(&context)?;
                    append_chat_message(&self.connection, user_id, &answer, false, Some(&context_data))?;
                }
                answer
            }
            Err(e) => {
                error!("✗ Chat completion failed: {:#}", e);
                CHAT_APOLOGY.to_string()
            }
        };

        Ok(json!({
            "success": true,
            "response": answer
        })
        .to_string())
    }

    pub async fn get_chat_history(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let limit = optional_usize(arguments, "limit").unwrap_or(CHAT_PAGE_SIZE);
        let offset = optional_usize(arguments, "offset").unwrap_or(0);

        let (history, total) = match arguments.get("user_id").and_then(|v| v.as_i64()) {
            Some(user_id) => (
                database::get_chat_history(&self.connection, user_id, limit, offset)?,
                count_chat_messages(&self.connection, user_id)?,
            ),
            None => (Vec::new(), 0),
        };

        Ok(json!({
            "success": true,
            "history": history,
            "total": total,
            "limit": limit,
            "offset": offset
        })
        .to_string())
    }

    pub async fn clear_chat_history(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_i64(arguments, "user_id")?;
        let deleted = database::clear_chat_history(&self.connection, user_id)?;

        Ok(json!({
            "success": true,
            "deleted": deleted
        })
        .to_string())
    }
}
