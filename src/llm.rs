use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::LlmConfig;
use crate::types::{ChatMessageRow, LotteryRecord, LotteryType, PrizeSize, PrizeType, UserPreferences};

const HISTORY_TURNS: usize = 5;
const PROMPT_LOTTERIES: usize = 10;

pub const CHAT_APOLOGY: &str =
    "Извините, произошла ошибка при обработке вашего запроса. Попробуйте позже.";

const BASE_SYSTEM_PROMPT: &str = "Ты - помощник по выбору лотерей Столото.

ВАЖНО - СТИЛЬ ОТВЕТОВ:
- Отвечай КРАТКО и ПО ДЕЛУ - максимум 3-4 предложения
- БЕЗ длинных объяснений и лишней воды
- Сразу к сути - конкретные рекомендации
- Используй ТОЛЬКО русский язык (никаких английских слов)
- Отвечай только на основе предоставленных данных
- Если данных недостаточно - скажи это в одном предложении

ФОРМАТ ОТВЕТА:
- Одна рекомендация = 1-2 предложения максимум
- Не повторяй информацию, которую пользователь уже знает
- Не объясняй очевидное";

/// Produces the human-readable reason behind a recommendation.
#[async_trait]
pub trait ExplanationGenerator {
    async fn generate_explanation(
        &self,
        lottery: &LotteryRecord,
        prefs: &UserPreferences,
        score: f64,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub is_user_message: bool,
    pub message: String,
}

impl From<ChatMessageRow> for ChatTurn {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            is_user_message: row.is_user_message,
            message: row.message,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatContext {
    pub user_name: Option<String>,
    pub preferences: Option<UserPreferences>,
    pub lotteries: Vec<LotteryRecord>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("⚠ LLM server unreachable at {}: {}", self.host, e);
                false
            }
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM answered with an error status")?;

        let chat: ChatResponse = response.json().await.context("Malformed LLM response")?;
        Ok(chat.message.content)
    }

    pub async fn try_chat(
        &self,
        message: &str,
        context: &ChatContext,
        history: &[ChatTurn],
    ) -> Result<String> {
        self.complete(&build_messages(message, context, history)).await
    }

    /// Free-form answer grounded in the given context; never fails.
    pub async fn chat(&self, message: &str, context: &ChatContext, history: &[ChatTurn]) -> String {
        match self.try_chat(message, context, history).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("✗ Chat completion failed: {:#}", e);
                CHAT_APOLOGY.to_string()
            }
        }
    }
}

#[async_trait]
impl ExplanationGenerator for OllamaClient {
    async fn generate_explanation(
        &self,
        lottery: &LotteryRecord,
        prefs: &UserPreferences,
        score: f64,
    ) -> Result<String> {
        let prompt = explanation_prompt(lottery, prefs, score);
        self.complete(&[ChatMessage::new("user", prompt)]).await
    }
}

fn lottery_type_label(lottery_type: LotteryType) -> &'static str {
    match lottery_type {
        LotteryType::Instant => "мгновенная",
        LotteryType::Draw => "тиражная",
    }
}

fn prize_type_label(prize_type: PrizeType) -> &'static str {
    match prize_type {
        PrizeType::Instant => "мгновенные выигрыши",
        PrizeType::Draw => "тиражные лотереи",
        PrizeType::Both => "любой тип",
    }
}

fn prize_size_label(size: PrizeSize) -> &'static str {
    match size {
        PrizeSize::Small => "небольшие частые выигрыши",
        PrizeSize::Medium => "средние призы",
        PrizeSize::Large => "крупные призы",
        PrizeSize::Jackpot => "джекпот",
    }
}

fn preference_lines(prefs: &UserPreferences) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(budget) = prefs.budget {
        lines.push(format!("- Бюджет: {} руб.", budget));
    }
    if let Some(prize_type) = prefs.preferred_prize_type {
        lines.push(format!("- Тип выигрыша: {}", prize_type_label(prize_type)));
    }
    if let Some(size) = prefs.preferred_prize_size {
        lines.push(format!("- Желаемый размер приза: {}", prize_size_label(size)));
    }
    lines
}

pub fn explanation_prompt(lottery: &LotteryRecord, prefs: &UserPreferences, score: f64) -> String {
    let mut params = vec![format!("- Тип: {}", lottery_type_label(lottery.lottery_type))];
    if let Some(price) = lottery.ticket_price {
        params.push(format!("- Цена билета: {} руб.", price));
    }
    if let Some(frequency) = &lottery.draw_frequency {
        params.push(format!("- Частота розыгрышей: {}", frequency));
    }
    if let Some(max_prize) = lottery.max_prize {
        params.push(format!("- Максимальный приз: {} руб.", max_prize));
    }

    format!(
        "Объясни пользователю, почему лотерея \"{}\" ему подходит (рейтинг соответствия: {:.1}/100).\n\n\
         Параметры лотереи:\n{}\n\n\
         Предпочтения пользователя:\n{}\n\n\
         Дай краткое (2-3 предложения) объяснение, почему эта лотерея подходит.",
        lottery.name,
        score,
        params.join("\n"),
        preference_lines(prefs).join("\n")
    )
}

pub fn build_system_prompt(context: &ChatContext) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.to_string();

    if let Some(name) = context.user_name.as_deref().filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("\n\nИмя пользователя: {}", name));
        prompt.push_str("\nОбращайся к пользователю по имени в ответах.");
    }

    if let Some(prefs) = &context.preferences {
        let lines = preference_lines(prefs);
        if !lines.is_empty() {
            prompt.push_str("\n\nПредпочтения пользователя:\n");
            prompt.push_str(&lines.join("\n"));
        }
    }

    if !context.lotteries.is_empty() {
        prompt.push_str(&format!("\n\nДоступные лотереи ({}):", context.lotteries.len()));
        for lottery in context.lotteries.iter().take(PROMPT_LOTTERIES) {
            let price = lottery
                .ticket_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            prompt.push_str(&format!(
                "\n- {} ({}, {} руб.)",
                lottery.name,
                lottery_type_label(lottery.lottery_type),
                price
            ));
        }
    }

    prompt
}

pub fn build_messages(message: &str, context: &ChatContext, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", build_system_prompt(context))];

    let skip = history.len().saturating_sub(HISTORY_TURNS);
    for turn in &history[skip..] {
        let role = if turn.is_user_message { "user" } else { "assistant" };
        messages.push(ChatMessage::new(role, turn.message.clone()));
    }

    messages.push(ChatMessage::new("user", message));
    messages
}
