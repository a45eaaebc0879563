use anyhow::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::use_cases::{AnalyticsUseCase, ChatUseCase, LotteryUseCase, RecommendationUseCase};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id: Some(id.unwrap_or(json!(1))),
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError { code, message, data }),
            id,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

pub struct MCPHandler {
    recommendation_use_case: Arc<RecommendationUseCase>,
    lottery_use_case: Arc<LotteryUseCase>,
    analytics_use_case: Arc<AnalyticsUseCase>,
    chat_use_case: Arc<ChatUseCase>,
}

fn write_response<W: Write>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    writeln!(writer, "{}", serde_json::to_string(response)?)?;
    writer.flush()?;
    Ok(())
}

impl MCPHandler {
    pub fn new(
        recommendation_use_case: Arc<RecommendationUseCase>,
        lottery_use_case: Arc<LotteryUseCase>,
        analytics_use_case: Arc<AnalyticsUseCase>,
        chat_use_case: Arc<ChatUseCase>,
    ) -> Self {
        Self {
            recommendation_use_case,
            lottery_use_case,
            analytics_use_case,
            chat_use_case,
        }
    }

    /// Answers one JSON-RPC request per input line until the reader is exhausted.
    pub async fn serve<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Failed to parse request: {} - Line: {}", e, line);
                    let response = JsonRpcResponse::failure(
                        None,
                        PARSE_ERROR,
                        "Parse error".to_string(),
                        Some(json!(e.to_string())),
                    );
                    write_response(&mut writer, &response)?;
                    continue;
                }
            };

            // No id, or a notifications/ method: never answered.
            if request.id.is_none() || request.method.starts_with("notifications/") {
                if request.method == "notifications/initialized" {
                    info!("🎰 Client initialized");
                }
                continue;
            }

            let response = self.handle_request(request).await;
            write_response(&mut writer, &response)?;
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => {
                info!("🎰 Initializing Stoloto advisor MCP server");
                JsonRpcResponse::success(
                    request.id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": "stoloto-mcp-server",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                )
            }
            "tools/list" => JsonRpcResponse::success(request.id, json!({ "tools": self.get_tools() })),
            "tools/call" => self.handle_call_tool(request.params, request.id).await,
            other => JsonRpcResponse::failure(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None,
            ),
        }
    }

    async fn handle_call_tool(&self, params: Option<Value>, id: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params".to_string(), None);
        };

        let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name".to_string(), None);
        };

        let arguments: HashMap<String, Value> = params
            .get("arguments")
            .cloned()
            .and_then(|a| serde_json::from_value(a).ok())
            .unwrap_or_default();

        match self.execute_tool(tool_name, &arguments).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [
                        { "type": "text", "text": content }
                    ]
                }),
            ),
            Err(e) => {
                warn!("✗ Tool {} failed: {:#}", tool_name, e);
                JsonRpcResponse::failure(
                    id,
                    INTERNAL_ERROR,
                    format!("Tool execution error: {}", e),
                    None,
                )
            }
        }
    }

    async fn execute_tool(&self, tool_name: &str, arguments: &HashMap<String, Value>) -> Result<String> {
        match tool_name {
            "generate_recommendations" => self.recommendation_use_case.generate_recommendations(arguments).await,
            "get_recommended_lotteries" => self.recommendation_use_case.get_recommended_lotteries(arguments).await,
            "get_preferences" => self.recommendation_use_case.get_preferences(arguments).await,
            "set_preferences" => self.recommendation_use_case.set_preferences(arguments).await,
            "delete_preferences" => self.recommendation_use_case.delete_preferences(arguments).await,
            "list_lotteries" => self.lottery_use_case.list_lotteries(arguments).await,
            "get_lottery" => self.lottery_use_case.get_lottery(arguments).await,
            "get_summary_statistics" => self.analytics_use_case.get_summary_statistics(arguments).await,
            "get_lottery_analytics" => self.analytics_use_case.get_lottery_analytics(arguments).await,
            "get_win_probability" => self.analytics_use_case.get_win_probability(arguments).await,
            "chat" => self.chat_use_case.chat(arguments).await,
            "get_chat_history" => self.chat_use_case.get_chat_history(arguments).await,
            "clear_chat_history" => self.chat_use_case.clear_chat_history(arguments).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }

    fn get_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "generate_recommendations".to_string(),
                description: "Rank active lotteries against a user's stored preferences and explain each pick".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User whose preferences drive the ranking"
                        },
                        "top_n": {
                            "type": "integer",
                            "description": "Number of recommendations to return (default from STOLOTO_DEFAULT_TOP_N)"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "get_recommended_lotteries".to_string(),
                description: "Latest stored recommendation per lottery, or popular lotteries when the user has none".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "get_preferences".to_string(),
                description: "Get the stored lottery preferences of a user".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "set_preferences".to_string(),
                description: "Create or replace the lottery preferences of a user".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID"
                        },
                        "budget": {
                            "type": "number",
                            "description": "Budget per ticket in rubles"
                        },
                        "preferred_prize_type": {
                            "type": "string",
                            "enum": ["instant", "draw", "both"]
                        },
                        "preferred_prize_size": {
                            "type": "string",
                            "enum": ["small", "medium", "large", "jackpot"]
                        },
                        "min_acceptable_probability": {
                            "type": "number",
                            "description": "Lowest acceptable average win probability"
                        },
                        "risk_profile": {
                            "type": "string",
                            "enum": ["conservative", "moderate", "aggressive"]
                        }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "delete_preferences".to_string(),
                description: "Delete the stored lottery preferences of a user".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "list_lotteries".to_string(),
                description: "List lotteries in the catalog with draw statistics".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "active_only": {
                            "type": "boolean",
                            "description": "Only active lotteries (default: true)"
                        },
                        "type": {
                            "type": "string",
                            "enum": ["instant", "draw"]
                        },
                        "min_price": {
                            "type": "number",
                            "description": "Lowest ticket price in rubles"
                        },
                        "max_price": {
                            "type": "number",
                            "description": "Highest ticket price in rubles"
                        }
                    }
                }),
            },
            Tool {
                name: "get_lottery".to_string(),
                description: "Get one lottery with its recent draws and latest prize categories".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "lottery_id": {
                            "type": "integer",
                            "description": "Lottery ID"
                        },
                        "slug": {
                            "type": "string",
                            "description": "Lottery slug, used when lottery_id is absent"
                        }
                    }
                }),
            },
            Tool {
                name: "get_summary_statistics".to_string(),
                description: "Catalog-wide statistics and recent draw activity".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            Tool {
                name: "get_lottery_analytics".to_string(),
                description: "Draw, prize category and monthly statistics for one lottery".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "lottery_id": {
                            "type": "integer",
                            "description": "Lottery ID"
                        }
                    },
                    "required": ["lottery_id"]
                }),
            },
            Tool {
                name: "get_win_probability".to_string(),
                description: "Known win probabilities per prize category of a lottery".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "lottery_id": {
                            "type": "integer",
                            "description": "Lottery ID"
                        }
                    },
                    "required": ["lottery_id"]
                }),
            },
            Tool {
                name: "chat".to_string(),
                description: "Ask the lottery assistant a question; with user_id the conversation is stored".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "User question"
                        },
                        "user_id": {
                            "type": "integer",
                            "description": "Optional user whose preferences and stored conversation give context"
                        },
                        "user_name": {
                            "type": "string",
                            "description": "Optional name to address the user by"
                        },
                        "history": {
                            "type": "array",
                            "description": "Previous turns, oldest first; ignored when user_id is given",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "is_user_message": {"type": "boolean"},
                                    "message": {"type": "string"}
                                }
                            }
                        }
                    },
                    "required": ["message"]
                }),
            },
            Tool {
                name: "get_chat_history".to_string(),
                description: "Stored conversation of a user, oldest first within the page".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID; without it the history is empty"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Page size (default: 50)"
                        },
                        "offset": {
                            "type": "integer",
                            "description": "Messages to skip, counted from the newest (default: 0)"
                        }
                    }
                }),
            },
            Tool {
                name: "clear_chat_history".to_string(),
                description: "Delete the stored conversation of a user".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "User ID"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
        ]
    }
}

pub fn stdio() -> (BufReader<io::Stdin>, io::Stdout) {
    (BufReader::new(io::stdin()), io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::tests::{offline_llm, seeded_connection};
    use stoloto_lib::recommendations::RecommendationEngine;

    fn handler() -> MCPHandler {
        let conn = seeded_connection();
        let llm = offline_llm();
        MCPHandler::new(
            Arc::new(RecommendationUseCase::new(
                conn.clone(),
                RecommendationEngine::new(llm.clone()),
                10,
            )),
            Arc::new(LotteryUseCase::new(conn.clone())),
            Arc::new(AnalyticsUseCase::new(conn.clone())),
            Arc::new(ChatUseCase::new(conn, llm)),
        )
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        handler()
            .serve(io::Cursor::new(input.to_string()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let responses = exchange(concat!(
            "{not json\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"resources/list\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"tools/call\",\"params\":{\"name\":\"nope\"}}\n",
        ))
        .await;

        let codes: Vec<i64> = responses
            .iter()
            .map(|r| r["error"]["code"].as_i64().unwrap())
            .collect();
        assert_eq!(codes, vec![-32700, -32601, -32602, -32603]);
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_lists_every_tool() {
        let responses = exchange("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n").await;
        let names: Vec<&str> = responses[0]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "generate_recommendations",
                "get_recommended_lotteries",
                "get_preferences",
                "set_preferences",
                "delete_preferences",
                "list_lotteries",
                "get_lottery",
                "get_summary_statistics",
                "get_lottery_analytics",
                "get_win_probability",
                "chat",
                "get_chat_history",
                "clear_chat_history",
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_returns_text_content() {
        let responses = exchange(concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"generate_recommendations\",\"arguments\":{\"user_id\":5,\"top_n\":3}}}\n",
        ))
        .await;

        assert_eq!(responses[0]["id"], 7);
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["count"], 3);
        assert_eq!(payload["recommendations"][0]["explanation"], "Популярная лотерея");
    }
}
