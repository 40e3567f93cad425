use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ReasoningConfig;
use crate::error::ReasoningError;
use crate::model::Recommendation;
use crate::reasoning::prompt::{build_user_prompt, truncate_for_log};
use crate::reasoning::{
    Backoff, ReasoningRequest, ReasoningService, parse_recommendation, with_backoff,
};

const PROMPT_LOG_CHARS: usize = 1500;

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    log_responses: bool,
    backoff: Backoff,
}

impl OpenAiClient {
    pub fn new(config: &ReasoningConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            log_responses: config.log_responses,
            backoff: Backoff::from_config(config),
        }
    }

    /// Build a client with the API key read from `config.api_key_env`.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, Report<ReasoningError>> {
        let api_key =
            std::env::var(&config.api_key_env).change_context(ReasoningError::Credentials {
                name: config.api_key_env.clone(),
            })?;
        Ok(Self::new(config, api_key))
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String, Report<ReasoningError>> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .change_context(ReasoningError::Request)
            .attach_with(|| format!("url: {url}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Report::new(ReasoningError::RateLimited));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Report::new(ReasoningError::Status {
                status: status.as_u16(),
            })
            .attach(format!("body: {text}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .change_context(ReasoningError::ResponseParse)?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .unwrap_or_default())
    }
}

impl ReasoningService for OpenAiClient {
    fn recommend<'a>(
        &'a self,
        request: ReasoningRequest<'a>,
    ) -> BoxFuture<'a, Result<Recommendation, Report<ReasoningError>>> {
        Box::pin(async move {
            let user_prompt = build_user_prompt(&request);
            let body = ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: &self.system_prompt,
                    },
                    ChatMessage {
                        role: "user",
                        content: &user_prompt,
                    },
                ],
            };

            if self.log_responses {
                info!(
                    symbol = request.symbol,
                    timeframe = %request.timeframe,
                    model = %self.model,
                    prompt = %truncate_for_log(&user_prompt, PROMPT_LOG_CHARS),
                    "reasoning request"
                );
            } else {
                debug!(
                    symbol = request.symbol,
                    timeframe = %request.timeframe,
                    model = %self.model,
                    "reasoning request"
                );
            }

            let content = with_backoff(self.backoff, || self.complete(&body))
                .await
                .attach_with(|| {
                    format!("symbol: {}, timeframe: {}", request.symbol, request.timeframe)
                })?;
            let recommendation = parse_recommendation(&content);

            let parsed = serde_json::to_string(&recommendation).unwrap_or_default();
            if self.log_responses {
                info!(
                    symbol = request.symbol,
                    timeframe = %request.timeframe,
                    response = %parsed,
                    "reasoning response"
                );
            } else {
                debug!(
                    symbol = request.symbol,
                    timeframe = %request.timeframe,
                    response = %parsed,
                    "reasoning response"
                );
            }

            Ok(recommendation)
        })
    }
}

// ---------------------------------------------------------------------------
// Chat completions wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "be brief",
                },
                ChatMessage {
                    role: "user",
                    content: "AAPL?",
                },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "AAPL?");
    }

    #[test]
    fn completion_response_parses() {
        let json = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"recommendation\": \"none\"}"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let content = response.choices[0].message.content.as_deref().unwrap();
        assert_eq!(content, "{\"recommendation\": \"none\"}");
    }

    #[test]
    fn client_trims_base_url() {
        let config = ReasoningConfig {
            base_url: "http://localhost:8080/".into(),
            ..ReasoningConfig::default()
        };
        let client = OpenAiClient::new(&config, "sk-test");
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.backoff.max_attempts, 3);
    }
}
