use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::base::{Provider, ProviderStream};
use super::configs::GroqProviderConfig;
use super::errors::{error_summary, ProviderError};
use super::stream::openai_events;
use super::utils::{create_request, RequestOptions};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const GROQ_HOST: &str = "https://api.groq.com";
pub const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Groq serves an openai compatible API under `/openai/v1`; usage arrives in
/// the `x_groq` field of the last chunk, so no `stream_options` are sent.
pub struct GroqProvider {
    client: Client,
    config: GroqProviderConfig,
}

impl GroqProvider {
    pub fn new(config: GroqProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!(
            "{}/openai/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, body = %body, "groq request rejected");
        Err(ProviderError::Api {
            status: status.as_u16(),
            message: error_summary(&body),
        })
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream, ProviderError> {
        let options = RequestOptions {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            include_usage: false,
        };
        let payload = create_request(&options, system, messages, tools)?;
        let response = self.post(payload).await?;
        Ok(openai_events(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::{FinishReason, ProviderEvent, Usage};
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: String) -> GroqProviderConfig {
        GroqProviderConfig {
            host,
            api_key: "gsk_test".to_string(),
            model: GROQ_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_stream_tool_request() -> anyhow::Result<()> {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_abc\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"{\\\"location\\\":\\\"San Francisco, CA\\\"}\"}}]},\"finish_reason\":\"tool_calls\"}],",
            "\"x_groq\":{\"usage\":{\"prompt_tokens\":20,\"completion_tokens\":15,\"total_tokens\":35}}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "llama-3.3-70b-versatile",
                "tools": [{"type": "function", "function": {"name": "get_weather"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = GroqProvider::new(config(mock_server.uri()))?;
        let tool = Tool::new(
            "get_weather",
            "Gets the current weather for a location",
            json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
        );

        let events: Vec<ProviderEvent> = provider
            .stream("", &[Message::user().with_text("Weather in SF?")], &[tool])
            .await?
            .try_collect()
            .await?;

        assert_eq!(
            events.first(),
            Some(&ProviderEvent::ToolCallStart {
                id: "call_abc".into(),
                name: "get_weather".into()
            })
        );
        assert!(events.contains(&ProviderEvent::ToolCall {
            id: "call_abc".into(),
            name: "get_weather".into(),
            arguments: Ok(json!({"location": "San Francisco, CA"})),
        }));
        assert_eq!(
            events.last(),
            Some(&ProviderEvent::Finish {
                reason: FinishReason::ToolCalls,
                usage: Usage::new(Some(20), Some(15), Some(35)),
            })
        );

        let requests = mock_server.received_requests().await.unwrap_or_default();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["stream"], true);
        assert!(sent.get("stream_options").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let provider = GroqProvider::new(config("http://127.0.0.1:1".to_string())).unwrap();
        let result = provider.stream("", &[Message::user().with_text("Hi")], &[]).await;
        assert!(matches!(result, Err(ProviderError::Http(_))));
    }
}
