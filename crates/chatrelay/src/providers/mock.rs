use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{FinishReason, Provider, ProviderEvent, ProviderStream, Usage};
use crate::providers::errors::ProviderError;

/// One scripted completion
pub enum MockStep {
    /// Stream these events
    Events(Vec<ProviderEvent>),
    /// Stream these events, then fail
    FailMidStream(Vec<ProviderEvent>, String),
    /// Fail before streaming begins
    FailToStart(String),
}

impl MockStep {
    /// A plain text answer that finishes with `stop`
    pub fn text(text: &str) -> Self {
        MockStep::Events(vec![
            ProviderEvent::Text(text.to_string()),
            ProviderEvent::Finish {
                reason: FinishReason::Stop,
                usage: Usage::new(Some(10), Some(5), Some(15)),
            },
        ])
    }
}

/// What the provider was asked for on each call
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Clone)]
pub struct MockProvider {
    steps: Arc<Mutex<Vec<MockStep>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        "mock"
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream, ProviderError> {
        self.calls.lock().unwrap().push(MockCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                MockStep::text("")
            } else {
                steps.remove(0)
            }
        };

        let items: Vec<Result<ProviderEvent, ProviderError>> = match step {
            MockStep::Events(events) => events.into_iter().map(Ok).collect(),
            MockStep::FailMidStream(events, error) => events
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(ProviderError::Stream(error))))
                .collect(),
            MockStep::FailToStart(error) => {
                return Err(ProviderError::Api {
                    status: 503,
                    message: error,
                })
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
