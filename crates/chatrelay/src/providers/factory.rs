use std::sync::Arc;

use super::{
    base::Provider, configs::ProviderConfig, errors::ProviderError, groq::GroqProvider,
    openai::OpenAiProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Groq,
    OpenAi,
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Groq(_) => ProviderType::Groq,
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    match config {
        ProviderConfig::Groq(groq_config) => Ok(Arc::new(GroqProvider::new(groq_config)?)),
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
    }
}
