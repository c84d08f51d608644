use crate::error::{to_env_var, ConfigError};
use chatrelay::providers::{
    configs::{GroqProviderConfig, OpenAiProviderConfig, ProviderConfig},
    factory::ProviderType,
    groq, openai,
};
use chatrelay::tools::{AggregatorTimeouts, ToolServerEndpoint};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Deployment variable naming a single tool server, registered as `custom`
pub const CUSTOM_SERVER_ENV: &str = "CUSTOM_MCP_SERVER_URL";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddress {
                address,
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Groq {
        #[serde(default = "default_groq_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_groq_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::Groq { .. } => ProviderType::Groq,
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Groq {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Groq(GroqProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolSettings {
    /// Tool server URLs keyed by name
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            connect_timeout_secs: default_connect_timeout(),
            list_timeout_secs: default_list_timeout(),
            close_timeout_secs: default_close_timeout(),
            call_timeout_secs: default_call_timeout(),
            max_steps: default_max_steps(),
        }
    }
}

impl ToolSettings {
    /// Configured servers ordered by name, skipping blank URLs
    pub fn endpoints(&self) -> Vec<ToolServerEndpoint> {
        self.servers
            .iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .map(|(name, url)| ToolServerEndpoint::new(name.clone(), url.trim()))
            .collect()
    }

    pub fn timeouts(&self) -> AggregatorTimeouts {
        AggregatorTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            list: Duration::from_secs(self.list_timeout_secs),
            close: Duration::from_secs(self.close_timeout_secs),
            call: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.type", "groq")?;

        if let Ok(url) = std::env::var(CUSTOM_SERVER_ENV) {
            if !url.trim().is_empty() {
                builder = builder.set_default("tools.servers.custom", url)?;
            }
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CHATRELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_groq_host() -> String {
    groq::GROQ_HOST.to_string()
}

fn default_groq_model() -> String {
    groq::GROQ_MODEL.to_string()
}

fn default_openai_host() -> String {
    openai::OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    openai::OPENAI_MODEL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_list_timeout() -> u64 {
    10
}

fn default_close_timeout() -> u64 {
    5
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_steps() -> usize {
    1
}
