// TextGenerator on top of a hosted chat model
use async_trait::async_trait;
use relwatch_api::ChatClient;
use tracing::debug;

use crate::config::Config;
use crate::summary::TextGenerator;
use crate::{Error, Result};

pub struct ChatGenerator {
    client: Option<ChatClient>,
    model: String,
    key_env: String,
}

impl ChatGenerator {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            model: model.into(),
            key_env: String::new(),
        }
    }

    /// Without an API key every call fails, which summarizers turn into fallback text
    pub fn from_config(config: &Config, model: &str) -> Self {
        let http = config.http.to_http_config();
        let client = config
            .ai
            .api_key()
            .map(|key| ChatClient::with_base_url(key, config.endpoints.openai_api.clone(), &http));

        Self {
            client,
            model: model.to_string(),
            key_env: config.ai.api_key_env.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for ChatGenerator {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let client = self.client.as_ref().ok_or_else(|| {
            Error::ConfigError(format!("No chat API key, set ai.api_key or ${}", self.key_env))
        })?;

        debug!("Generating with {} ({} chars of input)", self.model, user_message.len());
        Ok(client
            .complete(&self.model, system_prompt, user_message)
            .await?)
    }
}
