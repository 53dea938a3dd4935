// OpenAI chat completions - one system prompt, one user message, one answer
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::http::{check_response, HttpConfig};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(api_key: String, http: &HttpConfig) -> Self {
        Self::with_base_url(api_key, OPENAI_API_BASE.to_string(), http)
    }

    pub fn with_base_url(api_key: String, base_url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Text of the first choice
    pub async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        debug!("POST {} ({})", url, model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_response(response, &url).await?;

        let text = response.text().await?;
        let completion: ChatCompletion = serde_json::from_str(&text)?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ApiError::RequestFailed(format!("{} returned no completion", model)))
    }
}

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
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Debug, Deserialize)]
struct ChatAnswer {
    content: Option<String>,
}
