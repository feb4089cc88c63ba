use crate::error::GatewayError;
use crate::gateway::ChatRequest;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Talks to any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, GatewayError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint)?,
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiCompatibleClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body = response.text().await?;
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<String, GatewayError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("response carries no message content".to_string())
        })
}
