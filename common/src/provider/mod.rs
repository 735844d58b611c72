mod fake;

pub use fake::{hashed_embedding, FakeAi};

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs, ResponseFormat,
    },
    Client,
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::debug;

use crate::{
    error::AppError,
    utils::config::{AiProviderKind, AppConfig},
};

const RETRY_BASE_DELAY_MS: u64 = 200;
const MAX_PROVIDER_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 900,
            timeout: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: ChatUsage,
}

/// Uniform interface to the chat model and the embedder. The fake variant is
/// fully deterministic so pipelines built on it can be asserted byte-for-byte.
#[derive(Clone)]
pub enum AiProvider {
    Real(RealAi),
    Fake(FakeAi),
}

impl AiProvider {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.ai_provider {
            AiProviderKind::Real => Self::Real(RealAi::new(config)),
            AiProviderKind::Fake => Self::Fake(FakeAi::new(config.embed_dim)),
        }
    }

    pub fn kind(&self) -> AiProviderKind {
        match self {
            Self::Real(_) => AiProviderKind::Real,
            Self::Fake(_) => AiProviderKind::Fake,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Real(real) => real.dimension,
            Self::Fake(fake) => fake.dimension(),
        }
    }

    /// Embeds all texts, batching at the configured batch size.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        match self {
            Self::Real(real) => real.embed(texts).await,
            Self::Fake(fake) => Ok(fake.embed(texts)),
        }
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatOutcome, AppError> {
        match self {
            Self::Real(real) => real.chat(messages, options).await,
            Self::Fake(fake) => Ok(fake.chat(messages)),
        }
    }
}

#[derive(Clone)]
pub struct RealAi {
    client: Client<OpenAIConfig>,
    model: String,
    embed_model: String,
    dimension: usize,
    batch_size: usize,
}

impl RealAi {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        );
        Self {
            client,
            model: config.openai_model.clone(),
            embed_model: config.openai_embed_model.clone(),
            dimension: config.embed_dim,
            batch_size: config.embed_batch_size.max(1),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.embed_batch(batch).await?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let response = RetryIf::spawn(
            retry_strategy(),
            || async {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(&self.embed_model)
                    .dimensions(self.dimension as u32)
                    .input(batch.to_vec())
                    .build()?;
                self.client.embeddings().create(request).await
            },
            is_transient,
        )
        .await
        .map_err(|err| AppError::Provider(err.to_string()))?;

        debug!(batch = batch.len(), "embedding batch completed");

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(batch.len());
        for item in response.data {
            if item.embedding.len() != self.dimension {
                return Err(AppError::Provider(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    item.embedding.len()
                )));
            }
            vectors.push(item.embedding);
        }
        if vectors.len() != batch.len() {
            return Err(AppError::Provider(format!(
                "embedding count mismatch: expected {}, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatOutcome, AppError> {
        let call = || async {
            let mut request_messages: Vec<ChatCompletionRequestMessage> =
                Vec::with_capacity(messages.len());
            for message in messages {
                match message.role {
                    ChatRole::System => request_messages.push(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(message.content.clone())
                            .build()?
                            .into(),
                    ),
                    ChatRole::User => request_messages.push(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(message.content.clone())
                            .build()?
                            .into(),
                    ),
                }
            }

            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .temperature(options.temperature)
                .max_tokens(options.max_tokens)
                .response_format(ResponseFormat::JsonObject)
                .messages(request_messages)
                .build()?;

            self.client.chat().create(request).await
        };

        let response = tokio::time::timeout(
            options.timeout,
            RetryIf::spawn(retry_strategy(), call, is_transient),
        )
        .await
        .map_err(|_| AppError::Provider("chat call timed out".to_string()))?
        .map_err(|err| AppError::Provider(err.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Provider("chat response contained zero choices".into()))?;
        let text = choice.message.content.unwrap_or_default();
        let usage = response
            .usage
            .map(|usage| ChatUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ChatOutcome { text, usage })
    }
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
        .map(jitter)
        .take(MAX_PROVIDER_RETRIES)
}

fn is_transient(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => {
            let message = api.message.to_ascii_lowercase();
            message.contains("rate limit")
                || message.contains("overloaded")
                || message.contains("timeout")
                || message.contains("server error")
        }
        _ => false,
    }
}
