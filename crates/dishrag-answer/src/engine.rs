use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use llm::LLMProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dishrag_core::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Hosted,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Hosted => "hosted",
        })
    }
}

/// A single-turn request: one user message, no history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub model_id: String,
    pub message: String,
}

impl InferenceRequest {
    pub fn single_turn(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("unknown hosted provider: {0}")]
    UnknownProvider(String),
    #[error("the hosted backend needs an API key")]
    MissingApiKey,
    #[error("failed to build {backend} client: {message}")]
    Build { backend: BackendKind, message: String },
    #[error("{backend} backend failed: {message}")]
    Backend { backend: BackendKind, message: String },
    #[error("{backend} backend returned no text")]
    EmptyResponse { backend: BackendKind },
    #[error("{backend} backend returned only reasoning, no answer")]
    ReasoningOnly { backend: BackendKind },
}

/// One way of turning a request into raw model text.
///
/// `Ok(None)` means the backend answered without any message content.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn complete(
        &self,
        settings: &Settings,
        request: &InferenceRequest,
    ) -> Result<Option<String>, InferenceError>;
}

/// Chat-completions root of each supported hosted provider.
fn default_base_url(provider: &str) -> Result<&'static str, InferenceError> {
    match provider {
        "openai" => Ok("https://api.openai.com/v1"),
        "deepseek" => Ok("https://api.deepseek.com/v1"),
        "groq" => Ok("https://api.groq.com/openai/v1"),
        "mistral" => Ok("https://api.mistral.ai/v1"),
        other => Err(InferenceError::UnknownProvider(other.to_string())),
    }
}

/// `{base}/chat/completions`, where `hosted_base_url` replaces the provider default.
fn chat_completions_url(settings: &Settings) -> Result<String, InferenceError> {
    let default = default_base_url(&settings.hosted_provider)?;
    let base = settings.hosted_base_url.as_deref().unwrap_or(default);
    Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
}

fn build(builder: LLMBuilder, backend: BackendKind) -> Result<Box<dyn LLMProvider>, InferenceError> {
    builder.build().map_err(|e| InferenceError::Build {
        backend,
        message: e.to_string(),
    })
}

async fn chat_once(
    llm: &dyn LLMProvider,
    backend: BackendKind,
    message: &str,
) -> Result<Option<String>, InferenceError> {
    let messages = vec![ChatMessage::user().content(message).build()];

    let response = llm
        .chat(&messages)
        .await
        .map_err(|e| InferenceError::Backend {
            backend,
            message: e.to_string(),
        })?;

    Ok(response.text())
}

/// Ollama chat API; the reply is read from `message.content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

#[async_trait]
impl InferenceBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn complete(
        &self,
        settings: &Settings,
        request: &InferenceRequest,
    ) -> Result<Option<String>, InferenceError> {
        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Ollama)
            .model(&request.model_id);

        if let Some(url) = &settings.local_base_url {
            builder = builder.base_url(url);
        }

        let llm = build(builder, self.kind())?;
        chat_once(llm.as_ref(), self.kind(), &request.message).await
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-shaped chat completions; the reply is the first choice's message.
#[derive(Debug, Clone, Default)]
pub struct HostedBackend {
    client: reqwest::Client,
}

#[async_trait]
impl InferenceBackend for HostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn complete(
        &self,
        settings: &Settings,
        request: &InferenceRequest,
    ) -> Result<Option<String>, InferenceError> {
        let url = chat_completions_url(settings)?;
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(InferenceError::MissingApiKey)?;

        let body = ChatCompletionRequest {
            model: &request.model_id,
            messages: [WireMessage {
                role: "user",
                content: &request.message,
            }],
        };
        let failed = |message: String| InferenceError::Backend {
            backend: BackendKind::Hosted,
            message,
        };

        debug!(%url, provider = %settings.hosted_provider, "posting chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), body_text.trim())));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid chat completion: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content))
    }
}

/// Picks the local or hosted backend from the settings and normalizes the reply.
#[derive(Clone)]
pub struct Dispatcher {
    local: Arc<dyn InferenceBackend>,
    hosted: Arc<dyn InferenceBackend>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LocalBackend), Arc::new(HostedBackend::default()))
    }
}

impl Dispatcher {
    pub fn new(local: Arc<dyn InferenceBackend>, hosted: Arc<dyn InferenceBackend>) -> Self {
        Self { local, hosted }
    }

    pub fn select(&self, settings: &Settings) -> &dyn InferenceBackend {
        if settings.use_local_backend {
            self.local.as_ref()
        } else {
            self.hosted.as_ref()
        }
    }

    /// Send `payload` as one user message. Absent or blank replies are failures; nothing is retried.
    pub async fn dispatch(&self, settings: &Settings, payload: &str) -> Result<String, InferenceError> {
        let backend = self.select(settings);
        let request = InferenceRequest::single_turn(&settings.model_id, payload);

        info!(
            backend = %backend.kind(),
            model = %request.model_id,
            bytes = payload.len(),
            "dispatching inference"
        );

        match backend.complete(settings, &request).await? {
            Some(text) if !text.trim().is_empty() => {
                debug!(backend = %backend.kind(), bytes = text.len(), "received reply");
                Ok(text)
            }
            _ => Err(InferenceError::EmptyResponse {
                backend: backend.kind(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Backend double that records every request and replies with a canned result.
    pub struct RecordingBackend {
        kind: BackendKind,
        reply: Result<Option<String>, String>,
        pub calls: Mutex<Vec<InferenceRequest>>,
    }

    impl RecordingBackend {
        pub fn replying(kind: BackendKind, text: &str) -> Arc<Self> {
            Self::with(kind, Ok(Some(text.to_string())))
        }

        pub fn silent(kind: BackendKind) -> Arc<Self> {
            Self::with(kind, Ok(None))
        }

        pub fn failing(kind: BackendKind, message: &str) -> Arc<Self> {
            Self::with(kind, Err(message.to_string()))
        }

        fn with(kind: BackendKind, reply: Result<Option<String>, String>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn requests(&self) -> Vec<InferenceRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn complete(
            &self,
            _settings: &Settings,
            request: &InferenceRequest,
        ) -> Result<Option<String>, InferenceError> {
            self.calls.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(|message| InferenceError::Backend {
                backend: self.kind,
                message,
            })
        }
    }
}
