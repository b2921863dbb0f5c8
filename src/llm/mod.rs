//! Chat-completion gateway with local-first selection and cross-backend
//! fall-back.

pub mod backend;
pub mod errors;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, instrument, warn};

pub use backend::{BackendKind, ChatBackend, ChatRequest, OpenAiCompatBackend};
pub use errors::LlmError;

use crate::config::{ConfigError, ENV_DEEPSEEK_API_KEY, ENV_LOCAL_LLM_URL, LlmSettings};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LlmGateway {
    local: Option<Arc<dyn ChatBackend>>,
    remote: Option<Arc<dyn ChatBackend>>,
    active: Mutex<BackendKind>,
    call_timeout: Duration,
    probe_timeout: Duration,
}

impl LlmGateway {
    /// Local is preferred whenever it is configured.
    pub fn new(local: Option<Arc<dyn ChatBackend>>, remote: Option<Arc<dyn ChatBackend>>) -> Self {
        let active = if local.is_some() {
            BackendKind::Local
        } else {
            BackendKind::Remote
        };
        Self {
            local,
            remote,
            active: Mutex::new(active),
            call_timeout: CALL_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, call_timeout: Duration, probe_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.probe_timeout = probe_timeout;
        self
    }

    /// Build both backends from settings. The remote one only exists when a
    /// DeepSeek key is configured.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let local: Arc<dyn ChatBackend> = Arc::new(OpenAiCompatBackend::new(
            BackendKind::Local,
            &settings.local_url,
            &settings.local_model,
            None,
        )?);

        let remote = match &settings.deepseek_api_key {
            Some(key) => Some(Arc::new(OpenAiCompatBackend::new(
                BackendKind::Remote,
                &settings.deepseek_url,
                &settings.deepseek_model,
                Some(key.clone()),
            )?) as Arc<dyn ChatBackend>),
            None => None,
        };

        Ok(Self::new(Some(local), remote))
    }

    /// Build from settings and run the start-up probe. Fails when local is
    /// unreachable and no remote backend can be used instead.
    pub async fn connect(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let gateway = Self::from_settings(settings).map_err(|e| ConfigError::InvalidValue {
            field: ENV_LOCAL_LLM_URL,
            reason: e.to_string(),
        })?;

        if gateway.probe().await == BackendKind::Remote && gateway.remote.is_none() {
            return Err(ConfigError::Missing(ENV_DEEPSEEK_API_KEY));
        }
        Ok(gateway)
    }

    pub fn active(&self) -> BackendKind {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_active(&self, kind: BackendKind) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = kind;
    }

    fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn ChatBackend>> {
        match kind {
            BackendKind::Local => self.local.as_ref(),
            BackendKind::Remote => self.remote.as_ref(),
        }
    }

    /// Send a one-token request to the local backend and select local when
    /// it answers with a well-formed response, remote otherwise.
    #[instrument(skip(self))]
    pub async fn probe(&self) -> BackendKind {
        let selected = match &self.local {
            Some(local) => {
                let request = ChatRequest {
                    system_prompt: String::new(),
                    user_prompt: "ping".to_string(),
                    max_tokens: 1,
                    temperature: 0.0,
                };
                match timeout(self.probe_timeout, local.complete(&request)).await {
                    Ok(Ok(_)) => BackendKind::Local,
                    Ok(Err(e)) => {
                        warn!(error = %e, "local LLM probe failed");
                        BackendKind::Remote
                    }
                    Err(_) => {
                        warn!("local LLM probe timed out");
                        BackendKind::Remote
                    }
                }
            }
            None => BackendKind::Remote,
        };

        info!(backend = %selected, "LLM backend selected");
        self.set_active(selected);
        selected
    }

    /// Re-run the probe, e.g. at the start of an enrichment batch.
    pub async fn reprobe(&self) -> BackendKind {
        self.probe().await
    }

    /// Run one completion. The active backend is tried first, then the other
    /// one once; success on the other switches the selection. Returns `None`
    /// when both fail.
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Option<String> {
        let request = ChatRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            max_tokens,
            temperature,
        };

        let first = self.active();
        for kind in [first, first.other()] {
            let Some(backend) = self.backend(kind) else {
                continue;
            };

            let outcome = match timeout(self.call_timeout, backend.complete(&request)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
                Ok(Ok(_)) => Err(LlmError::Empty),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(LlmError::Timeout),
            };

            match outcome {
                Ok(text) => {
                    if kind != first {
                        info!(from = %first, to = %kind, "switching LLM backend");
                        self.set_active(kind);
                    }
                    return Some(text);
                }
                Err(e) => warn!(backend = %kind, error = %e, "LLM call failed"),
            }
        }

        None
    }
}
