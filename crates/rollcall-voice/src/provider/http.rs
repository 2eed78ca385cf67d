use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::SpeechProvider;
use crate::audio::{PcmAudio, decode_wav};
use crate::error::VoiceError;

/// Connection settings for [`HttpSpeechProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    /// Full URL of the synthesis endpoint.
    pub endpoint: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5002/api/tts".to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    format: &'static str,
}

/// Speech provider that POSTs JSON and receives a WAV body.
///
/// Request: `{"text": …, "voice": …, "format": "wav"}`.
/// 5xx and 429 responses are transport errors (retried); any other non-2xx
/// is a permanent rejection.
pub struct HttpSpeechProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpSpeechProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, VoiceError> {
        if config.endpoint.trim().is_empty() {
            return Err(VoiceError::InvalidConfig(
                "provider endpoint cannot be empty".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| VoiceError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<PcmAudio, VoiceError> {
        let body = SynthesisRequest {
            text,
            voice,
            format: "wav",
        };
        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(VoiceError::EmptyAudio);
        }

        let audio = decode_wav(&bytes)?;
        tracing::debug!(
            voice,
            chars = text.chars().count(),
            samples = audio.samples.len(),
            sample_rate = audio.sample_rate,
            "Provider returned audio"
        );
        Ok(audio)
    }
}

fn classify_status(status: StatusCode, message: String) -> VoiceError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        VoiceError::Transport(format!("HTTP {status}: {message}"))
    } else {
        VoiceError::Provider {
            status: status.as_u16(),
            message,
        }
    }
}
