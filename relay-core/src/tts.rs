//! Text-to-speech dispatch with a vendor fallback chain: ElevenLabs first,
//! then Azure Speech, and finally a marker telling the caller to synthesize
//! locally. Vendor failures are logged and demoted, never surfaced.

use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::{HttpCfg, TtsCfg};
use crate::error::CoreResult;
use crate::http_client::HttpClient;

const ELEVENLABS_BASE: &str = "https://api.elevenlabs.io";
const AZURE_OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

/// Result of a synthesis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TtsOutcome {
    /// A vendor produced audio.
    Audio {
        bytes: Bytes,
        content_type: String,
        vendor: &'static str,
    },
    /// No vendor available or all failed; the client should use its own
    /// speech synthesis.
    Browser,
}

pub struct TtsEngine {
    http: HttpClient,
    elevenlabs_key: Option<SecretString>,
    elevenlabs_voice_id: String,
    elevenlabs_base: String,
    azure_key: Option<SecretString>,
    azure_endpoint: Option<String>,
}

impl TtsEngine {
    pub fn new(cfg: &TtsCfg, http_cfg: &HttpCfg) -> CoreResult<Self> {
        Ok(Self {
            http: HttpClient::new(http_cfg)?,
            elevenlabs_key: cfg.elevenlabs_key.clone(),
            elevenlabs_voice_id: cfg.elevenlabs_voice_id.clone(),
            elevenlabs_base: ELEVENLABS_BASE.to_string(),
            azure_key: cfg.azure_key.clone(),
            azure_endpoint: cfg.azure_key.as_ref().map(|_| {
                format!(
                    "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                    cfg.azure_region
                )
            }),
        })
    }

    /// Overrides the vendor endpoints; for proxies and tests.
    pub fn with_endpoints(
        mut self,
        elevenlabs_base: Option<String>,
        azure_endpoint: Option<String>,
    ) -> Self {
        if let Some(base) = elevenlabs_base {
            self.elevenlabs_base = base.trim_end_matches('/').to_string();
        }
        if azure_endpoint.is_some() {
            self.azure_endpoint = azure_endpoint;
        }
        self
    }

    /// Synthesizes `text`, walking the vendor chain. `voice` overrides the
    /// configured ElevenLabs voice id. With no usable vendor (or all of them
    /// failing) the outcome is [`TtsOutcome::Browser`].
    pub async fn speak(&self, text: &str, voice: Option<&str>) -> TtsOutcome {
        if let Some(key) = &self.elevenlabs_key {
            match self.elevenlabs(key, text, voice).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "elevenlabs synthesis failed, trying next vendor");
                }
            }
        }
        if let (Some(key), Some(endpoint)) = (&self.azure_key, &self.azure_endpoint) {
            match self.azure(key, endpoint, text).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "azure synthesis failed, falling back to browser");
                }
            }
        }
        TtsOutcome::Browser
    }

    async fn elevenlabs(
        &self,
        key: &SecretString,
        text: &str,
        voice: Option<&str>,
    ) -> CoreResult<TtsOutcome> {
        #[derive(Serialize)]
        struct VoiceSettings {
            stability: f32,
            similarity_boost: f32,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.elevenlabs_base,
            voice.unwrap_or(&self.elevenlabs_voice_id)
        );
        let body = serde_json::to_string(&Body {
            text,
            model_id: "eleven_monolingual_v1",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        })
        .map_err(|e| crate::error::RelayError::Other(e.into()))?;

        let key = key.expose_secret().to_string();
        let (bytes, content_type) = self
            .http
            .post_bytes(
                "elevenlabs",
                &url,
                body,
                "application/json",
                &[("xi-api-key", key.as_str()), ("Accept", "audio/mpeg")],
            )
            .await?;
        Ok(TtsOutcome::Audio {
            bytes,
            content_type,
            vendor: "elevenlabs",
        })
    }

    async fn azure(
        &self,
        key: &SecretString,
        endpoint: &str,
        text: &str,
    ) -> CoreResult<TtsOutcome> {
        let ssml = format!(
            concat!(
                "<speak version='1.0' xml:lang='en-US'>",
                "<voice xml:lang='en-US' name='en-US-JennyNeural'>{}</voice>",
                "</speak>"
            ),
            escape_xml(text)
        );
        let key = key.expose_secret().to_string();
        let (bytes, content_type) = self
            .http
            .post_bytes(
                "azure",
                endpoint,
                ssml,
                "application/ssml+xml",
                &[
                    ("Ocp-Apim-Subscription-Key", key.as_str()),
                    ("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT),
                ],
            )
            .await?;
        Ok(TtsOutcome::Audio {
            bytes,
            content_type,
            vendor: "azure",
        })
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
