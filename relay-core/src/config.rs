use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// HTTP client tuning. Missing in older config files -> defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

/// Pacing for the demo fallback's simulated stream.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DemoCfg {
    /// Simulated thinking delay before the first fragment.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Inter-fragment delay simulating network pacing.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for DemoCfg {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}
fn default_chunk_delay_ms() -> u64 {
    50
}

/// File-level provider entry: names the environment variable that carries the
/// API key. Secrets themselves never live in config files.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderFileCfg {
    pub api_key_env: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ProvidersFileCfg {
    pub openai: Option<ProviderFileCfg>,
    pub anthropic: Option<ProviderFileCfg>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TtsFileCfg {
    #[serde(default = "default_elevenlabs_key_env")]
    pub elevenlabs_key_env: String,
    #[serde(default = "default_azure_key_env")]
    pub azure_key_env: String,
    #[serde(default = "default_azure_region_env")]
    pub azure_region_env: String,
    #[serde(default = "default_voice_id")]
    pub elevenlabs_voice_id: String,
}

impl Default for TtsFileCfg {
    fn default() -> Self {
        Self {
            elevenlabs_key_env: default_elevenlabs_key_env(),
            azure_key_env: default_azure_key_env(),
            azure_region_env: default_azure_region_env(),
            elevenlabs_voice_id: default_voice_id(),
        }
    }
}

fn default_elevenlabs_key_env() -> String {
    "ELEVENLABS_API_KEY".into()
}
fn default_azure_key_env() -> String {
    "AZURE_SPEECH_KEY".into()
}
fn default_azure_region_env() -> String {
    "AZURE_SPEECH_REGION".into()
}
fn default_voice_id() -> String {
    // ElevenLabs "Rachel" stock voice.
    "21m00Tcm4TlvDq8ikWAM".into()
}

/// On-disk configuration shape (JSON or TOML).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub providers: ProvidersFileCfg,
    #[serde(default)]
    pub tts: TtsFileCfg,
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub demo: DemoCfg,
}

impl ConfigFile {
    /// Load from a file path (JSON or TOML by extension). If the extension is
    /// missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(crate::error::RelayError::from)?;
        let s =
            std::str::from_utf8(&bytes).map_err(|e| crate::error::RelayError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::RelayError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| crate::error::RelayError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::RelayError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| crate::error::RelayError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }
}

/// Resolved credentials for a chat completion vendor.
#[derive(Debug, Clone)]
pub struct ProviderCfg {
    pub api_key: SecretString,
    pub base: String,
    pub model: String,
}

#[derive(Debug, Clone, Default)]
pub struct TtsCfg {
    pub elevenlabs_key: Option<SecretString>,
    pub elevenlabs_voice_id: String,
    pub azure_key: Option<SecretString>,
    pub azure_region: String,
}

/// Runtime configuration: file defaults with environment-resolved secrets.
/// An absent key (or a placeholder left over from an env template) leaves the
/// corresponding provider unconfigured, which is what switches the
/// orchestrator into demo mode.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub openai: Option<ProviderCfg>,
    pub anthropic: Option<ProviderCfg>,
    pub tts: TtsCfg,
    pub http: HttpCfg,
    pub demo: DemoCfg,
}

impl Config {
    pub fn from_env() -> Self {
        Self::resolve(&ConfigFile::default())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        Ok(Self::resolve(&ConfigFile::from_path(path)?))
    }

    /// Overlay environment variables onto file defaults.
    pub fn resolve(file: &ConfigFile) -> Self {
        let openai_env = file
            .providers
            .openai
            .as_ref()
            .map(|p| p.api_key_env.as_str())
            .unwrap_or("OPENAI_API_KEY");
        let anthropic_env = file
            .providers
            .anthropic
            .as_ref()
            .map(|p| p.api_key_env.as_str())
            .unwrap_or("ANTHROPIC_API_KEY");

        let openai = usable_env(openai_env).map(|key| ProviderCfg {
            api_key: key.into(),
            base: file
                .providers
                .openai
                .as_ref()
                .and_then(|p| p.base.clone())
                .or_else(|| std::env::var("OPENAI_BASE").ok())
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: file
                .providers
                .openai
                .as_ref()
                .and_then(|p| p.model.clone())
                .unwrap_or_else(|| "gpt-4-turbo-preview".to_string()),
        });

        let anthropic = usable_env(anthropic_env).map(|key| ProviderCfg {
            api_key: key.into(),
            base: file
                .providers
                .anthropic
                .as_ref()
                .and_then(|p| p.base.clone())
                .or_else(|| std::env::var("ANTHROPIC_BASE").ok())
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model: file
                .providers
                .anthropic
                .as_ref()
                .and_then(|p| p.model.clone())
                .unwrap_or_else(|| "claude-3-opus-20240229".to_string()),
        });

        let tts = TtsCfg {
            elevenlabs_key: usable_env(&file.tts.elevenlabs_key_env).map(Into::into),
            elevenlabs_voice_id: file.tts.elevenlabs_voice_id.clone(),
            azure_key: usable_env(&file.tts.azure_key_env).map(Into::into),
            azure_region: std::env::var(&file.tts.azure_region_env)
                .unwrap_or_else(|_| "eastus".to_string()),
        };

        Self {
            openai,
            anthropic,
            tts,
            http: file.http.clone(),
            demo: file.demo.clone(),
        }
    }

    /// True when at least one live completion provider has credentials.
    pub fn has_completion_provider(&self) -> bool {
        self.openai.is_some() || self.anthropic.is_some()
    }
}

/// Reads an environment variable, rejecting empty values and template
/// placeholders like `your_openai_key_here`.
fn usable_env(name: &str) -> Option<String> {
    let v = std::env::var(name).ok()?;
    if is_usable_key(&v) { Some(v) } else { None }
}

pub(crate) fn is_usable_key(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && !(v.starts_with("your_") && v.ends_with("_here"))
}
