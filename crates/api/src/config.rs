use anyhow::{Context, Result, bail};
use listing::{FeatureFlags, FlowConfig, GeminiClient, GenerativeModel, OllamaClient, PriceRounding, RetryConfig};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub log_json: bool,
    pub model: ModelConfig,
    pub flows: FlowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ModelConfig {
    Ollama {
        base_url: String,
        model: String,
    },
    Gemini {
        base_url: String,
        model: String,
        #[serde(skip_serializing)]
        api_key: String,
    },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            log_json: false,
            model: ModelConfig::Ollama {
                base_url: "http://localhost:11434".to_string(),
                model: "llava".to_string(),
            },
            flows: FlowConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn build(&self) -> Arc<dyn GenerativeModel> {
        match self {
            ModelConfig::Ollama { base_url, model } => {
                Arc::new(OllamaClient::new(base_url.clone(), model.clone()))
            }
            ModelConfig::Gemini { base_url, model, api_key } => {
                Arc::new(GeminiClient::new(base_url.clone(), model.clone(), api_key.clone()))
            }
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Read settings from the process environment (after `.env` is loaded)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = AppConfig::default();
        let flow_defaults = FlowConfig::default();
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider = var("LISTING_MODEL_PROVIDER", "ollama").to_lowercase();
        let model = match provider.as_str() {
            "ollama" => ModelConfig::Ollama {
                base_url: var("OLLAMA_URL", "http://localhost:11434"),
                model: var("OLLAMA_MODEL", "llava"),
            },
            "gemini" | "googleai" => {
                let Some(api_key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) else {
                    bail!("GEMINI_API_KEY must be set when LISTING_MODEL_PROVIDER=gemini");
                };
                ModelConfig::Gemini {
                    base_url: var("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com"),
                    model: var("GEMINI_MODEL", "gemini-2.0-flash"),
                    api_key,
                }
            }
            other => bail!("unknown LISTING_MODEL_PROVIDER {:?} (expected ollama or gemini)", other),
        };

        let price_step: u32 = parse_var(&lookup, "LISTING_PRICE_STEP", 1)?;
        let pricing = if price_step > 1 {
            PriceRounding::Nearest(price_step)
        } else {
            PriceRounding::Whole
        };

        let flows = FlowConfig {
            request_timeout_secs: parse_var(
                &lookup,
                "LISTING_REQUEST_TIMEOUT_SECS",
                flow_defaults.request_timeout_secs,
            )?,
            retry: RetryConfig {
                max_retries: parse_var(&lookup, "LISTING_MAX_RETRIES", flow_defaults.retry.max_retries)?,
                ..flow_defaults.retry
            },
            pricing,
            features: FeatureFlags {
                enforce_title_limit: parse_var(
                    &lookup,
                    "LISTING_ENFORCE_TITLE_LIMIT",
                    flow_defaults.features.enforce_title_limit,
                )?,
                chat_import: parse_var(&lookup, "LISTING_CHAT_IMPORT", flow_defaults.features.chat_import)?,
            },
        };

        if flows.request_timeout_secs == 0 {
            bail!("LISTING_REQUEST_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            bind_addr: var("LISTING_BIND_ADDR", &defaults.bind_addr),
            log_json: parse_var(&lookup, "LISTING_LOG_JSON", defaults.log_json)?,
            model,
            flows,
        })
    }
}
