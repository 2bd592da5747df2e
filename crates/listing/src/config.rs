use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pricing::PriceRounding;
use crate::retry::RetryConfig;

/// Everything the flows need, handed in at construction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub pricing: PriceRounding,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Reject titles over the 60 character target instead of only logging
    pub enforce_title_limit: bool,
    /// parse-chat is available
    pub chat_import: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enforce_title_limit: false,
            chat_import: true,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
            pricing: PriceRounding::Whole,
            features: FeatureFlags::default(),
        }
    }
}

impl FlowConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
