//! Urgency classification.
//!
//! First match wins:
//!   1. Body contains the urgency keyword (case-insensitive) -> High
//!   2. Polarity strictly below the threshold -> High
//!   3. Otherwise -> Normal

use serde::{Deserialize, Serialize};

use crate::types::Urgency;

/// Default keyword that marks a message as urgent.
pub const DEFAULT_URGENT_KEYWORD: &str = "urgent";

/// Default polarity below which a message is treated as urgent.
pub const DEFAULT_POLARITY_THRESHOLD: f64 = -0.5;

/// Tunable classification policy, loaded from the `classifier` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgencyPolicy {
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_threshold")]
    pub polarity_threshold: f64,
}

fn default_keyword() -> String {
    DEFAULT_URGENT_KEYWORD.to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_POLARITY_THRESHOLD
}

impl Default for UrgencyPolicy {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            polarity_threshold: default_threshold(),
        }
    }
}

impl UrgencyPolicy {
    /// Classify a message body given its polarity.
    pub fn classify(&self, body: &str, polarity: f64) -> Urgency {
        let keyword = self.keyword.to_lowercase();
        if !keyword.is_empty() && body.to_lowercase().contains(&keyword) {
            return Urgency::High;
        }
        if polarity < self.polarity_threshold {
            return Urgency::High;
        }
        Urgency::Normal
    }
}

/// Classify with the default policy.
pub fn classify(body: &str, polarity: f64) -> Urgency {
    UrgencyPolicy::default().classify(body, polarity)
}
