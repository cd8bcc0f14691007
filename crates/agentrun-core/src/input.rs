//! Human decisions delivered to a paused run.

use serde::{Deserialize, Serialize};

/// A single decision answering a `HUMAN_INPUT_NEEDED` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInput {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HumanInput {
    /// An approval, optionally carrying the chosen value.
    pub fn approve(value: Option<String>) -> Self {
        Self {
            approved: true,
            value,
            reason: None,
        }
    }

    /// A rejection with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            value: None,
            reason: Some(reason.into()),
        }
    }
}
