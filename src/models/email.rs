//! Request/response models for the `send-email` function

use serde::{Deserialize, Serialize};

/// All fields are optional on the wire so missing ones can be reported by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendEmailRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

impl SendEmailRequest {
    /// Names of required fields that are absent or blank, in wire order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("to", &self.to),
            ("subject", &self.subject),
            ("html", &self.html),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailResponse {
    pub success: bool,
    pub message: String,
}
