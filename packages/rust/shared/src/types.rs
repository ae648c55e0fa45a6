//! Core domain types shared across Lingoflow crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LanguageCode
// ---------------------------------------------------------------------------

/// A language tag as stored in the `Lang` select property (e.g. `en`, `zh-hant`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Wrap a language tag. Tags are normalized to lowercase.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_lowercase())
    }

    /// The raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable name used when instructing the translation model.
    pub fn display_name(&self) -> &str {
        match self.0.as_str() {
            "en" => "English",
            "zh-hant" => "Traditional Chinese (Taiwan/HK)",
            "zh-hans" => "Simplified Chinese",
            "ja" => "Japanese",
            "ko" => "Korean",
            other => other,
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::str::FromStr for LanguageCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
