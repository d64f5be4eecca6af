use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-reported readiness of an on-device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Downloadable,
    Downloading,
    Unavailable,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Downloadable => "downloadable",
            Self::Downloading => "downloading",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether a session can be created, possibly after a download.
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    pub fn needs_download(self) -> bool {
        matches!(self, Self::Downloadable | Self::Downloading)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" | "readily" => Ok(Self::Available),
            "downloadable" | "after-download" => Ok(Self::Downloadable),
            "downloading" => Ok(Self::Downloading),
            "unavailable" | "no" => Ok(Self::Unavailable),
            other => Err(format!("unknown availability '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    LanguageModel,
    Summarizer,
    Writer,
    Rewriter,
    LanguageDetector,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::LanguageModel,
        Capability::Summarizer,
        Capability::Writer,
        Capability::Rewriter,
        Capability::LanguageDetector,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LanguageModel => "language-model",
            Self::Summarizer => "summarizer",
            Self::Writer => "writer",
            Self::Rewriter => "rewriter",
            Self::LanguageDetector => "language-detector",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Byte counters from a host download monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl DownloadProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }

    /// Rounded percentage in `0..=100`. An unknown total reports zero.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let ratio = self.loaded as f64 / self.total as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }
}
