use std::fmt::Display;

use crate::error::CoreError;

/// Bitrate used for lossy downloads when the caller does not ask for one.
pub const DEFAULT_BITRATE_KBPS: u32 = 320;

/// Quality tier for streaming playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamQuality {
    Low,
    Medium,
    #[default]
    High,
    Best,
}

impl StreamQuality {
    /// Unknown tokens fall back to the default tier.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "best" => Self::Best,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Best => "best",
        }
    }

    /// Format selector handed to the extraction backend.
    pub fn format_selector(&self) -> &'static str {
        match self {
            Self::Low => "worstaudio/worst",
            Self::Medium => "bestaudio[abr<=128]/bestaudio",
            Self::High => "bestaudio[abr<=192]/bestaudio",
            Self::Best => "bestaudio/best",
        }
    }
}

impl Display for StreamQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Mp3,
    Flac,
}

impl AudioCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
        }
    }
}

/// Target encoding of a downloaded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadQuality {
    Lossless,
    Lossy { bitrate_kbps: u32 },
}

impl Default for DownloadQuality {
    fn default() -> Self {
        Self::Lossy {
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

impl DownloadQuality {
    /// `"flac"` in any case selects lossless output, anything else must be a bitrate.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("flac") {
            return Ok(Self::Lossless);
        }
        let digits = token
            .strip_suffix("kbps")
            .or_else(|| token.strip_suffix('k'))
            .unwrap_or(token);
        match digits.parse::<u32>() {
            Ok(bitrate_kbps) if bitrate_kbps > 0 => Ok(Self::Lossy { bitrate_kbps }),
            _ => Err(CoreError::InvalidRequest(format!(
                "unsupported download quality '{token}'"
            ))),
        }
    }

    pub fn codec(&self) -> AudioCodec {
        match self {
            Self::Lossless => AudioCodec::Flac,
            Self::Lossy { .. } => AudioCodec::Mp3,
        }
    }

    /// Value for the transcoder's quality option; lossless output takes no bitrate.
    pub fn transcoder_quality(&self) -> String {
        match self {
            Self::Lossless => "0".to_string(),
            Self::Lossy { bitrate_kbps } => format!("{bitrate_kbps}K"),
        }
    }

    /// Label stored with the download record.
    pub fn label(&self) -> String {
        match self {
            Self::Lossless => "flac".to_string(),
            Self::Lossy { bitrate_kbps } => format!("{bitrate_kbps}kbps"),
        }
    }
}
