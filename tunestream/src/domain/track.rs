//! Normalized track representation shared by every provider.

use serde::{Deserialize, Serialize};

/// Origin of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Video-search provider (YouTube Data API shape).
    Video,
    /// Audio-catalog provider (Jamendo shape).
    Audio,
    /// The app's own song catalog.
    Local,
}

impl ProviderId {
    /// Get the provider from its path segment.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "video" | "youtube" => Some(Self::Video),
            "audio" | "jamendo" => Some(Self::Audio),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One playable item.
///
/// Built once at the provider boundary and never mutated afterwards. The serde
/// names are the wire contract consumed by the UI: `{id, name, artist_name,
/// audio, image, duration}`, plus the `provider` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub provider: ProviderId,
    /// Provider-specific reference: a video id or a catalog track id.
    #[serde(rename = "id")]
    pub source_ref: String,
    #[serde(rename = "name")]
    pub title: String,
    pub artist_name: String,
    #[serde(rename = "image")]
    pub thumbnail_url: String,
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
    /// URL the player fetches audio from.
    #[serde(rename = "audio")]
    pub playable_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Track {
        Track {
            provider: ProviderId::Video,
            source_ref: "dQw4w9WgXcQ".to_string(),
            title: "Song".to_string(),
            artist_name: "Channel".to_string(),
            thumbnail_url: "https://i.ytimg.com/hq.jpg".to_string(),
            duration_seconds: 213,
            playable_ref: "http://localhost:5000/media/stream/dQw4w9WgXcQ".to_string(),
        }
    }

    #[test]
    fn serializes_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "dQw4w9WgXcQ");
        assert_eq!(json["name"], "Song");
        assert_eq!(json["artist_name"], "Channel");
        assert_eq!(json["image"], "https://i.ytimg.com/hq.jpg");
        assert_eq!(json["duration"], 213);
        assert_eq!(json["audio"], "http://localhost:5000/media/stream/dQw4w9WgXcQ");
        assert_eq!(json["provider"], "video");
    }

    #[test]
    fn provider_parse_accepts_aliases() {
        assert_eq!(ProviderId::parse("YouTube"), Some(ProviderId::Video));
        assert_eq!(ProviderId::parse("jamendo"), Some(ProviderId::Audio));
        assert_eq!(ProviderId::parse("local"), Some(ProviderId::Local));
        assert_eq!(ProviderId::parse("spotify"), None);
    }
}
