//! Environment configuration.
//!
//! Everything has a default except provider credentials; a provider with no
//! credentials simply contributes empty result lists. Values may come from a
//! `.env` file loaded by `main`.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::cache::CacheTtls;
use crate::credentials::{CredentialSlot, slots_from_keys};
use crate::domain::ProviderId;
use crate::error::{Error, Result};
use crate::housekeeping::{DEFAULT_GRACE, DEFAULT_SWEEP_INTERVAL};
use crate::media::PipelineConfig;
use crate::providers::{self, DEFAULT_IMAGE};

/// Default SQLite database, created on first start.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:tunestream.db?mode=rwc";

/// `DATABASE_URL` value that keeps the cache in process memory.
pub const MEMORY_DATABASE: &str = "memory";

/// Highest `YOUTUBE_API_KEY{n}` looked at.
const MAX_NUMBERED_KEYS: usize = 16;

/// One external provider's endpoint and credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub credentials: Vec<CredentialSlot>,
}

/// Scratch directory sweep settings.
#[derive(Debug, Clone)]
pub struct ScratchConfig {
    pub dir: PathBuf,
    pub interval: Duration,
    pub grace: Duration,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    /// `None` keeps the cache in memory and serves an empty local catalog.
    pub database_url: Option<String>,
    /// Base of the `audio` links handed out for video tracks.
    pub public_base_url: String,
    pub video: ProviderConfig,
    pub audio: ProviderConfig,
    pub provider_timeout: Duration,
    pub cache_ttls: CacheTtls,
    pub pipeline: PipelineConfig,
    pub scratch: ScratchConfig,
    pub log_dir: Option<PathBuf>,
    pub default_image: String,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let mut server = ApiServerConfig::default();
        if let Some(bind_address) = env.get("API_BIND_ADDRESS") {
            server.bind_address = bind_address;
        }
        if let Some(port) = env.parse::<u16>("API_PORT")?.or(env.parse::<u16>("PORT")?) {
            server.port = port;
        }

        let database_url = match env.get("DATABASE_URL") {
            Some(url) if url.eq_ignore_ascii_case(MEMORY_DATABASE) => None,
            Some(url) => Some(url),
            None => Some(DEFAULT_DATABASE_URL.to_string()),
        };

        let public_base_url = env
            .get("PUBLIC_BASE_URL")
            .or_else(|| env.get("BACKEND_URL"))
            .unwrap_or_else(|| format!("http://localhost:{}", server.port))
            .trim_end_matches('/')
            .to_string();

        let video = ProviderConfig {
            base_url: env
                .get("YOUTUBE_API_URL")
                .unwrap_or_else(|| providers::VIDEO_BASE_URL.to_string()),
            credentials: video_credentials(&env),
        };
        let audio = ProviderConfig {
            base_url: env
                .get("JAMENDO_API_URL")
                .unwrap_or_else(|| providers::AUDIO_BASE_URL.to_string()),
            credentials: audio_credentials(&env),
        };

        check_url("PUBLIC_BASE_URL", &public_base_url)?;
        check_url("YOUTUBE_API_URL", &video.base_url)?;
        check_url("JAMENDO_API_URL", &audio.base_url)?;

        let defaults = CacheTtls::default();
        let cache_ttls = CacheTtls {
            trending: env.secs("TRENDING_TTL_SECS")?.unwrap_or(defaults.trending),
            audio_trending: env
                .secs("AUDIO_TRENDING_TTL_SECS")?
                .unwrap_or(defaults.audio_trending),
            video_trending: env
                .secs("VIDEO_TRENDING_TTL_SECS")?
                .unwrap_or(defaults.video_trending),
            search: env.secs("SEARCH_TTL_SECS")?.unwrap_or(defaults.search),
        };

        let pipeline = PipelineConfig::new(
            env.get("EXTRACTOR_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            env.get("TRANSCODER_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            &env.get("TRANSCODE_BITRATE").unwrap_or_else(|| "192k".to_string()),
        );

        let scratch = ScratchConfig {
            dir: env
                .get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmp")),
            interval: env
                .secs("SCRATCH_SWEEP_INTERVAL_SECS")?
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            grace: env.secs("SCRATCH_GRACE_SECS")?.unwrap_or(DEFAULT_GRACE),
        };
        if scratch.interval.is_zero() {
            return Err(Error::config("SCRATCH_SWEEP_INTERVAL_SECS must be positive"));
        }

        let provider_timeout = env
            .secs("PROVIDER_TIMEOUT_SECS")?
            .unwrap_or(Duration::from_secs(10));
        if provider_timeout.is_zero() {
            return Err(Error::config("PROVIDER_TIMEOUT_SECS must be positive"));
        }

        Ok(Self {
            server,
            database_url,
            public_base_url,
            video,
            audio,
            provider_timeout,
            cache_ttls,
            pipeline,
            scratch,
            log_dir: env.get("LOG_DIR").map(PathBuf::from),
            default_image: env
                .get("DEFAULT_IMAGE")
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
        })
    }

    /// Every configured credential, for the key rotation pool.
    pub fn credential_slots(&self) -> impl Iterator<Item = CredentialSlot> + '_ {
        self.video
            .credentials
            .iter()
            .chain(self.audio.credentials.iter())
            .cloned()
    }
}

/// `YOUTUBE_API_KEYS` if set, else `YOUTUBE_API_KEY` then `YOUTUBE_API_KEY1..N`.
fn video_credentials<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Vec<CredentialSlot> {
    if let Some(list) = env.get("YOUTUBE_API_KEYS") {
        return slots_from_keys(ProviderId::Video, list.split(','));
    }

    let numbered = (1..=MAX_NUMBERED_KEYS).filter_map(|n| env.get(&format!("YOUTUBE_API_KEY{n}")));
    slots_from_keys(
        ProviderId::Video,
        env.get("YOUTUBE_API_KEY").into_iter().chain(numbered),
    )
}

/// `JAMENDO_CLIENT_IDS` if set, else the single `JAMENDO_CLIENT_ID`.
///
/// `JAMENDO_CLIENT_SECRET` is attached to the first slot only.
fn audio_credentials<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Vec<CredentialSlot> {
    let mut slots = match env.get("JAMENDO_CLIENT_IDS") {
        Some(list) => slots_from_keys(ProviderId::Audio, list.split(',')),
        None => slots_from_keys(ProviderId::Audio, env.get("JAMENDO_CLIENT_ID")),
    };

    if let Some(secret) = env.get("JAMENDO_CLIENT_SECRET")
        && let Some(first) = slots.first_mut()
    {
        first.secret = Some(secret);
    }
    slots
}

fn check_url(name: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::config(format!("Invalid {name} '{value}': {e}")))
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("Invalid {name} '{raw}': {e}")))
            })
            .transpose()
    }

    fn secs(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_secs))
    }
}
