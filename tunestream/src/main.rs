use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tunestream::aggregation::AggregationService;
use tunestream::api::{ApiServer, AppState};
use tunestream::cache::ResultCache;
use tunestream::config::AppConfig;
use tunestream::credentials::KeyRotationPool;
use tunestream::database::{
    self,
    repositories::{
        CacheRepository, EmptyCatalog, LocalCatalog, MemoryCacheRepository, SqlxCacheRepository,
        SqlxLocalCatalog,
    },
};
use tunestream::domain::ProviderId;
use tunestream::housekeeping::ScratchSweeper;
use tunestream::logging;
use tunestream::media::MediaPipeline;
use tunestream::presence::{BroadcastPresence, PlaybackActivity};
use tunestream::providers::{self, AudioCatalogClient, PooledProvider, VideoSearchClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let (logging_config, _log_guard) = logging::init_logging(config.log_dir.as_deref())?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let (cache_repository, catalog): (Arc<dyn CacheRepository>, Arc<dyn LocalCatalog>) =
        match &config.database_url {
            Some(url) => {
                let pool = database::init_pool(url)
                    .await
                    .with_context(|| format!("Failed to open database {url}"))?;
                database::run_migrations(&pool).await?;
                info!("Database ready");
                (
                    Arc::new(SqlxCacheRepository::new(pool.clone())),
                    Arc::new(SqlxLocalCatalog::new(pool, config.default_image.clone())),
                )
            }
            None => {
                warn!("No database configured, using in-memory cache and an empty local catalog");
                (Arc::new(MemoryCacheRepository::new()), Arc::new(EmptyCatalog))
            }
        };

    let http = providers::build_client(config.provider_timeout);
    let key_pool = Arc::new(KeyRotationPool::new(config.credential_slots()));
    for provider in [ProviderId::Video, ProviderId::Audio] {
        let count = key_pool.credentials(provider).len();
        if count == 0 {
            warn!(%provider, "No credentials configured; provider results will be empty");
        } else {
            info!(%provider, count, "Provider credentials loaded");
        }
    }

    let video = PooledProvider::new(
        Arc::new(
            VideoSearchClient::new(
                http.clone(),
                config.video.base_url.clone(),
                config.public_base_url.clone(),
            )
            .with_default_image(config.default_image.clone()),
        ),
        key_pool.clone(),
        config.provider_timeout,
    );
    let audio = PooledProvider::new(
        Arc::new(
            AudioCatalogClient::new(http, config.audio.base_url.clone())
                .with_default_image(config.default_image.clone()),
        ),
        key_pool,
        config.provider_timeout,
    );
    let cache = ResultCache::new(cache_repository, config.cache_ttls);
    let aggregation = AggregationService::new(video, audio, catalog, cache);

    let presence = BroadcastPresence::default();
    tokio::spawn(log_presence(presence.subscribe(), shutdown.clone()));
    let pipeline = MediaPipeline::new(config.pipeline.clone(), Arc::new(presence));

    ScratchSweeper::new(config.scratch.dir.clone())
        .with_interval(config.scratch.interval)
        .with_grace(config.scratch.grace)
        .start(shutdown.clone());

    let state = AppState::new(Arc::new(aggregation), pipeline)
        .with_logging_config(logging_config.clone());
    let server = ApiServer::new(config.server.clone(), state).with_cancel_token(shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        signal_token.cancel();
    });

    info!(version = env!("CARGO_PKG_VERSION"), "tunestream starting");
    let result = server.run().await;
    shutdown.cancel();
    result?;

    info!("tunestream stopped");
    Ok(())
}

/// Playback activity has no in-process consumer besides the log.
async fn log_presence(mut activity: Receiver<PlaybackActivity>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = activity.recv() => match event {
                Ok(PlaybackActivity::Started { session_id, source_ref }) => {
                    debug!(%session_id, %source_ref, "Playback started");
                }
                Ok(PlaybackActivity::Finished { session_id, outcome, bytes_sent, .. }) => {
                    debug!(%session_id, %outcome, bytes_sent, "Playback finished");
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Presence log lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
