//! Extraction -> transcode -> client pipeline.
//!
//! [`MediaPipeline::open`] spawns both processes with the extractor's stdout
//! wired straight into the transcoder's stdin, waits for the first chunk of
//! audio and hands back a [`PipelineStream`]. A supervisor task owns both
//! children until they have exited and the stream has been dropped.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command::PipelineConfig;
use super::error::{PipelineError, Stage};
use super::session::{
    ProcessExit, SessionHandle, SessionOutcome, SessionReport, SessionState, SessionStateMachine,
};
use super::stream::{PipelineStream, StreamProgress};
use crate::presence::{PlaybackActivity, PresenceNotifier};

static SOURCE_REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Reject anything that is not a plain provider id before it reaches a command line.
pub fn validate_source_ref(source_ref: &str) -> Result<(), PipelineError> {
    if SOURCE_REF_REGEX.is_match(source_ref) {
        Ok(())
    } else {
        Err(PipelineError::InvalidSource(source_ref.to_string()))
    }
}

/// Spawns and tracks playback sessions.
#[derive(Clone)]
pub struct MediaPipeline {
    config: Arc<PipelineConfig>,
    presence: Arc<dyn PresenceNotifier>,
    active: Arc<AtomicUsize>,
    reports: broadcast::Sender<SessionReport>,
}

impl MediaPipeline {
    pub fn new(config: PipelineConfig, presence: Arc<dyn PresenceNotifier>) -> Self {
        let (reports, _) = broadcast::channel(32);
        Self {
            config: Arc::new(config),
            presence,
            active: Arc::new(AtomicUsize::new(0)),
            reports,
        }
    }

    /// Sessions whose processes are still being supervised.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Final reports of every session, including ones that never started.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<SessionReport> {
        self.reports.subscribe()
    }

    /// Start a playback and wait for its first chunk of audio.
    ///
    /// Errors are returned only while nothing has been sent, so the caller can
    /// still answer with a proper error response.
    pub async fn open(&self, source_ref: &str) -> Result<PipelineStream, PipelineError> {
        validate_source_ref(source_ref)?;

        let (report_tx, report_rx) = watch::channel(None);
        let ctx = SessionContext {
            session_id: Uuid::new_v4(),
            source_ref: source_ref.to_string(),
            machine: Arc::new(SessionStateMachine::new()),
            progress: Arc::new(StreamProgress::default()),
            report_tx,
            reports: self.reports.clone(),
            presence: self.presence.clone(),
        };
        let mut handle = SessionHandle::new(ctx.session_id, report_rx);
        let url = self.config.source_url(source_ref);

        debug!(session_id = %ctx.session_id, %url, "Starting playback pipeline");

        let mut extraction_cmd = self.config.extractor.build(&url);
        extraction_cmd.stdin(Stdio::null());
        let mut extraction = match extraction_cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = PipelineError::spawn_failed(Stage::Extraction, e);
                ctx.abandon(&err, None).await;
                return Err(err);
            }
        };

        let transcoder_stdin = match extraction
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("extraction stdout not captured"))
            .and_then(process_utils::chain_stdout)
        {
            Ok(stdin) => stdin,
            Err(e) => {
                let err = PipelineError::spawn_failed(Stage::Extraction, e);
                ctx.abandon(&err, Some(extraction)).await;
                return Err(err);
            }
        };

        let mut transcode_cmd = self.config.transcoder.build(&url);
        transcode_cmd.stdin(transcoder_stdin);
        let spawned = transcode_cmd.spawn();
        // The command keeps a copy of the pipe's read end; the extractor only
        // sees a broken pipe once that copy is gone too.
        drop(transcode_cmd);
        let mut transcode = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = PipelineError::spawn_failed(Stage::Transcode, e);
                ctx.abandon(&err, Some(extraction)).await;
                return Err(err);
            }
        };

        let Some(stdout) = transcode.stdout.take() else {
            let err = PipelineError::spawn_failed(
                Stage::Transcode,
                std::io::Error::other("transcode stdout not captured"),
            );
            ctx.abandon(&err, Some(extraction)).await;
            return Err(err);
        };

        if let Some(stderr) = extraction.stderr.take() {
            drain_stderr(stderr, Stage::Extraction, ctx.session_id);
        }
        if let Some(stderr) = transcode.stderr.take() {
            drain_stderr(stderr, Stage::Transcode, ctx.session_id);
        }

        ctx.machine.transition(SessionState::Running);

        let sink = CancellationToken::new();
        let abort = CancellationToken::new();
        let mut stream = PipelineStream::new(
            stdout,
            self.config.chunk_size,
            ctx.progress.clone(),
            handle.clone(),
            sink.clone().drop_guard(),
        );

        let session_id = ctx.session_id;
        let machine = ctx.machine.clone();
        let presence = ctx.presence.clone();
        let supervisor = Supervisor {
            ctx,
            sink,
            abort: abort.clone(),
            exit_grace: self.config.exit_grace,
            active: Some(ActiveGuard::new(self.active.clone())),
        };
        tokio::spawn(supervisor.run(extraction, transcode));

        match stream.prime().await {
            Some(Ok(())) => {
                if machine.transition(SessionState::Streaming) {
                    presence.notify(PlaybackActivity::Started {
                        session_id,
                        source_ref: source_ref.to_string(),
                    });
                }
                info!(%session_id, source_ref, "Playback streaming");
                Ok(stream)
            }
            Some(Err(e)) => {
                let err = PipelineError::exited(Stage::Transcode, format!("read failed: {e}"));
                machine.fail(err.to_string());
                abort.cancel();
                drop(stream);
                let _ = handle.closed().await;
                Err(err)
            }
            None => {
                drop(stream);
                let closed = tokio::time::timeout(self.config.exit_grace, handle.closed()).await;
                let report = match closed {
                    Ok(report) => report,
                    Err(_) => {
                        abort.cancel();
                        handle.closed().await
                    }
                };
                Err(classify_early_exit(report.as_ref()))
            }
        }
    }
}

/// Error for a session whose transcoder closed stdout before any audio.
fn classify_early_exit(report: Option<&SessionReport>) -> PipelineError {
    if let Some(report) = report {
        for (stage, exit) in [
            (Stage::Transcode, &report.transcode_exit),
            (Stage::Extraction, &report.extraction_exit),
        ] {
            if let Some(exit) = exit.as_ref().filter(|e| !e.success()) {
                return PipelineError::exited(stage, exit.description.clone());
            }
        }
    }
    PipelineError::EmptyOutput
}

fn drain_stderr(stderr: ChildStderr, stage: Stage, session_id: Uuid) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    // The transcoder runs at `-loglevel error`; the extractor is chattier.
                    if stage == Stage::Transcode || line.starts_with("ERROR") {
                        warn!(%session_id, %stage, "{}", line);
                    } else {
                        debug!(%session_id, %stage, "{}", line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%session_id, %stage, error = %e, "Stopped reading stderr");
                    break;
                }
            }
        }
    });
}

/// Counts a session as active for as long as it lives.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-session bookkeeping shared by the early-failure path and the supervisor.
struct SessionContext {
    session_id: Uuid,
    source_ref: String,
    machine: Arc<SessionStateMachine>,
    progress: Arc<StreamProgress>,
    report_tx: watch::Sender<Option<SessionReport>>,
    reports: broadcast::Sender<SessionReport>,
    presence: Arc<dyn PresenceNotifier>,
}

impl SessionContext {
    /// Fail a session that never reached `Running`: reap what was spawned and close.
    async fn abandon(&self, err: &PipelineError, extraction: Option<Child>) {
        warn!(
            session_id = %self.session_id,
            source_ref = %self.source_ref,
            error = %err,
            "Playback failed to start"
        );
        self.machine.fail(err.to_string());

        let extraction_exit = match extraction {
            Some(mut child) => {
                let _ = child.start_kill();
                Some(exit_of(child.wait().await))
            }
            None => None,
        };
        self.close(false, extraction_exit, None);
    }

    /// Enter `Closed` and publish the report.
    fn close(
        &self,
        disconnected: bool,
        extraction_exit: Option<ProcessExit>,
        transcode_exit: Option<ProcessExit>,
    ) -> SessionReport {
        let bytes_sent = self.progress.bytes_sent.load(Ordering::Relaxed);
        let outcome = match self.machine.failure() {
            Some(reason) => SessionOutcome::Failed(reason),
            None if disconnected => SessionOutcome::ClientDisconnected,
            None => SessionOutcome::Completed,
        };
        let streamed = self.machine.history().contains(&SessionState::Streaming);

        self.machine.transition(SessionState::Closed);
        let report = SessionReport {
            session_id: self.session_id,
            source_ref: self.source_ref.clone(),
            outcome,
            extraction_exit,
            transcode_exit,
            bytes_sent,
            transitions: self.machine.history(),
        };

        info!(
            session_id = %report.session_id,
            source_ref = %report.source_ref,
            outcome = report.outcome.as_str(),
            bytes_sent,
            "Playback closed"
        );
        if streamed {
            self.presence.notify(PlaybackActivity::Finished {
                session_id: report.session_id,
                source_ref: report.source_ref.clone(),
                outcome: report.outcome.as_str().to_string(),
                bytes_sent,
            });
        }
        self.report_tx.send_replace(Some(report.clone()));
        let _ = self.reports.send(report.clone());
        report
    }
}

fn exit_of(status: std::io::Result<ExitStatus>) -> ProcessExit {
    match status {
        Ok(status) => ProcessExit::from_status(&status),
        Err(e) => ProcessExit::wait_failed(&e),
    }
}

/// Owns both children of a running session until it is closed.
struct Supervisor {
    ctx: SessionContext,
    /// Cancelled when the client-facing stream is dropped.
    sink: CancellationToken,
    /// Cancelled by `open` to force both processes down.
    abort: CancellationToken,
    exit_grace: std::time::Duration,
    active: Option<ActiveGuard>,
}

impl Supervisor {
    async fn run(mut self, mut extraction: Child, mut transcode: Child) {
        let mut extraction_exit: Option<ProcessExit> = None;
        let mut transcode_exit: Option<ProcessExit> = None;
        let mut sink_closed = false;
        let mut killed = false;
        let mut disconnected = false;

        while extraction_exit.is_none() || transcode_exit.is_none() || !sink_closed {
            tokio::select! {
                status = extraction.wait(), if extraction_exit.is_none() => {
                    extraction_exit = Some(self.observe(Stage::Extraction, status, killed));
                }
                status = transcode.wait(), if transcode_exit.is_none() => {
                    transcode_exit = Some(self.observe(Stage::Transcode, status, killed));
                }
                _ = self.sink.cancelled(), if !sink_closed => {
                    sink_closed = true;
                    if !self.ctx.progress.eof.load(Ordering::Acquire) {
                        disconnected = true;
                        if !killed {
                            debug!(
                                session_id = %self.ctx.session_id,
                                "Client went away, stopping processes"
                            );
                            killed = true;
                            if extraction_exit.is_none() {
                                let _ = extraction.start_kill();
                            }
                            if transcode_exit.is_none() {
                                let _ = transcode.start_kill();
                            }
                        }
                    }
                }
                _ = self.abort.cancelled(), if !killed => {
                    killed = true;
                    if extraction_exit.is_none() {
                        let _ = extraction.start_kill();
                    }
                    if transcode_exit.is_none() {
                        let _ = transcode.start_kill();
                    }
                }
                _ = tokio::time::sleep(self.exit_grace),
                    if transcode_exit.is_some() && extraction_exit.is_none() && !killed => {
                    debug!(
                        session_id = %self.ctx.session_id,
                        "Extraction outlived the transcoder, stopping it"
                    );
                    killed = true;
                    let _ = extraction.start_kill();
                }
            }
        }

        if !disconnected
            && self.ctx.progress.bytes_sent.load(Ordering::Relaxed) == 0
            && self.ctx.machine.failure().is_none()
        {
            self.ctx.machine.fail(PipelineError::EmptyOutput.to_string());
        }

        // Release the gauge before anyone can observe the report.
        self.active.take();
        self.ctx.close(disconnected, extraction_exit, transcode_exit);
    }

    fn observe(
        &self,
        stage: Stage,
        status: std::io::Result<ExitStatus>,
        killed: bool,
    ) -> ProcessExit {
        let exit = exit_of(status);
        let session_id = self.ctx.session_id;
        if exit.success() {
            debug!(%session_id, %stage, "Process exited");
        } else if killed {
            debug!(%session_id, %stage, status = %exit.description, "Process stopped");
        } else {
            let err = PipelineError::exited(stage, exit.description.clone());
            warn!(%session_id, error = %err, "Playback process failed");
            self.ctx.machine.fail(err.to_string());
        }
        exit
    }
}
