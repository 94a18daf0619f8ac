//! Subprocess command lines for the extraction and transcode stages.

use std::process::Stdio;

use tokio::process::Command;

/// Placeholder replaced by the source URL in extractor arguments.
pub const URL_PLACEHOLDER: &str = "{url}";

/// Default size of one chunk read from the transcoder.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Program plus argument template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with every `{url}` replaced.
    pub fn render_args(&self, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect()
    }

    /// Build the command. Stdout and stderr are piped; stdin is left to the caller.
    pub fn build(&self, url: &str) -> Command {
        let mut command = process_utils::tokio_command(&self.program);
        command
            .args(self.render_args(url))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

/// Everything the pipeline needs to run one playback.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Emits best-available audio for a URL on stdout.
    pub extractor: CommandSpec,
    /// Reads raw audio on stdin, writes MP3 on stdout.
    pub transcoder: CommandSpec,
    /// Source URL for a reference; `{id}` is replaced.
    pub source_url_template: String,
    pub chunk_size: usize,
    /// How long a stage may keep running after the transcoder closed its output
    /// before it is killed.
    pub exit_grace: std::time::Duration,
}

impl PipelineConfig {
    /// yt-dlp into ffmpeg at the given MP3 bitrate (e.g. `192k`).
    pub fn new(
        extractor_path: impl Into<String>,
        transcoder_path: impl Into<String>,
        bitrate: &str,
    ) -> Self {
        Self {
            extractor: CommandSpec::new(
                extractor_path,
                [
                    "-f",
                    "bestaudio",
                    "--no-playlist",
                    "--quiet",
                    "-o",
                    "-",
                    URL_PLACEHOLDER,
                ],
            ),
            transcoder: CommandSpec::new(
                transcoder_path,
                [
                    "-hide_banner",
                    "-loglevel",
                    "error",
                    "-i",
                    "pipe:0",
                    "-vn",
                    "-f",
                    "mp3",
                    "-b:a",
                    bitrate,
                    "pipe:1",
                ],
            ),
            source_url_template: "https://www.youtube.com/watch?v={id}".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            exit_grace: std::time::Duration::from_secs(5),
        }
    }

    pub fn source_url(&self, source_ref: &str) -> String {
        self.source_url_template.replace("{id}", source_ref)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new("yt-dlp", "ffmpeg", "192k")
    }
}
