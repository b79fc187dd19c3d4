//! Re-encoding into the archive's progressive layout

use crate::ImageMetadata;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Default transcoder executable
pub const DEFAULT_KDU_TRANSCODE: &str = "kdu_transcode";

/// Transcode failures
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Executable could not be started
    #[error("failed to run {command}: {message}")]
    Spawn {
        /// Executable
        command: String,
        /// Underlying error
        message: String,
    },

    /// Executable exited unsuccessfully
    #[error("{command} failed on {path} ({status}): {stderr}")]
    Failed {
        /// Executable
        command: String,
        /// Input file
        path: String,
        /// Exit status
        status: String,
        /// Captured stderr
        stderr: String,
    },

    /// Replacing the original failed
    #[error("I/O error on {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        message: String,
    },
}

/// Encoding parameters for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Progression order
    pub order: &'static str,
    /// Precinct size, when the instrument requires one
    pub precincts: Option<(u32, u32)>,
    /// Generate packet length markers
    pub packet_lengths: bool,
}

impl TranscodeOptions {
    /// Parameters for an instrument
    pub fn for_instrument(instrument: &str) -> Self {
        let precincts = if instrument.eq_ignore_ascii_case("AIA") {
            Some((128, 128))
        } else {
            None
        };
        Self {
            order: "RPCL",
            precincts,
            packet_lengths: true,
        }
    }

    /// Command-line arguments transcoding `input` into `output`
    pub fn to_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
            format!("Corder={}", self.order).into(),
        ];
        if self.packet_lengths {
            args.push("ORGgen_plt=yes".into());
        }
        if let Some((width, height)) = self.precincts {
            args.push(format!("Cprecincts={{{width},{height}}}").into());
        }
        args
    }
}

/// Temporary output path next to `path`
pub fn temp_output_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp.jp2");
    PathBuf::from(name)
}

/// Rewrites a validated image in place
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode the file at `image.path`, replacing it
    async fn transcode(&self, image: &ImageMetadata) -> Result<(), TranscodeError>;
}

/// Runs Kakadu's `kdu_transcode`
#[derive(Debug, Clone)]
pub struct KakaduTranscoder {
    command: PathBuf,
}

impl KakaduTranscoder {
    /// Use the given executable
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for KakaduTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_KDU_TRANSCODE)
    }
}

#[async_trait]
impl Transcoder for KakaduTranscoder {
    async fn transcode(&self, image: &ImageMetadata) -> Result<(), TranscodeError> {
        let input = image.path.as_path();
        let output = temp_output_path(input);
        let args = TranscodeOptions::for_instrument(&image.instrument).to_args(input, &output);
        let command = self.command.display().to_string();

        debug!(command = %command, path = %input.display(), "Transcoding");

        let result = Command::new(&self.command)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::Spawn {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(TranscodeError::Failed {
                command,
                path: input.display().to_string(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if let Err(e) = tokio::fs::rename(&output, input).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(TranscodeError::Io {
                path: input.display().to_string(),
                message: e.to_string(),
            });
        }

        Ok(())
    }
}

/// Leaves files untouched (transcoding disabled)
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranscoder;

#[async_trait]
impl Transcoder for PassthroughTranscoder {
    async fn transcode(&self, _image: &ImageMetadata) -> Result<(), TranscodeError> {
        Ok(())
    }
}
