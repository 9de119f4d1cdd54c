//! Audio transcoding via the external ffmpeg tool
//!
//! Two conversions: WAV -> OGG/Opus for uploads, and anything -> WAV for
//! the acoustic comparison path (wiki downloads arrive as OGG).

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Transcoder errors
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// ffmpeg binary not found in PATH
    #[error("ffmpeg binary not found in PATH")]
    BinaryNotFound,

    /// Failed to spawn ffmpeg
    #[error("Failed to execute ffmpeg: {0}")]
    ExecutionError(String),

    /// ffmpeg exited non-zero
    #[error("Transcode failed for {input}: {stderr}")]
    TranscodeFailed { input: String, stderr: String },

    /// Input file not found
    #[error("Audio file not found: {0}")]
    FileNotFound(String),
}

/// ffmpeg-backed transcoder
#[derive(Debug, Clone)]
pub struct Transcoder {
    binary_path: String,
}

impl Transcoder {
    /// Verify ffmpeg is reachable; absence is fatal for the run
    pub fn new() -> Result<Self, TranscodeError> {
        let binary_path = "ffmpeg";
        match Command::new(binary_path).arg("-version").output() {
            Ok(_) => Ok(Self {
                binary_path: binary_path.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TranscodeError::BinaryNotFound)
            }
            Err(e) => Err(TranscodeError::ExecutionError(e.to_string())),
        }
    }

    #[cfg(test)]
    pub fn with_binary(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Encode a WAV into OGG/Opus at the given output path
    pub async fn wav_to_ogg(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run(input, output, &["-c:a", "libopus", "-b:a", "96k"])
            .await
    }

    /// Decode any supported input (typically an OGG wiki download) to WAV
    pub async fn to_wav(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run(input, output, &["-c:a", "pcm_s16le"]).await
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        codec_args: &[&str],
    ) -> Result<PathBuf, TranscodeError> {
        if !input.exists() {
            return Err(TranscodeError::FileNotFound(input.display().to_string()));
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TranscodeError::ExecutionError(e.to_string()))?;
        }

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            "Running ffmpeg transcode"
        );

        let result = tokio::task::spawn_blocking({
            let binary = self.binary_path.clone();
            let input = input.to_path_buf();
            let output = output.to_path_buf();
            let codec_args: Vec<String> = codec_args.iter().map(|s| s.to_string()).collect();

            move || {
                Command::new(&binary)
                    .arg("-y")
                    .arg("-hide_banner")
                    .arg("-loglevel")
                    .arg("error")
                    .arg("-i")
                    .arg(&input)
                    .args(&codec_args)
                    .arg(&output)
                    .output()
            }
        })
        .await
        .map_err(|e| TranscodeError::ExecutionError(format!("Task join error: {}", e)))?
        .map_err(|e| TranscodeError::ExecutionError(e.to_string()))?;

        if !result.status.success() {
            return Err(TranscodeError::TranscodeFailed {
                input: input.display().to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).to_string(),
            });
        }

        Ok(output.to_path_buf())
    }
}
