use async_trait::async_trait;
use std::{path::Path, process::Stdio};
use tokio::io::{AsyncReadExt, AsyncWrite};
use tracing::debug;

use super::CacheError;

/// Turns a source media file into a streamable encoded byte stream.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// File extension of the encoded output, without the dot.
    fn extension(&self) -> &'static str;

    /// Encodes `source` into `sink`, returning the number of bytes written.
    async fn transcode(
        &self,
        source: &Path,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, CacheError>;
}

/// Encodes to Ogg/Opus at 48kHz stereo with an external `ffmpeg`.
pub struct FfmpegTranscoder {
    bitrate: u32,
}

impl FfmpegTranscoder {
    pub fn new(bitrate: u32) -> Self {
        Self { bitrate }
    }

    /// Checks that `ffmpeg` can be executed.
    pub async fn verify(&self) -> Result<(), CacheError> {
        let output = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(CacheError::Spawn)?;
        if !output.status.success() {
            return Err(CacheError::Transcoder {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn extension(&self) -> &'static str {
        "ogg"
    }

    async fn transcode(
        &self,
        source: &Path,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, CacheError> {
        let mut child = tokio::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(source)
            .args(["-vn", "-c:a", "libopus", "-b:a"])
            .arg(self.bitrate.to_string())
            .args(["-ar", "48000", "-ac", "2", "-f", "ogg", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CacheError::Spawn)?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CacheError::Io(std::io::Error::other("ffmpeg stdout not captured")))?;

        // Drained concurrently so a chatty ffmpeg never blocks on a full pipe
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        let written = tokio::io::copy(&mut stdout, sink).await?;
        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(CacheError::Transcoder {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(source = %source.display(), bytes = written, "ffmpeg encode finished");
        Ok(written)
    }
}
