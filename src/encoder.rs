use std::process::Stdio;

use camino::Utf8Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Parameters wired into every transcoder invocation. Configurable
/// rather than hardcoded, since the target bitrate/channels/rate vary
/// per deployment.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub ffmpeg_path: String,
    pub bitrate_kbps: u32,
    pub channels: u8,
    pub sample_rate: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            ffmpeg_path: "ffmpeg".to_string(),
            bitrate_kbps: 128,
            channels: 2,
            sample_rate: 44_100,
        }
    }
}

/// Encapsulates invocation of the external audio transcoder. The only
/// component allowed to launch subprocesses.
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Encoder { config }
    }

    /// Launches the transcoder against `input_path` and copies its
    /// real-time MP3 output to `writer` until EOF or `cancel` fires.
    ///
    /// Returns `Ok(())` on clean EOF *and* on cancellation: cancellation
    /// is expected during skip/shutdown and is never reported as an
    /// error.
    pub async fn stream(
        &self,
        input_path: &Utf8Path,
        mut writer: impl AsyncWrite + Unpin,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .arg("-re")
            .arg("-i")
            .arg(input_path.as_str())
            .arg("-f")
            .arg("mp3")
            .arg("-b:a")
            .arg(format!("{}k", self.config.bitrate_kbps))
            .arg("-ac")
            .arg(self.config.channels.to_string())
            .arg("-ar")
            .arg(self.config.sample_rate.to_string())
            .arg("-vn")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Encoder(format!("failed to spawn transcoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Encoder("transcoder stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CoreError::Encoder("transcoder stderr was not captured".into()))?;

        let stderr_drain = tokio::spawn(drain_stderr(stderr));

        let copy_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("encoder stream cancelled, killing transcoder");
                let _ = child.start_kill();
                None
            }
            result = tokio::io::copy(&mut BufReader::new(stdout), &mut writer) => Some(result),
        };

        let _ = stderr_drain.await;
        let _ = writer.flush().await;

        if cancel.is_cancelled() {
            let _ = child.wait().await;
            return Ok(());
        }

        let copy_result = copy_result.expect("copy branch taken when not cancelled");
        copy_result.map_err(|e| CoreError::Encoder(format!("transcoder i/o error: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| CoreError::Encoder(format!("failed to wait on transcoder: {e}")))?;
        if !status.success() {
            return Err(CoreError::Encoder(format!(
                "transcoder exited with {status}"
            )));
        }
        Ok(())
    }

    /// One-shot, non-streaming conversion to OGG Vorbis, used during
    /// uploads for normalization.
    pub async fn convert_to_ogg(&self, input: &Utf8Path, output: &Utf8Path) -> CoreResult<()> {
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input.as_str())
            .arg("-c:a")
            .arg("libvorbis")
            .arg(output.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Encoder(format!("failed to spawn transcoder: {e}")))?
            .wait()
            .await
            .map_err(|e| CoreError::Encoder(format!("failed to wait on transcoder: {e}")))?;

        if !status.success() {
            return Err(CoreError::Encoder(format!(
                "ogg conversion exited with {status}"
            )));
        }
        Ok(())
    }
}

async fn drain_stderr(stderr: impl AsyncRead + Unpin) {
    use tokio::io::AsyncBufReadExt;
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "encoder::stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!("error reading transcoder stderr: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_failure_is_a_typed_encoder_error() {
        let encoder = Encoder::new(EncoderConfig {
            ffmpeg_path: "definitely-not-a-real-binary-xyz".into(),
            ..Default::default()
        });
        let mut sink = Vec::new();
        let result = encoder
            .stream(
                Utf8Path::new("/nonexistent.mp3"),
                &mut sink,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(CoreError::Encoder(_))));
    }

    #[tokio::test]
    async fn cancelled_stream_maps_to_ok() {
        let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fake_transcoder_block.sh");
        let encoder = Encoder::new(EncoderConfig { ffmpeg_path: fixture.into(), ..Default::default() });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let result = encoder.stream(Utf8Path::new("/nonexistent.mp3"), &mut sink, cancel).await;
        assert!(result.is_ok());
    }
}
