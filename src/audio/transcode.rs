// TuneFree - Encrypted Music Container Converter
// Copyright (C) 2025 TuneFree contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! External transcoder adapter
//!
//! Wraps the ffmpeg CLI in "overwrite, quiet" mode:
//!
//! ```text
//! ffmpeg -y -hide_banner -loglevel error -i <input> -map_metadata 0 [codec] <output>
//! ```
//!
//! Codec arguments per target: WAV `-c:a pcm_s16le`, FLAC `-c:a flac`,
//! MP3 `-q:a <quality>` with quality restricted to the GUI's presets.
//! The "copy" format never reaches this adapter. Stderr is captured and
//! becomes the error detail on failure; cancellation kills the child.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::batch::CancelToken;
use crate::error::{Result, TuneFreeError};

/// Requested output format for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Flac,
    Wav,
    /// Keep the decrypted stream as-is
    Copy,
}

impl OutputFormat {
    /// Parse a user-supplied format string; anything unknown becomes mp3.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "flac" => OutputFormat::Flac,
            "wav" => OutputFormat::Wav,
            "copy" => OutputFormat::Copy,
            _ => OutputFormat::Mp3,
        }
    }

    /// Extension for concrete formats; `Copy` takes the sniffed one
    /// instead and has none of its own.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Mp3 => Some("mp3"),
            OutputFormat::Flac => Some("flac"),
            OutputFormat::Wav => Some("wav"),
            OutputFormat::Copy => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
            OutputFormat::Wav => "wav",
            OutputFormat::Copy => "copy",
        }
    }
}

/// MP3 VBR quality preset
///
/// The GUI exposes 0 (best), 2, 5 and 7; any other value clamps to 2,
/// including values arriving through deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Mp3Quality(u8);

impl Mp3Quality {
    pub fn new(raw: i64) -> Self {
        match raw {
            0 | 2 | 5 | 7 => Mp3Quality(raw as u8),
            _ => Mp3Quality(2),
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<i64> for Mp3Quality {
    fn from(raw: i64) -> Self {
        Mp3Quality::new(raw)
    }
}

impl From<Mp3Quality> for i64 {
    fn from(q: Mp3Quality) -> Self {
        q.0 as i64
    }
}

impl Default for Mp3Quality {
    fn default() -> Self {
        Mp3Quality(2)
    }
}

/// ffmpeg process adapter
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }

    /// Build the full argument list for one conversion.
    fn build_args(
        input: &Path,
        output: &Path,
        format: OutputFormat,
        quality: Mp3Quality,
    ) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(input.to_string_lossy().into_owned());
        args.push("-map_metadata".into());
        args.push("0".into());

        match format {
            OutputFormat::Wav => {
                args.push("-c:a".into());
                args.push("pcm_s16le".into());
            }
            OutputFormat::Flac => {
                args.push("-c:a".into());
                args.push("flac".into());
            }
            // Copy never reaches the transcoder; treat it as mp3 if it
            // somehow does, matching the format normalization fallback.
            OutputFormat::Mp3 | OutputFormat::Copy => {
                args.push("-q:a".into());
                args.push(quality.value().to_string());
            }
        }

        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// Run ffmpeg, waiting for completion or cancellation.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        quality: Mp3Quality,
        cancel: &CancelToken,
    ) -> Result<()> {
        let args = Self::build_args(input, output, format, quality);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TuneFreeError::transcode(format!(
                        "ffmpeg not found at {:?}; install it or adjust the configured path",
                        self.ffmpeg
                    ))
                } else {
                    TuneFreeError::transcode(format!("failed to start ffmpeg: {e}"))
                }
            })?;

        // Drain stderr concurrently so a chatty child can't fill the pipe
        // while we wait on it.
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TuneFreeError::transcode("failed to capture ffmpeg stderr"))?;
        let stderr_task = tokio::spawn(async move {
            let mut msg = String::new();
            let _ = stderr.read_to_string(&mut msg).await;
            msg
        });

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let message = stderr_task.await.unwrap_or_default();
                if !status.success() {
                    let message = message.trim();
                    let detail = if message.is_empty() {
                        format!("ffmpeg exited with {status}")
                    } else {
                        message.to_string()
                    };
                    return Err(TuneFreeError::transcode(detail));
                }
                if !output.exists() {
                    return Err(TuneFreeError::transcode("transcoder output missing"));
                }
                Ok(())
            }
            _ = cancel.cancelled() => {
                warn!("cancelling ffmpeg for {:?}", input);
                let _ = child.kill().await;
                Err(TuneFreeError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_format_falls_back_to_mp3() {
        assert_eq!(OutputFormat::normalize("FLAC"), OutputFormat::Flac);
        assert_eq!(OutputFormat::normalize(" wav "), OutputFormat::Wav);
        assert_eq!(OutputFormat::normalize("copy"), OutputFormat::Copy);
        assert_eq!(OutputFormat::normalize("ogg"), OutputFormat::Mp3);
        assert_eq!(OutputFormat::normalize(""), OutputFormat::Mp3);
    }

    #[test]
    fn quality_clamps_to_presets() {
        assert_eq!(Mp3Quality::new(0).value(), 0);
        assert_eq!(Mp3Quality::new(5).value(), 5);
        assert_eq!(Mp3Quality::new(7).value(), 7);
        assert_eq!(Mp3Quality::new(99).value(), 2);
        assert_eq!(Mp3Quality::new(-1).value(), 2);
        assert_eq!(Mp3Quality::new(3).value(), 2);
    }

    #[test]
    fn wav_args() {
        let args = Transcoder::build_args(
            Path::new("/tmp/in.bin"),
            Path::new("/tmp/out.wav"),
            OutputFormat::Wav,
            Mp3Quality::default(),
        );
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "/tmp/in.bin",
                "-map_metadata",
                "0",
                "-c:a",
                "pcm_s16le",
                "/tmp/out.wav",
            ]
        );
    }

    #[test]
    fn flac_args() {
        let args = Transcoder::build_args(
            Path::new("in"),
            Path::new("out.flac"),
            OutputFormat::Flac,
            Mp3Quality::default(),
        );
        assert_eq!(&args[8..10], &["-c:a".to_string(), "flac".to_string()]);
    }

    #[test]
    fn mp3_args_carry_clamped_quality() {
        let args = Transcoder::build_args(
            Path::new("in"),
            Path::new("out.mp3"),
            OutputFormat::Mp3,
            Mp3Quality::new(99),
        );
        assert_eq!(&args[8..10], &["-q:a".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn missing_binary_reports_transcode_failure() {
        let t = Transcoder::new("/nonexistent/ffmpeg-binary");
        let err = t
            .transcode(
                Path::new("in"),
                Path::new("out.mp3"),
                OutputFormat::Mp3,
                Mp3Quality::default(),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TuneFreeError::TranscodeFailed(_)));
    }
}
