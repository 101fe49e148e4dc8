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


//! Pipeline configuration
//!
//! Defaults match the shipped GUI profile. The host application owns
//! config-file parsing; this module only provides the struct, its defaults
//! and `KGC_*` environment overrides so headless runs can be steered
//! without a config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::{Mp3Quality, OutputFormat};

/// Batch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to the ffmpeg binary used for transcoding
    pub ffmpeg_bin: PathBuf,

    /// Directory converted files are written to
    pub output_dir: PathBuf,

    /// Worker count for batch conversion (clamped to 1..=6 at run time)
    pub concurrency: usize,

    /// Maximum number of files per batch
    pub max_files: usize,

    /// Maximum size of a single input file in bytes
    pub max_file_size: u64,

    /// Requested output format
    pub output_format: OutputFormat,

    /// MP3 VBR quality (valid values 0/2/5/7, anything else clamps to 2)
    pub mp3_quality: Mp3Quality,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            output_dir: PathBuf::from("output"),
            concurrency: 3,
            max_files: 500,
            max_file_size: 80 << 20,
            output_format: OutputFormat::Mp3,
            mp3_quality: Mp3Quality::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with `KGC_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("KGC_FFMPEG_BIN") {
            if !v.trim().is_empty() {
                cfg.ffmpeg_bin = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("KGC_OUTPUT_DIR") {
            if !v.trim().is_empty() {
                cfg.output_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("KGC_CONCURRENCY") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.concurrency = n;
                }
            }
        }
        if let Ok(v) = std::env::var("KGC_MAX_FILES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.max_files = n;
                }
            }
        }
        if let Ok(v) = std::env::var("KGC_MAX_FILE_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                if n > 0 {
                    cfg.max_file_size = n;
                }
            }
        }
        if let Ok(v) = std::env::var("KGC_OUTPUT_FORMAT") {
            cfg.output_format = OutputFormat::normalize(&v);
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_profile() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.max_files, 500);
        assert_eq!(cfg.max_file_size, 80 << 20);
        assert_eq!(cfg.output_format, OutputFormat::Mp3);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"concurrency": 5, "output_format": "flac"}"#).unwrap();
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.output_format, OutputFormat::Flac);
        assert_eq!(cfg.max_files, 500);
    }
}
