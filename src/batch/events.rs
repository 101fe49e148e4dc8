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


//! Batch data model
//!
//! Items, progress/completion events and the final summary. All field
//! names serialize in lowerCamelCase because these structs pass straight
//! through the HTTP layer to the GUI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::{Mp3Quality, OutputFormat};
use crate::error::FileError;

/// One file queued for conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// Path the pipeline reads from (possibly an upload temp file)
    pub path: PathBuf,

    /// Path or name the user submitted, echoed back in events
    pub origin_path: String,

    /// Display name, also the basis for the output file name
    pub name: String,

    /// Size in bytes, as validated by the caller
    pub size: u64,

    /// Whether `path` is a temp file the pipeline should delete after
    /// processing
    pub temporary: bool,

    /// 1-based stable position; doubles as the result-slot index
    pub current: usize,
}

/// Conversion phase currently running for a file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: String,
    pub file: String,
    pub current: usize,
    pub total: usize,
    pub percent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
}

/// Terminal event for one file; also the result-slot record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDoneEvent {
    pub file: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub input: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<FileError>,
    pub current: usize,
    pub total: usize,
    pub percent: i64,
}

/// Whole-batch outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub output_dir: String,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub output_format: OutputFormat,
    pub mp3_quality: Mp3Quality,
    pub results: Vec<FileDoneEvent>,
}

/// Overall batch percentage from completed files plus the in-flight
/// file's own progress.
pub fn compute_percent(done_files: usize, file_percent: i64, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    let file_percent = file_percent.clamp(0, 100);
    ((done_files as i64 * 100) + file_percent) * 100 / (total as i64 * 100)
}
