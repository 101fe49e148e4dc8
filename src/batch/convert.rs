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


//! Per-item conversion facade
//!
//! One item's end-to-end path: decrypt to a temp file, sniff the result,
//! then copy or transcode into a collision-free output path, emitting the
//! fixed phase milestones (`prepare` 5, `decrypt` 60, `transcode` 80 and
//! 100) along the way. Decryption runs on the blocking pool, which also
//! catches decoder panics and reports them as a per-item error instead of
//! unwinding the batch.
//!
//! Temp files (the decrypted plaintext, and the input itself when the
//! item is marked temporary) are removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::{sniff, Mp3Quality, OutputFormat, Transcoder};
use crate::batch::cancel::CancelToken;
use crate::batch::events::BatchItem;
use crate::decoder;
use crate::error::{Result, TuneFreeError};
use crate::keystore::KeyProvider;

use super::runner::PhaseProgressFn;

/// Shared dependencies of the per-item facade
pub struct ConvertContext {
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub mp3_quality: Mp3Quality,
    pub transcoder: Transcoder,
    /// Memory key map for `.kgg` items; `None` fails those items
    pub kgg_provider: Option<Arc<KeyProvider>>,
    pub cancel: CancelToken,
}

/// Deletes a temporary input file when the conversion attempt ends.
struct TempInputGuard<'a> {
    item: &'a BatchItem,
}

impl Drop for TempInputGuard<'_> {
    fn drop(&mut self) {
        if self.item.temporary {
            if let Err(err) = std::fs::remove_file(&self.item.path) {
                warn!("failed to remove temp input {:?}: {err}", self.item.path);
            }
        }
    }
}

/// Convert one item, returning the path of the produced output file.
pub async fn convert_item(
    ctx: &ConvertContext,
    item: &BatchItem,
    progress: &PhaseProgressFn,
) -> Result<PathBuf> {
    let _guard = TempInputGuard { item };

    progress("prepare", 5);
    if ctx.cancel.is_cancelled() {
        return Err(TuneFreeError::Cancelled);
    }

    // Decrypt on the blocking pool; a JoinError here means the decoder
    // panicked, which must stay contained to this item.
    let input = item.path.clone();
    let provider = ctx.kgg_provider.clone();
    let plain = tokio::task::spawn_blocking(move || {
        decoder::decrypt_file_to_temp(&input, provider.as_deref())
    })
    .await
    .map_err(|join_err| {
        warn!("decoder crashed for {:?}: {join_err}", item.path);
        TuneFreeError::decrypt(format!("decoder crashed: {join_err}"))
    })??;

    progress("decrypt", 60);
    if ctx.cancel.is_cancelled() {
        return Err(TuneFreeError::Cancelled);
    }

    let kind = sniff::sniff_path(&plain).await?;
    debug!("{} decrypts to {}", item.name, kind.extension());

    let base = file_stem(&item.name);
    let target_ext = match ctx.output_format.extension() {
        Some(ext) => ext,
        None => kind.extension(),
    };
    let output = unique_output_path(ctx.output_dir.join(format!("{base}.{target_ext}")))?;

    progress("transcode", 80);

    let copy_through =
        ctx.output_format == OutputFormat::Copy || kind.extension() == target_ext;
    if copy_through {
        tokio::fs::copy(&plain, &output)
            .await
            .map_err(|e| TuneFreeError::transcode(format!("failed to write output: {e}")))?;
    } else {
        ctx.transcoder
            .transcode(&plain, &output, ctx.output_format, ctx.mp3_quality, &ctx.cancel)
            .await?;
    }

    progress("transcode", 100);
    info!("{} -> {:?}", item.name, output);
    Ok(output)
}

/// Name without its final extension.
fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Resolve an output-name collision by appending `_1`, `_2`, ...
fn unique_output_path(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path);
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = path.with_extension("");
    let base = base.to_string_lossy();

    for i in 1..10_000 {
        let candidate = PathBuf::from(format!("{base}_{i}.{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(TuneFreeError::transcode(
        "too many output name collisions to pick a unique file name",
    ))
}
