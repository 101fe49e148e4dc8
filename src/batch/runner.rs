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


//! Batch orchestrator
//!
//! Runs a fixed pool of workers over a queue pre-loaded with every item.
//! Workers probe the stop callback and the ambient cancel token before
//! each dequeue; skipped items emit no file-done event and are filled in
//! by a sweep once the queue drains. Results land in per-ordinal slots,
//! so `results[]` is deterministic even though completion order is not.
//! Shared mutable state is three counters and the cancelled flag; event
//! callbacks are invoked as-is, unserialized.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::audio::{Mp3Quality, OutputFormat, Transcoder};
use crate::error::{FileError, Result, TuneFreeError, ERR_CANCELLED};
use crate::keystore::{KeyMap, KeyProvider};

use super::cancel::CancelToken;
use super::convert::{convert_item, ConvertContext};
use super::events::{
    compute_percent, BatchItem, BatchSummary, FileDoneEvent, FileStatus, ProgressEvent,
};

/// Hard ceiling on the worker pool.
pub const MAX_WORKERS: usize = 6;

/// Per-item progress callback handed to the convert operation:
/// `(phase, file_percent)`.
pub type PhaseProgressFn = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// The per-item convert operation.
pub type ConvertFn = Arc<
    dyn Fn(
            BatchItem,
            PhaseProgressFn,
        ) -> Pin<Box<dyn Future<Output = Result<std::path::PathBuf>> + Send>>
        + Send
        + Sync,
>;

/// External stop probe, polled before each dequeue.
pub type ShouldStopFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Maps an item error to its API payload.
pub type ErrorMapperFn = Arc<dyn Fn(&TuneFreeError) -> FileError + Send + Sync>;

pub type ProgressEventFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
pub type FileDoneEventFn = Arc<dyn Fn(FileDoneEvent) + Send + Sync>;

/// Everything a batch run needs besides the convert operation itself
#[derive(Clone)]
pub struct BatchOptions {
    pub items: Vec<BatchItem>,
    pub concurrency: usize,
    pub output_dir: std::path::PathBuf,
    pub output_format: OutputFormat,
    pub mp3_quality: Mp3Quality,
    /// ffmpeg binary used by the real pipeline
    pub ffmpeg_bin: std::path::PathBuf,
    /// Memory key map for `.kgg` items
    pub kgg_keys: Option<KeyMap>,
    pub should_stop: Option<ShouldStopFn>,
    pub cancel: CancelToken,
    pub error_mapper: Option<ErrorMapperFn>,
    pub on_progress: Option<ProgressEventFn>,
    pub on_file_done: Option<FileDoneEventFn>,
}

impl BatchOptions {
    pub fn new(items: Vec<BatchItem>, output_dir: impl Into<std::path::PathBuf>) -> Self {
        BatchOptions {
            items,
            concurrency: 3,
            output_dir: output_dir.into(),
            output_format: OutputFormat::default(),
            mp3_quality: Mp3Quality::default(),
            ffmpeg_bin: std::path::PathBuf::from("ffmpeg"),
            kgg_keys: None,
            should_stop: None,
            cancel: CancelToken::new(),
            error_mapper: None,
            on_progress: None,
            on_file_done: None,
        }
    }
}

/// Run the real conversion pipeline over a batch.
pub async fn run_batch(opts: BatchOptions) -> BatchSummary {
    let ctx = Arc::new(ConvertContext {
        output_dir: opts.output_dir.clone(),
        output_format: opts.output_format,
        mp3_quality: opts.mp3_quality,
        transcoder: Transcoder::new(opts.ffmpeg_bin.clone()),
        kgg_provider: opts
            .kgg_keys
            .clone()
            .map(|keys| Arc::new(KeyProvider::memory(keys))),
        cancel: opts.cancel.clone(),
    });

    let convert: ConvertFn = Arc::new(move |item, progress| {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { convert_item(&ctx, &item, &progress).await })
    });

    run_batch_with(opts, convert).await
}

/// Run a batch with a caller-supplied convert operation.
pub async fn run_batch_with(opts: BatchOptions, convert: ConvertFn) -> BatchSummary {
    let started = Instant::now();
    let total = opts.items.len();
    if total == 0 {
        return BatchSummary {
            success: 0,
            failed: 0,
            total: 0,
            output_dir: opts.output_dir.to_string_lossy().into_owned(),
            duration_ms: 0,
            cancelled: false,
            output_format: opts.output_format,
            mp3_quality: opts.mp3_quality,
            results: Vec::new(),
        };
    }

    let workers = opts.concurrency.max(1).min(MAX_WORKERS).min(total);
    info!("batch start: {total} items, {workers} workers");

    let queue = Arc::new(Mutex::new(VecDeque::from(opts.items.clone())));
    let results: Arc<Mutex<Vec<Option<FileDoneEvent>>>> =
        Arc::new(Mutex::new(vec![None; total]));
    let completed = Arc::new(AtomicUsize::new(0));
    let success = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut pool = JoinSet::new();
    for worker_id in 0..workers {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let completed = Arc::clone(&completed);
        let success = Arc::clone(&success);
        let failed = Arc::clone(&failed);
        let cancelled = Arc::clone(&cancelled);
        let convert = Arc::clone(&convert);
        let should_stop = opts.should_stop.clone();
        let cancel = opts.cancel.clone();
        let error_mapper = opts.error_mapper.clone();
        let on_progress = opts.on_progress.clone();
        let on_file_done = opts.on_file_done.clone();

        pool.spawn(async move {
            loop {
                let item = { queue.lock().unwrap().pop_front() };
                let Some(item) = item else { break };

                let stop_requested = should_stop.as_ref().map(|f| f()).unwrap_or(false);
                if stop_requested || cancel.is_cancelled() {
                    // Skipped items emit nothing; the sweep records them.
                    cancelled.store(true, Ordering::SeqCst);
                    continue;
                }

                let progress: PhaseProgressFn = {
                    let on_progress = on_progress.clone();
                    let completed = Arc::clone(&completed);
                    let file = item.name.clone();
                    let current = item.current;
                    Arc::new(move |phase: &str, file_percent: i64| {
                        if let Some(cb) = &on_progress {
                            let done = completed.load(Ordering::SeqCst);
                            cb(ProgressEvent {
                                phase: phase.to_string(),
                                file: file.clone(),
                                current,
                                total,
                                percent: compute_percent(done, file_percent, total),
                            });
                        }
                    })
                };

                debug!("worker {worker_id}: item {} ({})", item.current, item.name);
                let outcome = convert(item.clone(), progress).await;
                let done_now = completed.fetch_add(1, Ordering::SeqCst) + 1;

                let mut event = FileDoneEvent {
                    file: item.name.clone(),
                    input: item.origin_path.clone(),
                    status: FileStatus::Ok,
                    output: None,
                    error: None,
                    current: item.current,
                    total,
                    percent: compute_percent(done_now, 0, total),
                };

                match outcome {
                    Ok(output) => {
                        success.fetch_add(1, Ordering::SeqCst);
                        event.output = Some(output.to_string_lossy().into_owned());
                    }
                    Err(err) => {
                        failed.fetch_add(1, Ordering::SeqCst);
                        event.status = FileStatus::Error;
                        let mapped = match &error_mapper {
                            Some(map) => map(&err),
                            None => FileError::from(&err),
                        };
                        if mapped.code == ERR_CANCELLED {
                            cancelled.store(true, Ordering::SeqCst);
                        }
                        warn!("item {} failed: {err}", item.name);
                        event.error = Some(mapped);
                    }
                }

                results.lock().unwrap()[item.current - 1] = Some(event.clone());
                if let Some(cb) = &on_file_done {
                    cb(event);
                }
            }
        });
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(err) = joined {
            // A worker task dying is a bug, but it must not take the
            // batch down with it; its undone items fall to the sweep.
            warn!("batch worker aborted: {err}");
        }
    }

    // Sweep: every slot never reached by a worker becomes a cancellation
    // entry, and temporary inputs that were never processed are removed.
    let mut results = {
        let mut guard = results.lock().unwrap();
        std::mem::take(&mut *guard)
    };
    let done_final = completed.load(Ordering::SeqCst);
    let mut swept = Vec::with_capacity(total);
    for (slot, item) in results.drain(..).zip(opts.items.iter()) {
        match slot {
            Some(event) => swept.push(event),
            None => {
                if item.temporary {
                    let _ = std::fs::remove_file(&item.path);
                }
                failed.fetch_add(1, Ordering::SeqCst);
                swept.push(FileDoneEvent {
                    file: item.name.clone(),
                    input: item.origin_path.clone(),
                    status: FileStatus::Error,
                    output: None,
                    error: Some(FileError::cancelled()),
                    current: item.current,
                    total,
                    percent: compute_percent(done_final, 0, total),
                });
            }
        }
    }

    let stop_requested = opts.should_stop.as_ref().map(|f| f()).unwrap_or(false);
    let summary = BatchSummary {
        success: success.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
        total,
        output_dir: opts.output_dir.to_string_lossy().into_owned(),
        duration_ms: started.elapsed().as_millis() as u64,
        cancelled: cancelled.load(Ordering::SeqCst) || stop_requested || opts.cancel.is_cancelled(),
        output_format: opts.output_format,
        mp3_quality: opts.mp3_quality,
        results: swept,
    };
    info!(
        "batch done: {}/{} ok, {} failed, cancelled={} in {}ms",
        summary.success, summary.total, summary.failed, summary.cancelled, summary.duration_ms
    );
    summary
}
