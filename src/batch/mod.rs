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


//! Batch conversion pipeline
//!
//! `runner` drives a fixed worker pool over the item queue and owns the
//! progress/result bookkeeping; `convert` is the per-item facade
//! (decrypt, sniff, copy-or-transcode) the runner executes; `events`
//! holds the data model shared with the API layer and `cancel` the
//! ambient cancellation token.

pub mod cancel;
pub mod convert;
pub mod events;
pub mod runner;

pub use cancel::CancelToken;
pub use convert::{convert_item, ConvertContext};
pub use events::{
    compute_percent, BatchItem, BatchSummary, FileDoneEvent, FileStatus, ProgressEvent,
};
pub use runner::{run_batch, run_batch_with, BatchOptions, ConvertFn, PhaseProgressFn};
