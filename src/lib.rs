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


//! Decryption and transcoding engine for encrypted Chinese music containers.
//!
//! The crate turns `.kgg`, `.kgm`, `.kgma`, `.vpr` and `.ncm` files into
//! standard audio (MP3, FLAC, WAV, or a straight copy of the decrypted
//! stream) and runs that conversion over many files at once with bounded
//! concurrency, progress events and per-file error reporting.
//!
//! The HTTP layer that normally drives this engine lives elsewhere; the
//! crate only exposes the batch API ([`batch::run_batch`]), the single-file
//! decrypt API ([`decoder::decrypt_file_to_temp`]) and the event/summary
//! types those produce.

// Core modules
pub mod audio;
pub mod batch;
pub mod config;
pub mod crypto;
pub mod decoder;
pub mod error;
pub mod keystore;

// Re-export commonly used types for convenience
pub use audio::{AudioKind, Mp3Quality, OutputFormat};
pub use batch::{run_batch, BatchItem, BatchOptions, BatchSummary, CancelToken};
pub use config::PipelineConfig;
pub use error::{FileError, Result, TuneFreeError};
pub use keystore::KeyProvider;
