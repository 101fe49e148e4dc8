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


//! Error types for TuneFree
//!
//! Errors are defined with `thiserror` and categorized by pipeline stage
//! (input dispatch, key resolution, decryption, sniffing, transcoding,
//! control flow). A second layer maps every error onto the small set of
//! stable string codes the caller-facing API exposes, together with a
//! user-presentable message, a suggestion and a severity. That shape is
//! [`FileError`], the JSON object embedded in batch events.
//!
//! Every error is local to the file that produced it: the batch
//! orchestrator records it in the per-file result slot and moves on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our TuneFreeError type
pub type Result<T> = std::result::Result<T, TuneFreeError>;

/// Main error type for the conversion pipeline
#[derive(Error, Debug)]
pub enum TuneFreeError {
    // ===== Input dispatch =====

    /// Extension is not one of the supported encrypted containers
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// KGG header carries an audio cipher mode other than 5
    #[error("unsupported KGG mode: {0}")]
    UnsupportedMode(u32),

    /// KGG decoding was attempted on a source without random access
    #[error("KGG decoding requires random access to the input")]
    RandomAccessRequired,

    // ===== Key store / key resolution =====

    /// The encrypted KGMusicV3.db is structurally invalid
    #[error("corrupt key store: {0}")]
    CorruptKeyStore(String),

    /// Every configured key provider was tried and none knew this hash
    #[error("no key found for audio hash {0}")]
    KeyNotFound(String),

    /// A .kgg item was submitted without any key map loaded
    #[error("KGG conversion requires a loaded key map")]
    MissingKey,

    /// The per-song ekey failed base64/length/padding invariants
    #[error("malformed ekey: {0}")]
    MalformedEKey(String),

    // ===== Decrypt / sniff / transcode =====

    /// Any other failure inside a container decoder
    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    /// The decrypted stream did not start with a known audio magic
    #[error("unrecognized audio header")]
    UnknownAudio,

    /// The external transcoder exited non-zero or produced no output
    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    // ===== Control =====

    /// Cancelled via the stop probe or the ambient cancel token
    #[error("operation cancelled")]
    Cancelled,

    // ===== External =====

    /// SQLite error while reading the decrypted key store
    #[error("key store query failed: {0}")]
    Database(#[from] rusqlite::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Stable error codes exposed to API consumers. These strings are a wire
// contract; renaming one breaks the GUI.
pub const ERR_DB_NOT_FOUND: &str = "ERR_DB_NOT_FOUND";
pub const ERR_DECRYPT_FAILED: &str = "ERR_DECRYPT_FAILED";
pub const ERR_DECRYPT_KEY_EXPIRED: &str = "ERR_DECRYPT_KEY_EXPIRED";
pub const ERR_TRANSCODE_FAILED: &str = "ERR_TRANSCODE_FAILED";
pub const ERR_UNSUPPORTED_FORMAT: &str = "ERR_UNSUPPORTED_FORMAT";
pub const ERR_CANCELLED: &str = "ERR_CANCELLED";
pub const ERR_UNKNOWN: &str = "ERR_UNKNOWN";

impl TuneFreeError {
    /// Create a DecryptFailed error with a message
    pub fn decrypt<S: Into<String>>(message: S) -> Self {
        TuneFreeError::DecryptFailed(message.into())
    }

    /// Create a TranscodeFailed error with a message
    pub fn transcode<S: Into<String>>(message: S) -> Self {
        TuneFreeError::TranscodeFailed(message.into())
    }

    /// Create a MalformedEKey error with a message
    pub fn ekey<S: Into<String>>(message: S) -> Self {
        TuneFreeError::MalformedEKey(message.into())
    }

    /// Stable API code for this error
    pub fn code(&self) -> &'static str {
        match self {
            TuneFreeError::UnsupportedFormat(_) | TuneFreeError::UnsupportedMode(_) => {
                ERR_UNSUPPORTED_FORMAT
            }
            TuneFreeError::CorruptKeyStore(_) | TuneFreeError::Database(_) => ERR_DB_NOT_FOUND,
            TuneFreeError::KeyNotFound(_) | TuneFreeError::MissingKey => ERR_DECRYPT_KEY_EXPIRED,
            TuneFreeError::RandomAccessRequired
            | TuneFreeError::MalformedEKey(_)
            | TuneFreeError::DecryptFailed(_)
            | TuneFreeError::UnknownAudio
            | TuneFreeError::Io(_) => ERR_DECRYPT_FAILED,
            TuneFreeError::TranscodeFailed(_) => ERR_TRANSCODE_FAILED,
            TuneFreeError::Cancelled => ERR_CANCELLED,
        }
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TuneFreeError::Cancelled)
    }

    /// Check if error is related to key resolution (key store or per-song keys)
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            TuneFreeError::CorruptKeyStore(_)
                | TuneFreeError::KeyNotFound(_)
                | TuneFreeError::MissingKey
                | TuneFreeError::MalformedEKey(_)
                | TuneFreeError::Database(_)
        )
    }
}

impl From<std::string::FromUtf8Error> for TuneFreeError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        TuneFreeError::DecryptFailed(format!("UTF-8 conversion error: {}", err))
    }
}

/// Presentation metadata for a stable code
struct ErrorMeta {
    user_message: &'static str,
    suggestion: &'static str,
    severity: &'static str,
}

fn meta_for(code: &str) -> ErrorMeta {
    match code {
        ERR_DB_NOT_FOUND => ErrorMeta {
            user_message: "The KGMusicV3.db key store was not found or could not be read.",
            suggestion: "Only KGG files need the key store; configure KGMusicV3.db first.",
            severity: "fatal",
        },
        ERR_DECRYPT_FAILED => ErrorMeta {
            user_message: "Decryption did not produce a usable audio file.",
            suggestion: "Check that the input file is complete, then try again.",
            severity: "error",
        },
        ERR_DECRYPT_KEY_EXPIRED => ErrorMeta {
            user_message: "Decryption failed; the song key may have expired.",
            suggestion: "Play the song once in the KuGou client, then retry.",
            severity: "error",
        },
        ERR_TRANSCODE_FAILED => ErrorMeta {
            user_message: "Audio transcoding failed.",
            suggestion: "Check that ffmpeg is available, or try a different input file.",
            severity: "error",
        },
        ERR_UNSUPPORTED_FORMAT => ErrorMeta {
            user_message: "Unsupported input file format.",
            suggestion: "Only .kgg, .kgm, .kgma, .vpr and .ncm files are supported.",
            severity: "warning",
        },
        ERR_CANCELLED => ErrorMeta {
            user_message: "Conversion cancelled.",
            suggestion: "Start the batch again to retry.",
            severity: "warning",
        },
        _ => ErrorMeta {
            user_message: "An unknown error occurred.",
            suggestion: "Check the logs, then try again.",
            severity: "error",
        },
    }
}

/// Per-file error payload embedded in batch events and summaries
///
/// Field names are the JSON wire contract consumed by the GUI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub code: String,
    pub user_message: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub suggestion: String,
    pub severity: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub detail: String,
}

impl FileError {
    /// Build the payload for a known code with an optional detail string
    pub fn with_code(code: &str, detail: impl Into<String>) -> Self {
        let meta = meta_for(code);
        let known = matches!(
            code,
            ERR_DB_NOT_FOUND
                | ERR_DECRYPT_FAILED
                | ERR_DECRYPT_KEY_EXPIRED
                | ERR_TRANSCODE_FAILED
                | ERR_UNSUPPORTED_FORMAT
                | ERR_CANCELLED
        );
        FileError {
            code: if known { code } else { ERR_UNKNOWN }.to_string(),
            user_message: meta.user_message.to_string(),
            suggestion: meta.suggestion.to_string(),
            severity: meta.severity.to_string(),
            detail: detail.into(),
        }
    }

    /// Synthesized entry for batch slots never dispatched before cancellation
    pub fn cancelled() -> Self {
        FileError::with_code(ERR_CANCELLED, "")
    }
}

impl From<&TuneFreeError> for FileError {
    fn from(err: &TuneFreeError) -> Self {
        FileError::with_code(err.code(), err.to_string())
    }
}
