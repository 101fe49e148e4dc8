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


//! KuGou key store access
//!
//! The KuGou client keeps per-song ekeys in `KGMusicV3.db`, a SQLite file
//! encrypted page by page with AES-CBC. `pagedb` turns that file into a
//! readable SQLite image in a temp location, `sharefile` extracts the
//! `(EncryptionKeyId -> EncryptionKey)` map from it, and `provider`
//! resolves audio hashes to ekeys from memory, a `kgg.key` text file, a
//! database, or a chain of those.

pub mod pagedb;
pub mod provider;
pub mod sharefile;

pub use pagedb::decrypt_kg_database;
pub use provider::KeyProvider;
pub use sharefile::read_share_file_items;

use std::collections::HashMap;

/// Resolved `audio_hash -> ekey` map.
pub type KeyMap = HashMap<String, String>;
