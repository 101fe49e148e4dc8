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


//! Key providers
//!
//! A provider resolves an audio hash to an ekey string. Sources:
//!
//! - **Memory** — a prebuilt map handed in by the caller.
//! - **KeyFile** — a `kgg.key` text file of `<id>$<ekey>` records
//!   separated by `\n`; `\r` is ignored and an unterminated last record
//!   is accepted.
//! - **Database** — a `KGMusicV3.db`, decrypted and ingested on first
//!   lookup; the plaintext image lives only for the duration of the read.
//! - **Chain** — an ordered list tried front to back, first hit wins.
//!
//! File-backed caches populate once (`OnceLock`); a failed load is not
//! cached, so the next lookup retries.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, warn};

use super::{pagedb, sharefile, KeyMap};
use crate::error::{Result, TuneFreeError};

/// A source of ekeys, looked up by audio hash.
pub enum KeyProvider {
    /// Prebuilt in-memory map
    Memory(KeyMap),
    /// Lazily parsed `kgg.key` text file
    KeyFile {
        path: PathBuf,
        cache: OnceLock<KeyMap>,
    },
    /// Lazily decrypted and ingested KGMusicV3.db
    Database {
        path: PathBuf,
        cache: OnceLock<KeyMap>,
    },
    /// Ordered fallback chain
    Chain(Vec<KeyProvider>),
}

impl KeyProvider {
    /// Provider over a prebuilt map.
    pub fn memory(map: KeyMap) -> Self {
        KeyProvider::Memory(map)
    }

    /// Provider over a `kgg.key` text file.
    pub fn key_file(path: impl Into<PathBuf>) -> Self {
        KeyProvider::KeyFile {
            path: path.into(),
            cache: OnceLock::new(),
        }
    }

    /// Provider over an encrypted key-store database.
    pub fn database(path: impl Into<PathBuf>) -> Self {
        KeyProvider::Database {
            path: path.into(),
            cache: OnceLock::new(),
        }
    }

    /// Chain of providers tried in order.
    pub fn chain(providers: Vec<KeyProvider>) -> Self {
        KeyProvider::Chain(providers)
    }

    /// Assemble a provider from key sources discovered next to the input:
    /// a `kgg.key` is preferred, then a `KGMusicV3.db`, searched in `dir`
    /// and its `tools/` subdirectory. Returns `None` when neither exists.
    pub fn discover(dir: &Path) -> Option<Self> {
        let mut providers = Vec::new();
        for base in [dir.to_path_buf(), dir.join("tools")] {
            let key_file = base.join("kgg.key");
            if key_file.is_file() {
                debug!("discovered key file {:?}", key_file);
                providers.push(KeyProvider::key_file(key_file));
                break;
            }
        }
        for base in [dir.to_path_buf(), dir.join("tools")] {
            let db = base.join("KGMusicV3.db");
            if db.is_file() {
                debug!("discovered key store {:?}", db);
                providers.push(KeyProvider::database(db));
                break;
            }
        }
        match providers.len() {
            0 => None,
            1 => providers.pop(),
            _ => Some(KeyProvider::chain(providers)),
        }
    }

    /// Resolve an audio hash to an ekey string.
    pub fn lookup(&self, audio_hash: &str) -> Result<String> {
        match self {
            KeyProvider::Memory(map) => map
                .get(audio_hash)
                .cloned()
                .ok_or_else(|| TuneFreeError::KeyNotFound(audio_hash.to_string())),
            KeyProvider::KeyFile { path, cache } => {
                let map = cached(cache, || parse_key_file(path))?;
                map.get(audio_hash)
                    .cloned()
                    .ok_or_else(|| TuneFreeError::KeyNotFound(audio_hash.to_string()))
            }
            KeyProvider::Database { path, cache } => {
                let map = cached(cache, || ingest_database(path))?;
                map.get(audio_hash)
                    .cloned()
                    .ok_or_else(|| TuneFreeError::KeyNotFound(audio_hash.to_string()))
            }
            KeyProvider::Chain(providers) => {
                for provider in providers {
                    match provider.lookup(audio_hash) {
                        Ok(key) => return Ok(key),
                        Err(err) => {
                            if !matches!(err, TuneFreeError::KeyNotFound(_)) {
                                warn!("key provider failed, trying next: {err}");
                            }
                        }
                    }
                }
                Err(TuneFreeError::KeyNotFound(audio_hash.to_string()))
            }
        }
    }
}

/// One-time cache fill. Losing a benign race just discards one extra load;
/// errors are returned without populating so the caller can retry later.
fn cached<'a>(
    cache: &'a OnceLock<KeyMap>,
    load: impl FnOnce() -> Result<KeyMap>,
) -> Result<&'a KeyMap> {
    if let Some(map) = cache.get() {
        return Ok(map);
    }
    let map = load()?;
    Ok(cache.get_or_init(|| map))
}

/// Parse `<id>$<ekey>` records. Runs as a byte state machine rather than
/// a line splitter so that `\r` can be dropped anywhere and the final
/// unterminated record still lands.
fn parse_key_file(path: &Path) -> Result<KeyMap> {
    let data = std::fs::read(path)?;
    let mut map = KeyMap::new();

    let mut id = String::new();
    let mut ekey = String::new();
    let mut in_id = true;
    for &b in &data {
        match b {
            b'$' => in_id = false,
            b'\n' => {
                if !id.is_empty() || !ekey.is_empty() {
                    map.insert(std::mem::take(&mut id), std::mem::take(&mut ekey));
                }
                in_id = true;
            }
            b'\r' => {}
            _ => {
                let target = if in_id { &mut id } else { &mut ekey };
                target.push(b as char);
            }
        }
    }
    if !id.is_empty() || !ekey.is_empty() {
        map.insert(id, ekey);
    }

    debug!("parsed {} key records from {:?}", map.len(), path);
    Ok(map)
}

/// Decrypt the store to a temp image, read the map, drop the image.
fn ingest_database(path: &Path) -> Result<KeyMap> {
    let plain = pagedb::decrypt_kg_database(path)?;
    let map = sharefile::read_share_file_items(&plain)?;
    Ok(map)
}
