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


//! ShareFileItems extraction
//!
//! Reads the `(EncryptionKeyId, EncryptionKey)` pairs out of a decrypted
//! key-store image. The table carries more columns, but only these two
//! matter here and rows with an empty id or key are dropped at the query.

use std::path::Path;

use log::debug;
use rusqlite::{Connection, OpenFlags};

use super::KeyMap;
use crate::error::Result;

/// Load the audio-hash -> ekey map from a decrypted SQLite file.
pub fn read_share_file_items(sqlite_path: &Path) -> Result<KeyMap> {
    let conn = Connection::open_with_flags(
        sqlite_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare(
        "SELECT EncryptionKeyId, EncryptionKey FROM ShareFileItems \
         WHERE EncryptionKeyId IS NOT NULL AND EncryptionKeyId != '' \
           AND EncryptionKey IS NOT NULL AND EncryptionKey != ''",
    )?;

    let mut map = KeyMap::new();
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let key: String = row.get(1)?;
        Ok((id, key))
    })?;
    for row in rows {
        let (id, key) = row?;
        map.insert(id, key);
    }

    debug!("loaded {} key rows from {:?}", map.len(), sqlite_path);
    Ok(map)
}
