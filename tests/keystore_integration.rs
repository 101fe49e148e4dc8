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

//! Key-store integration: an unencrypted KGMusicV3.db (page 1 already
//! carries the SQLite magic) must pass through the page decryptor
//! untouched and feed lookups end to end.

mod common;

use rusqlite::Connection;
use tempfile::tempdir;
use tunefree_core::decoder::decrypt_file_to_temp;
use tunefree_core::keystore::{decrypt_kg_database, read_share_file_items, KeyProvider};
use tunefree_core::TuneFreeError;

use common::*;

fn write_plain_store(path: &std::path::Path, rows: &[(&str, &str)]) {
    let conn = Connection::open(path).unwrap();
    // SQLite pages default to 4096 bytes, a multiple of the KG page, so
    // the store passes the size check without padding.
    conn.execute_batch(
        "CREATE TABLE ShareFileItems (
             Id INTEGER PRIMARY KEY,
             EncryptionKeyId TEXT,
             EncryptionKey TEXT,
             FileName TEXT
         );",
    )
    .unwrap();
    for (id, key) in rows {
        conn.execute(
            "INSERT INTO ShareFileItems (EncryptionKeyId, EncryptionKey, FileName) \
             VALUES (?1, ?2, 'f')",
            [id, key],
        )
        .unwrap();
    }
}

#[test]
fn unencrypted_store_passes_through_byte_identical() {
    init_logs();
    let dir = tempdir().unwrap();
    let db = dir.path().join("KGMusicV3.db");
    write_plain_store(&db, &[("hash-a", "ekey-a"), ("hash-b", "ekey-b")]);

    let original = std::fs::read(&db).unwrap();
    assert_eq!(original.len() % 1024, 0, "fixture store must be page aligned");

    let plain = decrypt_kg_database(&db).unwrap();
    assert_eq!(std::fs::read(&plain).unwrap(), original);

    let map = read_share_file_items(&plain).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("hash-a").unwrap(), "ekey-a");
}

#[test]
fn database_provider_resolves_kgg_end_to_end() {
    let dir = tempdir().unwrap();
    let inner = map_inner_key();
    let audio = flac_payload(8192);

    let db = dir.path().join("KGMusicV3.db");
    write_plain_store(&db, &[("song-hash", &make_ekey(&inner))]);

    let kgg = write_kgg(dir.path(), "song.kgg", &audio, &inner, "song-hash");

    let provider = KeyProvider::database(db);
    let plain = decrypt_file_to_temp(&kgg, Some(&provider)).unwrap();
    assert_eq!(std::fs::read(&plain).unwrap(), audio);
}

#[test]
fn discovery_finds_store_next_to_input() {
    let dir = tempdir().unwrap();
    let inner = rc4_inner_key();
    let audio = mp3_payload(16_384);

    let db = dir.path().join("KGMusicV3.db");
    write_plain_store(&db, &[("disc-hash", &make_ekey(&inner))]);
    let kgg = write_kgg(dir.path(), "track.kgg", &audio, &inner, "disc-hash");

    let provider = KeyProvider::discover(dir.path()).expect("store should be discovered");
    let plain = decrypt_file_to_temp(&kgg, Some(&provider)).unwrap();
    assert_eq!(std::fs::read(&plain).unwrap(), audio);
}

#[test]
fn truncated_store_is_corrupt() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("KGMusicV3.db");
    std::fs::write(&db, vec![0x5Au8; 1500]).unwrap();

    let err = decrypt_kg_database(&db).unwrap_err();
    assert!(matches!(err, TuneFreeError::CorruptKeyStore(_)));
}
