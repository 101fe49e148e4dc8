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


//! Container decoders
//!
//! One streaming decoder per container family, all exposing `io::Read`
//! over the decrypted audio: KGG (QMC2, key resolved through a
//! [`KeyProvider`]), the KGM family (`.kgm`/`.kgma`/`.vpr`) and NCM.
//! [`decrypt_file_to_temp`] picks the decoder by extension and drains it
//! into a temp file, which is the crate's `decrypt_only` entry point.

pub mod kgg;
pub mod kgm;
pub mod ncm;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use log::debug;
use tempfile::{NamedTempFile, TempPath};

use crate::error::{Result, TuneFreeError};
use crate::keystore::KeyProvider;

pub use kgg::KggDecoder;
pub use kgm::KgmDecoder;
pub use ncm::NcmDecoder;

/// Extensions the pipeline accepts.
pub const SUPPORTED_INPUT_EXTS: [&str; 5] = ["kgg", "kgm", "kgma", "vpr", "ncm"];

const COPY_CHUNK: usize = 64 * 1024;

/// Lower-cased extension of a path, without the dot.
pub fn input_ext(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Whether the file name carries a supported input extension.
pub fn is_supported_input(path: &Path) -> bool {
    SUPPORTED_INPUT_EXTS.contains(&input_ext(path).as_str())
}

/// Decrypt a container file into a temp file, selecting the decoder by
/// extension. `.kgg` requires a key provider; passing `None` for one
/// fails with [`TuneFreeError::MissingKey`].
///
/// The returned [`TempPath`] deletes the plaintext when dropped.
pub fn decrypt_file_to_temp(path: &Path, kgg_provider: Option<&KeyProvider>) -> Result<TempPath> {
    let ext = input_ext(path);
    match ext.as_str() {
        "kgg" => {
            let provider = kgg_provider.ok_or(TuneFreeError::MissingKey)?;
            let decoder = KggDecoder::open(path, provider)?;
            drain_to_temp(decoder, &ext)
        }
        "kgm" | "kgma" | "vpr" => {
            let file = File::open(path)?;
            let decoder = KgmDecoder::new(file)?;
            drain_to_temp(decoder, &ext)
        }
        "ncm" => {
            let file = File::open(path)?;
            let decoder = NcmDecoder::new(file)?;
            drain_to_temp(decoder, &ext)
        }
        other => Err(TuneFreeError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn drain_to_temp(mut decoder: impl Read, ext: &str) -> Result<TempPath> {
    let tmp = NamedTempFile::new()?;
    let mut out = BufWriter::new(tmp.as_file().try_clone()?);

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total: u64 = 0;
    loop {
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    out.flush()?;

    debug!("decrypted .{ext} payload: {total} bytes");
    Ok(tmp.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_dispatch_rejects_unknown() {
        let err = decrypt_file_to_temp(Path::new("song.aac"), None).unwrap_err();
        assert!(matches!(err, TuneFreeError::UnsupportedFormat(_)));
    }

    #[test]
    fn kgg_without_provider_is_missing_key() {
        let err = decrypt_file_to_temp(Path::new("song.kgg"), None).unwrap_err();
        assert!(matches!(err, TuneFreeError::MissingKey));
    }

    #[test]
    fn supported_extension_check_is_case_insensitive() {
        assert!(is_supported_input(&PathBuf::from("a.KGG")));
        assert!(is_supported_input(&PathBuf::from("b.Kgma")));
        assert!(is_supported_input(&PathBuf::from("c.ncm")));
        assert!(!is_supported_input(&PathBuf::from("d.mp3")));
        assert!(!is_supported_input(&PathBuf::from("no_extension")));
    }
}
