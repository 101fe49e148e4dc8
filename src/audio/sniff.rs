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


//! Audio format sniffing
//!
//! Classifies a decrypted stream by its first bytes. Twelve bytes are
//! enough for every signature the pipeline cares about; anything else is
//! an error, since a failed decrypt usually shows up here as garbage.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{Result, TuneFreeError};

const SNIFF_LEN: usize = 12;

/// Audio container kinds the sniffer can identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioKind {
    Flac,
    Mp3,
    Wav,
    Ogg,
}

impl AudioKind {
    /// File extension for this kind, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            AudioKind::Flac => "flac",
            AudioKind::Mp3 => "mp3",
            AudioKind::Wav => "wav",
            AudioKind::Ogg => "ogg",
        }
    }
}

/// Classify a prefix of up to 12 bytes.
pub fn classify(head: &[u8]) -> Result<AudioKind> {
    if head.starts_with(b"fLaC") {
        return Ok(AudioKind::Flac);
    }
    if head.starts_with(b"ID3") {
        return Ok(AudioKind::Mp3);
    }
    // Raw MPEG frame sync: 11 set bits.
    if head.len() >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0 {
        return Ok(AudioKind::Mp3);
    }
    if head.starts_with(b"RIFF") {
        return Ok(AudioKind::Wav);
    }
    if head.starts_with(b"OggS") {
        return Ok(AudioKind::Ogg);
    }
    Err(TuneFreeError::UnknownAudio)
}

/// Sniff a file on disk by its first bytes.
pub async fn sniff_path(path: &Path) -> Result<AudioKind> {
    let mut file = File::open(path).await?;
    let mut head = [0u8; SNIFF_LEN];
    let mut filled = 0usize;
    while filled < SNIFF_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    classify(&head[..filled])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn classifies_known_magics() {
        assert_eq!(classify(b"fLaC\x00\x00\x00\x22....").unwrap(), AudioKind::Flac);
        assert_eq!(classify(b"ID3\x04\x00........").unwrap(), AudioKind::Mp3);
        assert_eq!(classify(&[0xFF, 0xFB, 0x90, 0x00]).unwrap(), AudioKind::Mp3);
        assert_eq!(classify(b"RIFF\x24\x08\x00\x00WAVE").unwrap(), AudioKind::Wav);
        assert_eq!(classify(b"OggS\x00\x02........").unwrap(), AudioKind::Ogg);
    }

    #[test]
    fn frame_sync_needs_high_bits() {
        // 0xFF followed by something without the 0xE0 bits is not MPEG.
        assert!(classify(&[0xFF, 0x1F, 0x00, 0x00]).is_err());
    }

    #[test]
    fn unknown_prefix_is_an_error() {
        let err = classify(b"MThd\x00\x00\x00\x06").unwrap_err();
        assert!(matches!(err, TuneFreeError::UnknownAudio));
        assert!(classify(&[]).is_err());
    }

    #[tokio::test]
    async fn sniffs_short_file() {
        // A file shorter than 12 bytes still classifies on what's there.
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"fLaC").unwrap();
        f.flush().unwrap();
        assert_eq!(sniff_path(f.path()).await.unwrap(), AudioKind::Flac);
    }
}
