use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use rkyv::AlignedVec;
use xz::read::XzDecoder;
use xz::write::XzEncoder;

use crate::errors::Result;

const XZ_LEVEL: u32 = 6;

/// Lowercase cache-key fragment with runs of anything but letters and digits
/// collapsed to `_`. Letters of any script are kept.
pub fn slug(text: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"));
    re.replace_all(&text.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Writes `bytes` xz-compressed, creating parent directories as needed.
pub fn write_compressed(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = XzEncoder::new(BufWriter::new(File::create(path)?), XZ_LEVEL);
    encoder.write_all(bytes)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Reads an xz-compressed entry into a buffer aligned for archive access.
pub fn read_compressed(path: &Path) -> Result<AlignedVec> {
    let mut decoder = XzDecoder::new(BufReader::new(File::open(path)?));
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;

    let mut aligned = AlignedVec::with_capacity(buf.len());
    aligned.extend_from_slice(&buf);
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slug("Salzburg, Austria"), "salzburg_austria");
        assert_eq!(slug("  Zürich / CH "), "zürich_ch");
    }

    #[test]
    fn slug_keeps_non_latin_place_names_apart() {
        assert_eq!(slug("Москва"), "москва");
        assert_eq!(slug("東京都"), "東京都");
        assert_ne!(slug("Москва"), slug("東京都"));
    }

    #[test]
    fn compressed_entries_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entry.xz");
        write_compressed(&path, b"street network").unwrap();
        assert_eq!(read_compressed(&path).unwrap().as_slice(), b"street network");
    }
}
