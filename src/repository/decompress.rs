// src/repository/decompress.rs

//! Inflating compressed package lists

use super::{finish_partial, partial_path};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::debug;

/// Inflate the gzip file `src` into `dest`
///
/// `dest` is replaced only after the whole stream inflated cleanly.
pub fn gunzip(src: &Path, dest: &Path) -> Result<u64> {
    let input = File::open(src)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", src.display(), e)))?;
    let mut decoder = GzDecoder::new(BufReader::new(input));

    let temp_path = partial_path(dest);
    let mut output = File::create(&temp_path).map_err(|e| {
        Error::IoError(format!("Failed to create file {}: {}", temp_path.display(), e))
    })?;

    let written = match io::copy(&mut decoder, &mut output) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::ParseError(format!(
                "Failed to inflate {}: {}",
                src.display(),
                e
            )));
        }
    };

    finish_partial(&temp_path, dest)?;
    debug!("Inflated {} into {} ({} bytes)", src.display(), dest.display(), written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_gunzip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Packages.gz");
        let mut encoder = GzEncoder::new(File::create(&src).unwrap(), Compression::default());
        encoder.write_all(b"Package: foo\nVersion: 1.0\n").unwrap();
        encoder.finish().unwrap();

        let dest = dir.path().join("base");
        assert_eq!(gunzip(&src, &dest).unwrap(), 26);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "Package: foo\nVersion: 1.0\n");
    }

    #[test]
    fn test_corrupt_input_keeps_old_list() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Packages.gz");
        fs::write(&src, b"definitely not gzip").unwrap();

        let dest = dir.path().join("base");
        fs::write(&dest, b"old list").unwrap();

        assert!(gunzip(&src, &dest).is_err());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old list");
        assert!(!partial_path(&dest).exists());
    }
}
