use std::fs::File;
use std::io::{Read, BufReader};
use std::path::Path;
use sha2::{Sha256, Digest};
use memmap2::MmapOptions;
use crate::error::{Error, Result};

const MMAP_THRESHOLD: u64 = 500 * 1024 * 1024; // 500 MB

/// SHA-256 of the file bytes, hex encoded.
///
/// Only used to notice that content changed between two extractions of the
/// same path; the path stays the identity of a file.
pub fn calculate_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::read(path, e))?;
    let len = file.metadata().map_err(|e| Error::read(path, e))?.len();

    let mut hasher = Sha256::new();

    if len > MMAP_THRESHOLD {
        // The mapping is only read while the file handle is alive. A concurrent
        // truncation would fault, which we accept for archive inputs.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::read(path, e))?;
        hasher.update(&mmap);
    } else {
        let mut reader = BufReader::new(file);
        let mut buffer = [0; 8192];
        loop {
            let count = reader.read(&mut buffer).map_err(|e| Error::read(path, e))?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
