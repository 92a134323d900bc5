use std::path::Path;
use crate::error::{Error, Result};

pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// Sniffs the file type from its magic bytes.
pub fn detect_mimetype(path: &Path) -> Result<String> {
    let kind = infer::get_from_path(path).map_err(|e| Error::read(path, e))?;

    match kind {
        Some(k) => Ok(k.mime_type().to_string()),
        None => Ok(UNKNOWN_MIME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mimetype_detection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let png = dir.path().join("pixel.png");
        fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0])?;
        assert_eq!(detect_mimetype(&png)?, "image/png");

        let empty = dir.path().join("empty.bin");
        fs::write(&empty, b"")?;
        assert_eq!(detect_mimetype(&empty)?, UNKNOWN_MIME);

        assert!(detect_mimetype(&dir.path().join("missing")).unwrap_err().is_read());
        Ok(())
    }
}
