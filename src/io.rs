use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

fn is_gz(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Open a text input as `BufRead`, decompressing `.gz` files on the fly.
pub fn open_bufread(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path).map_err(|e| Error::io(e, path))?;
    if is_gz(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Create an output file, creating missing parent directories.
pub fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
        }
    }
    let f = File::create(path).map_err(|e| Error::io(e, path))?;
    Ok(BufWriter::new(f))
}
