//! Zip packaging for batch outputs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// A file on disk and the name it takes inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: String,
}

/// Write a deflate-compressed zip at `destination` holding every entry.
pub fn write_zip(entries: &[ArchiveEntry], destination: &Path) -> Result<(), ArchiveError> {
    let file = File::create(destination)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?.flush()?;
    tracing::debug!(
        entries = entries.len(),
        path = %destination.display(),
        "Archive written"
    );
    Ok(())
}
