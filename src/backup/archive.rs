use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Packs the named staging files into a gzip-compressed tar archive.
/// Member names are flat (no directories).
pub fn pack(staging: &Path, entries: &[&str], destination: &Path) -> Result<()> {
    let file = File::create(destination)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        builder.append_path_with_name(staging.join(entry), entry)?;
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()?;
    Ok(())
}

/// Unpacks a backup archive into `destination`. A file that is not a
/// readable gzip tar stream surfaces as `ArchiveMalformed`.
pub fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| Error::Validation(format!("cannot open {}: {e}", archive.display())))?;

    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(destination)
        .map_err(|e| Error::ArchiveMalformed(format!("not a readable backup archive: {e}")))?;
    Ok(())
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
