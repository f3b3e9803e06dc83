use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};

const SAMPLE_BYTES: u64 = 64 * 1024;

/// Tamper/shortcut fingerprint over a PKG file.
///
/// Blake2b-128 over `"{size}:{mtime_ns}"`, the first 64 KiB, and (for files
/// larger than 64 KiB) the last 64 KiB. Not the primary change detector; used
/// to tell duplicates from genuine conflicts at canonical placement.
pub fn fingerprint_pkg(path: &Path, size: u64, mtime_ns: i64) -> Result<String> {
    let mut digest = Blake2b::<U16>::new();
    digest.update(format!("{size}:{mtime_ns}").as_bytes());

    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut head = Vec::with_capacity(SAMPLE_BYTES as usize);
    (&mut file)
        .take(SAMPLE_BYTES)
        .read_to_end(&mut head)
        .with_context(|| format!("failed to read {}", path.display()))?;
    digest.update(&head);

    if size > SAMPLE_BYTES {
        let tail_size = size.min(SAMPLE_BYTES);
        file.seek(SeekFrom::Start(size - tail_size))?;
        let mut tail = Vec::with_capacity(tail_size as usize);
        (&mut file)
            .take(tail_size)
            .read_to_end(&mut tail)
            .with_context(|| format!("failed to read tail of {}", path.display()))?;
        digest.update(&tail);
    }

    Ok(hex::encode(digest.finalize()))
}
