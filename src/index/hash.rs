//! Sampled content digest stored alongside index entries.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes sampled from each end of a file.
const SAMPLE: u64 = 1 << 20;

/// SHA-256 over the file length, the first MiB and the last MiB.
///
/// Files no larger than two samples are digested whole. Returns lowercase hex.
pub fn sampled_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());

    if len <= SAMPLE * 2 {
        io::copy(&mut file, &mut HashWriter(&mut hasher))?;
    } else {
        let mut buf = vec![0u8; SAMPLE as usize];
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
        file.seek(SeekFrom::Start(len - SAMPLE))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

struct HashWriter<'a>(&'a mut Sha256);

impl io::Write for HashWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.update(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
