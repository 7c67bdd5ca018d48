//! Round-trip artifact of a parse run.
//!
//! Layout: magic `QSHP`, little-endian `u32` format version, then the
//! bincode-encoded [`ParseResult`]. The version is bumped whenever the
//! persisted types change shape.

use std::fs;
use std::path::Path;

use crate::loginfo::ParseResult;

pub const ARTIFACT_SUFFIX: &str = ".enc";

const MAGIC: &[u8; 4] = b"QSHP";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 8; // magic(4) + version(4)

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cannot access .enc artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt .enc artifact body: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("not a .enc artifact: missing QSHP header")]
    InvalidMagic,

    #[error(".enc artifact format version {0} is not readable by this build")]
    UnsupportedVersion(u32),

    #[error(".enc artifact truncated to {0} bytes, header alone is {1}")]
    FileTooShort(usize, usize),
}

pub fn is_artifact(path: &Path) -> bool {
    path.to_string_lossy().ends_with(ARTIFACT_SUFFIX)
}

/// `mongod.log.gz` -> `mongod.log.enc`.
pub fn artifact_name(input: &Path) -> String {
    let base = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = base.strip_suffix(".gz").unwrap_or(&base);
    format!("{base}{ARTIFACT_SUFFIX}")
}

pub fn encode(result: &ParseResult) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::with_capacity(HEADER_SIZE);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    bincode::serialize_into(&mut out, result)?;
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<ParseResult, CacheError> {
    if data.len() < HEADER_SIZE {
        return Err(CacheError::FileTooShort(data.len(), HEADER_SIZE));
    }
    if &data[..4] != MAGIC {
        return Err(CacheError::InvalidMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }
    Ok(bincode::deserialize(&data[HEADER_SIZE..])?)
}

pub fn write(path: &Path, result: &ParseResult) -> Result<(), CacheError> {
    fs::write(path, encode(result)?)?;
    Ok(())
}

pub fn read(path: &Path) -> Result<ParseResult, CacheError> {
    decode(&fs::read(path)?)
}
