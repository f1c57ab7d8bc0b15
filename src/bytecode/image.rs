use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bytecode::compile::Bytecode;

// =============================================================================
// IMAGE - Persisted bytecode artifacts (.rlbc)
// =============================================================================

/// Magic prefix of a serialized image file.
const MAGIC: [u8; 4] = *b"RLBC";
/// Bumped whenever the opcode set or constant encoding changes shape.
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Image {
    version: u16,
    bytecode: Bytecode,
}

#[derive(Debug)]
pub enum ImageError {
    Io(std::io::Error),
    Codec(postcard::Error),
    BadMagic,
    UnsupportedVersion(u16),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::Io(err) => write!(f, "image error: {}", err),
            ImageError::Codec(err) => write!(f, "image error: malformed image: {}", err),
            ImageError::BadMagic => write!(f, "image error: not a bytecode image"),
            ImageError::UnsupportedVersion(version) => {
                write!(
                    f,
                    "image error: unsupported image version {} (expected {})",
                    version, FORMAT_VERSION
                )
            }
        }
    }
}

impl std::error::Error for ImageError {}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::Io(err)
    }
}

impl From<postcard::Error> for ImageError {
    fn from(err: postcard::Error) -> Self {
        ImageError::Codec(err)
    }
}

pub fn encode(bytecode: &Bytecode) -> Result<Vec<u8>, ImageError> {
    let image = Image {
        version: FORMAT_VERSION,
        bytecode: bytecode.clone(),
    };
    let mut bytes = MAGIC.to_vec();
    bytes.extend(postcard::to_allocvec(&image)?);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Bytecode, ImageError> {
    let payload = bytes.strip_prefix(&MAGIC).ok_or(ImageError::BadMagic)?;
    let image: Image = postcard::from_bytes(payload)?;
    if image.version != FORMAT_VERSION {
        return Err(ImageError::UnsupportedVersion(image.version));
    }
    Ok(image.bytecode)
}

pub fn save(bytecode: &Bytecode, path: &Path) -> Result<(), ImageError> {
    fs::write(path, encode(bytecode)?)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Bytecode, ImageError> {
    decode(&fs::read(path)?)
}
