//! Checksums published next to repository artifacts.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            128 => Some(ChecksumType::Sha512),
            _ => None,
        }
    }

    /// Extension of the checksum file in a Maven repository
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha512 => "sha512",
        }
    }
}

/// Hex digest of `bytes`
pub fn compute(bytes: &[u8], checksum_type: ChecksumType) -> String {
    match checksum_type {
        ChecksumType::Md5 => format!("{:x}", Md5::digest(bytes)),
        ChecksumType::Sha1 => format!("{:x}", Sha1::digest(bytes)),
        ChecksumType::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        ChecksumType::Sha512 => format!("{:x}", Sha512::digest(bytes)),
    }
}

/// Verify `bytes` against the content of a checksum file
///
/// Checksum files hold the digest optionally followed by a file name. Returns
/// `None` when the digest type cannot be recognized.
pub fn verify(bytes: &[u8], checksum_file: &str) -> Option<bool> {
    let expected = checksum_file.split_whitespace().next()?;
    let checksum_type = ChecksumType::from_hex_length(expected.len())?;
    Some(compute(bytes, checksum_type).eq_ignore_ascii_case(expected))
}
