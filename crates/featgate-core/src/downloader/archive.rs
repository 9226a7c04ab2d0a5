//! In-memory archive access (zip/jar, tar, tar.gz, tar.bz2, tar.xz).

use std::io::{Cursor, Read};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from a file name or URL
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();

        if name.ends_with(".zip") || name.ends_with(".jar") || name.ends_with(".kar") {
            Some(ArchiveType::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveType::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveType::TarBz2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(ArchiveType::TarXz)
        } else if name.ends_with(".tar") {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// Detect archive type from its leading bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(ArchiveType::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveType::TarGz)
        } else if bytes.starts_with(b"BZh") {
            Some(ArchiveType::TarBz2)
        } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(ArchiveType::TarXz)
        } else if bytes.len() > 262 && &bytes[257..262] == b"ustar" {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }
}

/// Read access to the entries of an archive held in memory
pub struct ArchiveReader<'a> {
    bytes: &'a [u8],
    archive_type: ArchiveType,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(bytes: &'a [u8], archive_type: ArchiveType) -> Self {
        Self { bytes, archive_type }
    }

    /// Open an archive, detecting its type from content
    pub fn detect(bytes: &'a [u8]) -> Option<Self> {
        ArchiveType::sniff(bytes).map(|t| Self::new(bytes, t))
    }

    /// Names of every file entry (directories excluded)
    pub fn entry_names(&self) -> Result<Vec<String>, String> {
        let mut names = Vec::new();
        self.visit(
            |name, _| {
                names.push(name.to_string());
                false
            },
            false,
        )?;
        Ok(names)
    }

    /// Content of one entry, if present
    pub fn read_entry(&self, path: &str) -> Result<Option<Vec<u8>>, String> {
        let path = path.trim_start_matches("./");

        if self.archive_type == ArchiveType::Zip {
            let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes))
                .map_err(|e| format!("Failed to open zip: {}", e))?;
            let mut file = match archive.by_name(path) {
                Ok(file) => file,
                Err(zip::result::ZipError::FileNotFound) => return Ok(None),
                Err(e) => return Err(format!("Failed to read zip entry {}: {}", path, e)),
            };
            let mut content = Vec::new();
            file.read_to_end(&mut content)
                .map_err(|e| format!("Failed to read zip entry {}: {}", path, e))?;
            return Ok(Some(content));
        }

        let mut found = None;
        self.visit(
            |name, content| {
                if name == path {
                    found = content;
                    true
                } else {
                    false
                }
            },
            true,
        )?;
        Ok(found)
    }

    /// Read every file entry below `prefix`, keyed by path relative to it
    pub fn read_dir(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, String> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut entries = Vec::new();
        self.visit(
            |name, content| {
                if let (Some(relative), Some(content)) = (name.strip_prefix(&prefix), content) {
                    entries.push((relative.to_string(), content));
                }
                false
            },
            true,
        )?;
        Ok(entries)
    }

    /// Walk file entries; `visitor` returns `true` to stop early
    fn visit<F>(&self, mut visitor: F, with_content: bool) -> Result<(), String>
    where
        F: FnMut(&str, Option<Vec<u8>>) -> bool,
    {
        match self.archive_type {
            ArchiveType::Zip => {
                let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes))
                    .map_err(|e| format!("Failed to open zip: {}", e))?;
                for i in 0..archive.len() {
                    let mut file = archive
                        .by_index(i)
                        .map_err(|e| format!("Failed to read zip entry: {}", e))?;
                    if file.is_dir() {
                        continue;
                    }
                    let name = file.name().to_string();
                    let content = if with_content {
                        let mut content = Vec::new();
                        file.read_to_end(&mut content)
                            .map_err(|e| format!("Failed to read zip entry {}: {}", name, e))?;
                        Some(content)
                    } else {
                        None
                    };
                    if visitor(&name, content) {
                        break;
                    }
                }
                Ok(())
            }
            ArchiveType::Tar => visit_tar(self.bytes, visitor, with_content),
            ArchiveType::TarGz => visit_tar(GzDecoder::new(self.bytes), visitor, with_content),
            ArchiveType::TarBz2 => visit_tar(BzDecoder::new(self.bytes), visitor, with_content),
            ArchiveType::TarXz => visit_tar(XzDecoder::new(self.bytes), visitor, with_content),
        }
    }
}

fn visit_tar<R, F>(reader: R, mut visitor: F, with_content: bool) -> Result<(), String>
where
    R: Read,
    F: FnMut(&str, Option<Vec<u8>>) -> bool,
{
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| format!("Failed to read tar: {}", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| format!("Failed to read tar entry: {}", e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| format!("Invalid tar entry path: {}", e))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let content = if with_content {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| format!("Failed to read tar entry {}: {}", name, e))?;
            Some(content)
        } else {
            None
        };
        if visitor(&name, content) {
            break;
        }
    }

    Ok(())
}
