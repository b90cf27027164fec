//! Archive access for card packages.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::package::ImportError;

/// A zip package opened from an in-memory buffer. Entries are listed without
/// extracting payloads and extracted individually on demand.
pub struct PackageArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl PackageArchive {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ImportError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| ImportError::InvalidArchive(err.to_string()))?;
        Ok(Self { archive })
    }

    /// File entry names, candidates containing "collection" first (the usual
    /// home of the relational snapshot).
    pub fn entry_names(&mut self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            if let Ok(entry) = self.archive.by_index(index) {
                if entry.is_file() {
                    names.push(entry.name().to_string());
                }
            }
        }
        names.sort_by(|a, b| {
            let a_candidate = a.to_lowercase().contains("collection");
            let b_candidate = b.to_lowercase().contains("collection");
            b_candidate.cmp(&a_candidate).then_with(|| a.cmp(b))
        });
        names
    }

    /// Extracts one entry fully into memory.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ImportError> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|err| ImportError::InvalidArchive(format!("entry {name}: {err}")))?;
        let mut buffer = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buffer)
            .map_err(|err| ImportError::InvalidArchive(format!("entry {name}: {err}")))?;
        Ok(buffer)
    }
}
