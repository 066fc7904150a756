use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry materialized on disk.
#[derive(Clone, Debug)]
pub struct ExtractedEntry {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: Option<u32>,
}

/// Summary of a completed extraction.
#[derive(Clone, Debug, Default)]
pub struct ExtractReport {
    pub entries: Vec<ExtractedEntry>,
    pub total_bytes: u64,
    /// Entries that were not materialized: unsupported kinds, and files
    /// whose whole path was consumed by stripping.
    pub skipped: usize,
}

impl ExtractReport {
    pub fn files(&self) -> usize {
        self.count(EntryKind::File)
    }

    pub fn directories(&self) -> usize {
        self.count(EntryKind::Directory)
    }

    fn count(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}
