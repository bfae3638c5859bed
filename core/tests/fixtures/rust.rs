use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tracks the files that were loaded for a single request.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    entries: HashMap<PathBuf, usize>,
    total_bytes: u64,
}

impl FileIndex {
    pub fn insert(&mut self, path: &Path, size: usize) -> Option<usize> {
        self.total_bytes += size as u64;
        self.entries.insert(path.to_path_buf(), size)
    }

    pub fn largest(&self) -> Option<(&PathBuf, &usize)> {
        self.entries.iter().max_by_key(|(_, size)| **size)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut index = FileIndex::default();
    for arg in std::env::args().skip(1) {
        let meta = std::fs::metadata(&arg)?;
        index.insert(Path::new(&arg), meta.len() as usize);
    }
    if let Some((path, size)) = index.largest() {
        println!("largest file: {} ({} bytes)", path.display(), size);
    }
    Ok(())
}
