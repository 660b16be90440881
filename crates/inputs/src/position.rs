//! Position file - restart-safe tail offsets
//!
//! A text mapping of `path <TAB> inode <TAB> offset`, rewritten atomically
//! (write-temp-and-rename) so a crash never leaves a torn file. The engine
//! relies on this contract for at-least-once semantics across restarts.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(test)]
#[path = "position_test.rs"]
mod position_test;

/// Saved read state for one tailed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEntry {
    pub inode: u64,
    pub offset: u64,
}

/// On-disk map of tailed paths to their read positions.
#[derive(Debug)]
pub struct PositionFile {
    path: PathBuf,
    entries: HashMap<String, PositionEntry>,
}

impl PositionFile {
    /// Load an existing position file; a missing file is an empty map.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut entries = HashMap::new();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let mut fields = line.splitn(3, '\t');
                    let (Some(file), Some(inode), Some(offset)) =
                        (fields.next(), fields.next(), fields.next())
                    else {
                        continue;
                    };
                    let (Ok(inode), Ok(offset)) = (inode.parse(), offset.parse()) else {
                        continue;
                    };
                    entries.insert(file.to_string(), PositionEntry { inode, offset });
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self { path, entries })
    }

    pub fn get(&self, file: &str) -> Option<PositionEntry> {
        self.entries.get(file).copied()
    }

    pub fn set(&mut self, file: impl Into<String>, entry: PositionEntry) {
        self.entries.insert(file.into(), entry);
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// real one.
    pub fn save(&self) -> io::Result<()> {
        let tmp = tmp_path(&self.path);
        {
            let mut out = std::fs::File::create(&tmp)?;
            for (file, entry) in &self.entries {
                writeln!(out, "{file}\t{}\t{}", entry.inode, entry.offset)?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
