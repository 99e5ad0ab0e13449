/*!
 * File Service
 *
 * Reference-counted open files and directory handles. The scheduler core
 * only duplicates and releases handles; it never looks inside them.
 */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Handle to an open file object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(pub u64);

/// Handle to a directory inode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirHandle(pub u64);

/// File service contract
pub trait FileService: Send + Sync {
    /// Take another reference to an open file
    fn dup(&self, file: FileHandle) -> FileHandle;

    /// Drop one reference; the file closes when the count reaches zero
    fn close(&self, file: FileHandle);

    /// Take another reference to a directory
    fn idup(&self, dir: DirHandle) -> DirHandle;

    /// Drop one directory reference
    fn iput(&self, dir: DirHandle);
}

#[derive(Debug)]
struct Entry {
    name: String,
    refs: usize,
}

#[derive(Debug, Default)]
struct Tables {
    files: HashMap<u64, Entry>,
    dirs: HashMap<u64, Entry>,
    next_id: u64,
}

/// In-memory reference-counting file service
#[derive(Default)]
pub struct RefCountedFiles {
    tables: Mutex<Tables>,
}

impl RefCountedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file with one reference
    pub fn open(&self, name: &str) -> FileHandle {
        let mut t = self.tables.lock();
        t.next_id += 1;
        let id = t.next_id;
        t.files.insert(
            id,
            Entry {
                name: name.to_string(),
                refs: 1,
            },
        );
        FileHandle(id)
    }

    /// Look up a directory with one reference
    pub fn namei(&self, path: &str) -> DirHandle {
        let mut t = self.tables.lock();
        if let Some((id, entry)) = t.dirs.iter_mut().find(|(_, e)| e.name == path) {
            entry.refs += 1;
            return DirHandle(*id);
        }
        t.next_id += 1;
        let id = t.next_id;
        t.dirs.insert(
            id,
            Entry {
                name: path.to_string(),
                refs: 1,
            },
        );
        DirHandle(id)
    }

    /// Current reference count, zero once closed
    pub fn file_refs(&self, file: FileHandle) -> usize {
        self.tables
            .lock()
            .files
            .get(&file.0)
            .map(|e| e.refs)
            .unwrap_or(0)
    }

    pub fn dir_refs(&self, dir: DirHandle) -> usize {
        self.tables
            .lock()
            .dirs
            .get(&dir.0)
            .map(|e| e.refs)
            .unwrap_or(0)
    }

    pub fn is_open(&self, file: FileHandle) -> bool {
        self.file_refs(file) > 0
    }
}

impl FileService for RefCountedFiles {
    fn dup(&self, file: FileHandle) -> FileHandle {
        if let Some(e) = self.tables.lock().files.get_mut(&file.0) {
            e.refs += 1;
        }
        file
    }

    fn close(&self, file: FileHandle) {
        let mut t = self.tables.lock();
        let closed = match t.files.get_mut(&file.0) {
            Some(e) => {
                e.refs -= 1;
                e.refs == 0
            }
            None => false,
        };
        if closed {
            if let Some(e) = t.files.remove(&file.0) {
                debug!(file = %e.name, "File closed");
            }
        }
    }

    fn idup(&self, dir: DirHandle) -> DirHandle {
        if let Some(e) = self.tables.lock().dirs.get_mut(&dir.0) {
            e.refs += 1;
        }
        dir
    }

    fn iput(&self, dir: DirHandle) {
        let mut t = self.tables.lock();
        let released = match t.dirs.get_mut(&dir.0) {
            Some(e) => {
                e.refs -= 1;
                e.refs == 0
            }
            None => false,
        };
        if released {
            t.dirs.remove(&dir.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_closes_at_zero_refs() {
        let fs = RefCountedFiles::new();
        let f = fs.open("console");
        let g = fs.dup(f);
        assert_eq!(f, g);
        assert_eq!(fs.file_refs(f), 2);

        fs.close(f);
        assert!(fs.is_open(f));
        fs.close(g);
        assert!(!fs.is_open(f));
    }

    #[test]
    fn test_namei_shares_directory() {
        let fs = RefCountedFiles::new();
        let root = fs.namei("/");
        let again = fs.namei("/");
        assert_eq!(root, again);
        assert_eq!(fs.dir_refs(root), 2);

        fs.iput(root);
        fs.iput(again);
        assert_eq!(fs.dir_refs(root), 0);
    }

    #[test]
    fn test_handles_are_plain_ids() {
        let fs = RefCountedFiles::new();
        let f = fs.open("a");
        assert_eq!(fs.file_refs(f), 1);
        assert_eq!(fs.dup(f), f);

        // A handle rebuilt from its id names the same file
        fs.close(FileHandle(f.0));
        assert_eq!(fs.file_refs(f), 1);
        fs.close(f);
        assert!(!fs.is_open(f));
    }
}
