use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use log::trace;

use crate::host::FileSystem;

/// Pending directories of a `FOR /R` walk.
///
/// The front entry is the directory being processed. Expanding it inserts
/// its subdirectories directly behind it, in enumeration order, so
/// consuming the stack visits the tree pre-order, depth-first.
#[derive(Debug, Clone)]
pub struct DirectoryStack {
    entries: VecDeque<PathBuf>,
}

impl DirectoryStack {
    pub fn new(root: PathBuf) -> Self {
        Self {
            entries: VecDeque::from([root]),
        }
    }

    pub fn current(&self) -> Option<&Path> {
        self.entries.front().map(PathBuf::as_path)
    }

    /// Insert the current directory's subdirectories after it. Directories
    /// that cannot be listed contribute nothing.
    pub fn expand_current(&mut self, fs: &dyn FileSystem) {
        let Some(current) = self.entries.front().cloned() else {
            return;
        };
        let subdirs = match fs.subdirectories(&current) {
            Ok(subdirs) => subdirs,
            Err(e) => {
                trace!("cannot list {}: {e}", current.display());
                return;
            }
        };
        for (offset, name) in subdirs.iter().enumerate() {
            self.entries.insert(offset + 1, current.join(name));
        }
    }

    /// Drop the current directory and move to the next pending one.
    pub fn advance(&mut self) {
        self.entries.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StdFileSystem;

    #[test]
    fn preorder_with_children_after_parent() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["a", "a/x", "a/y", "b"] {
            std::fs::create_dir(root.path().join(dir)).unwrap();
        }

        let mut stack = DirectoryStack::new(root.path().to_path_buf());
        let mut visited = Vec::new();
        while let Some(current) = stack.current() {
            let relative = current
                .strip_prefix(root.path())
                .unwrap()
                .display()
                .to_string()
                .replace('\\', "/");
            visited.push(relative);
            stack.expand_current(&StdFileSystem);
            stack.advance();
        }
        assert_eq!(visited, vec!["", "a", "a/x", "a/y", "b"]);
        assert!(stack.current().is_none());
    }

    #[test]
    fn unreadable_root_yields_only_itself() {
        let mut stack = DirectoryStack::new(PathBuf::from("/definitely/not/here"));
        stack.expand_current(&StdFileSystem);
        stack.advance();
        assert!(stack.current().is_none());
    }
}
