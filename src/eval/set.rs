//! Expansion of `FOR` set items into loop values.

use std::path::Path;

use log::trace;

use crate::host::{DirEntry, FileSystem};
use crate::parse::strip_quotes;

/// Values produced by one set item.
///
/// Every variant is a finite, forward-only iterator; filesystem matches are
/// fetched when the source is built but filtered lazily.
#[derive(Debug)]
pub enum SetSource {
    /// A plain item: exactly one value.
    Literal(std::option::IntoIter<String>),
    /// Filesystem matches of a wildcard item.
    Wildcard {
        /// Text prepended to each matched name.
        prefix: String,
        entries: std::vec::IntoIter<DirEntry>,
        /// `FOR /D`: yield directories instead of files.
        dirs: bool,
    },
    /// `FOR /L` numbers.
    Range(Range),
}

impl SetSource {
    /// Build the source for one item.
    ///
    /// A plain item is yielded once with its quotes removed. Without a walk
    /// directory, wildcard matches are resolved against `cwd` and keep the
    /// item's directory prefix as written. Inside a `FOR /R` walk both
    /// wildcard matches and plain items are joined onto `dir`.
    pub fn for_item(
        item: &str,
        cwd: &Path,
        dir: Option<&Path>,
        dirs: bool,
        fs: &dyn FileSystem,
    ) -> Self {
        let item = strip_quotes(item);
        if !has_wildcard(item) {
            let value = match dir {
                Some(dir) => join_display(dir, item),
                None => item.to_string(),
            };
            return SetSource::Literal(Some(value).into_iter());
        }

        let (pattern, prefix) = match dir {
            Some(dir) => (dir.join(item), join_display(dir, "")),
            None => (super::context::resolve(cwd, item), written_prefix(item).to_string()),
        };
        let entries = fs.find(&pattern);
        trace!("{} match(es) for {}", entries.len(), pattern.display());
        SetSource::Wildcard {
            prefix,
            entries: entries.into_iter(),
            dirs,
        }
    }
}

impl Iterator for SetSource {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self {
            SetSource::Literal(value) => value.next(),
            SetSource::Wildcard {
                prefix,
                entries,
                dirs,
            } => entries
                .by_ref()
                .find(|e| e.is_dir == *dirs && e.name != "." && e.name != "..")
                .map(|e| format!("{prefix}{}", e.name)),
            SetSource::Range(range) => range.next().map(|n| n.to_string()),
        }
    }
}

/// Whether an item contains `*` or `?`.
pub fn has_wildcard(item: &str) -> bool {
    item.contains(['*', '?'])
}

/// Directory part of an item as typed, including the trailing separator.
fn written_prefix(item: &str) -> &str {
    match item.rfind(['/', '\\']) {
        Some(i) => &item[..=i],
        None => "",
    }
}

fn join_display(dir: &Path, name: &str) -> String {
    let mut text = dir.display().to_string();
    if !text.ends_with(std::path::MAIN_SEPARATOR) {
        text.push(std::path::MAIN_SEPARATOR);
    }
    text.push_str(name);
    text
}

/// Numeric range of `FOR /L (start, step, end)`.
///
/// Counts up while `value <= end` for a positive step and down while
/// `value >= end` for a negative one. A zero step is empty, and the range
/// stops instead of wrapping on overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    next: Option<i64>,
    step: i64,
    end: i64,
}

impl Range {
    pub fn new(start: i64, step: i64, end: i64) -> Self {
        let next = match step {
            0 => None,
            s if s > 0 && start > end => None,
            s if s < 0 && start < end => None,
            _ => Some(start),
        };
        Self { next, step, end }
    }

    /// Build a range from set items with `atol` parsing. Only the first
    /// three items count; missing ones are zero.
    pub fn from_items<S: AsRef<str>>(items: &[S]) -> Self {
        let value = |n: usize| items.get(n).map_or(0, |s| atol(s.as_ref()));
        Self::new(value(0), value(1), value(2))
    }
}

impl Iterator for Range {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next?;
        self.next = current.checked_add(self.step).filter(|n| {
            if self.step > 0 {
                *n <= self.end
            } else {
                *n >= self.end
            }
        });
        Some(current)
    }
}

/// C `atol`: optional whitespace and sign, then leading digits. Anything
/// unparsable is zero.
pub fn atol(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative { -value } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StdFileSystem;

    #[test]
    fn range_closed_form() {
        let values: Vec<i64> = Range::new(1, 1, 5).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        let values: Vec<i64> = Range::new(10, -3, 1).collect();
        assert_eq!(values, vec![10, 7, 4, 1]);
        let values: Vec<i64> = Range::new(0, 2, 5).collect();
        assert_eq!(values, vec![0, 2, 4]);
    }

    #[test]
    fn range_zero_step_and_empty() {
        assert_eq!(Range::new(1, 0, 5).count(), 0);
        assert_eq!(Range::new(5, 1, 1).count(), 0);
        assert_eq!(Range::new(1, -1, 5).count(), 0);
    }

    #[test]
    fn range_stops_on_overflow() {
        let values: Vec<i64> = Range::new(i64::MAX - 1, 1, i64::MAX).collect();
        assert_eq!(values, vec![i64::MAX - 1, i64::MAX]);
        assert_eq!(Range::new(i64::MIN, -1, i64::MIN).count(), 1);
    }

    #[test]
    fn range_from_items() {
        assert_eq!(Range::from_items(&["1", "2", "5", "99"]).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(Range::from_items(&["3"]).count(), 0);
        assert_eq!(Range::from_items(&["x", "1", "2"]).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn atol_semantics() {
        assert_eq!(atol("42"), 42);
        assert_eq!(atol("  -7abc"), -7);
        assert_eq!(atol("+3"), 3);
        assert_eq!(atol("abc"), 0);
        assert_eq!(atol(""), 0);
    }

    fn items(item: &str, cwd: &Path, dir: Option<&Path>, dirs: bool) -> Vec<String> {
        SetSource::for_item(item, cwd, dir, dirs, &StdFileSystem).collect()
    }

    #[test]
    fn literal_items_strip_quotes() {
        assert_eq!(items("\"a b\"", Path::new("/"), None, false), vec!["a b"]);
    }

    #[test]
    fn wildcards_filter_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "").unwrap();
        std::fs::write(dir.path().join("two.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub.txt")).unwrap();

        assert_eq!(items("*.txt", dir.path(), None, false), vec!["one.txt", "two.txt"]);
        assert_eq!(items("*", dir.path(), None, true), vec!["sub.txt"]);
    }

    #[test]
    fn wildcard_keeps_written_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        assert_eq!(items("src/*.rs", dir.path(), None, false), vec!["src/main.rs"]);
    }

    #[test]
    fn wildcard_without_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(items("*.none", dir.path(), None, false).is_empty());
    }

    #[test]
    fn walk_directory_prefixes_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "").unwrap();
        let values = items("*.log", Path::new("/"), Some(dir.path()), false);
        assert_eq!(values, vec![dir.path().join("a.log").display().to_string()]);
        let values = items(".", Path::new("/"), Some(dir.path()), false);
        assert_eq!(values, vec![dir.path().join(".").display().to_string()]);
    }
}
