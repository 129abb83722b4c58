//! Opening the redirections attached to a statement.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::context::resolve;

/// Handles opened for one statement. Streams left as `None` fall through
/// to the enclosing redirection, or to the console.
#[derive(Debug, Default)]
pub struct Redirection {
    pub stdout: Option<File>,
    pub stderr: Option<File>,
    pub stdin: Option<File>,
    /// `2>&1` without a file for stdout in the same statement.
    pub stderr_to_stdout: bool,
}

impl Redirection {
    /// Redirect stdout only, to an already open file.
    pub fn stdout_to(file: File) -> Self {
        Self {
            stdout: Some(file),
            ..Self::default()
        }
    }

    /// Open every redirection in `text` (`> f`, `>> f`, `2> f`, `2>&1`,
    /// `< f`), resolving names against `cwd`. Files are created or
    /// truncated in order, like `cmd` does, even when a later redirection of
    /// the same stream wins.
    pub fn open(text: &str, cwd: &Path) -> io::Result<Self> {
        let mut redirection = Self::default();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }
            let handle = match chars[i] {
                d if d.is_ascii_digit() => {
                    i += 1;
                    d.to_digit(10)
                }
                _ => None,
            };
            let Some(&op) = chars.get(i) else {
                break;
            };
            i += 1;
            let append = op == '>' && chars.get(i) == Some(&'>');
            if append {
                i += 1;
            }

            if chars.get(i) == Some(&'&') {
                let target = chars.get(i + 1).and_then(|c| c.to_digit(10));
                i += 2;
                if op == '>' && handle == Some(2) && target == Some(1) {
                    match redirection.stdout.as_ref().map(File::try_clone) {
                        Some(clone) => redirection.stderr = Some(clone?),
                        None => redirection.stderr_to_stdout = true,
                    }
                }
                continue;
            }

            while chars.get(i).is_some_and(|c| c.is_whitespace()) {
                i += 1;
            }
            let mut target = String::new();
            let mut in_quotes = false;
            while let Some(&c) = chars.get(i) {
                if c == '"' {
                    in_quotes = !in_quotes;
                } else if !in_quotes && c.is_whitespace() {
                    break;
                } else {
                    target.push(c);
                }
                i += 1;
            }
            let path = target_path(&target, cwd);

            match (op, handle) {
                ('<', _) => redirection.stdin = Some(File::open(&path)?),
                (_, Some(2)) => {
                    redirection.stderr = Some(open_output(&path, append)?);
                    redirection.stderr_to_stdout = false;
                }
                (_, None | Some(1)) => redirection.stdout = Some(open_output(&path, append)?),
                _ => {}
            }
        }
        Ok(redirection)
    }
}

fn open_output(path: &Path, append: bool) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
}

fn target_path(target: &str, cwd: &Path) -> PathBuf {
    if target.eq_ignore_ascii_case("nul") {
        return PathBuf::from(if cfg!(windows) { "NUL" } else { "/dev/null" });
    }
    resolve(cwd, target)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn stdout_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old\n").unwrap();

        let mut r = Redirection::open("> out.txt", dir.path()).unwrap();
        r.stdout.as_mut().unwrap().write_all(b"one\n").unwrap();
        drop(r);
        let mut r = Redirection::open(">>out.txt", dir.path()).unwrap();
        r.stdout.as_mut().unwrap().write_all(b"two\n").unwrap();
        drop(r);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn stderr_duplicates_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let r = Redirection::open("> all.txt 2>&1", dir.path()).unwrap();
        assert!(r.stdout.is_some());
        assert!(r.stderr.is_some());
        assert!(!r.stderr_to_stdout);

        let r = Redirection::open("2>&1", dir.path()).unwrap();
        assert!(r.stdout.is_none());
        assert!(r.stderr_to_stdout);
    }

    #[test]
    fn quoted_targets_and_stdin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in put.txt"), "data").unwrap();
        let mut r = Redirection::open("<\"in put.txt\" 2>err.log", dir.path()).unwrap();
        let mut text = String::new();
        r.stdin.as_mut().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "data");
        assert!(dir.path().join("err.log").exists());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Redirection::open("< nothing.txt", dir.path()).is_err());
    }

    #[test]
    fn nul_device() {
        let dir = tempfile::tempdir().unwrap();
        let r = Redirection::open(">nul", dir.path()).unwrap();
        assert!(r.stdout.is_some());
        assert!(!dir.path().join("nul").exists());
    }
}
