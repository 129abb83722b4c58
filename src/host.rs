//! Services the engine calls through narrow traits: filesystem enumeration,
//! process launching and console output.
//!
//! The standard implementations talk to the real system. Tests swap in
//! [`CaptureConsole`] and stub launchers so several interpreters can run
//! side by side without touching process-wide state.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;

use glob::MatchOptions;
use log::{debug, trace};

/// One filesystem match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name without its directory.
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Filesystem queries used by `FOR`, `IF EXIST` and friends.
pub trait FileSystem {
    /// Entries matching a pattern containing `*` or `?` in its last
    /// component, in enumeration order. A pattern that matches nothing (or
    /// cannot be enumerated) yields an empty list.
    fn find(&self, pattern: &Path) -> Vec<DirEntry>;

    /// Names of the direct subdirectories of `dir`, in enumeration order.
    fn subdirectories(&self, dir: &Path) -> io::Result<Vec<String>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn file_size(&self, path: &Path) -> Option<u64>;

    /// Open a file for line-by-line reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead>>;
}

/// [`FileSystem`] backed by `std::fs` and the `glob` crate.
///
/// Matching is case-insensitive, like the Windows filesystem, and results
/// come back in name order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Build a glob pattern from a batch wildcard path: the directory part is
/// matched literally, and in the name only `*` and `?` are special.
fn glob_pattern(pattern: &Path) -> String {
    let name = pattern
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // `*.*` means "everything", including names without a dot
    let name = if name == "*.*" { "*".to_string() } else { name };
    let name: String = name
        .chars()
        .map(|c| match c {
            '[' => "[[]".to_string(),
            ']' => "[]]".to_string(),
            c => c.to_string(),
        })
        .collect();
    match pattern.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => {
            let dir = glob::Pattern::escape(&dir.to_string_lossy());
            let sep = std::path::MAIN_SEPARATOR;
            format!("{}{sep}{name}", dir.trim_end_matches(sep))
        }
        None => name,
    }
}

impl FileSystem for StdFileSystem {
    fn find(&self, pattern: &Path) -> Vec<DirEntry> {
        let pattern = glob_pattern(pattern);
        trace!("glob {pattern}");
        let Ok(paths) = glob::glob_with(&pattern, MATCH_OPTIONS) else {
            return Vec::new();
        };
        paths
            .filter_map(Result::ok)
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let is_dir = path.is_dir();
                Some(DirEntry { name, path, is_dir })
            })
            .collect()
    }

    fn subdirectories(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        Ok(names)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path).ok().map(|m| m.len())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// A request to run an external program and wait for it.
#[derive(Debug)]
pub struct LaunchRequest<'a> {
    pub command_line: &'a str,
    pub cwd: &'a Path,
    /// Complete environment for the child.
    pub env: Vec<(String, String)>,
    /// Redirected standard output; inherited when `None`.
    pub stdout: Option<File>,
    pub stderr: Option<File>,
    pub stdin: Option<File>,
}

/// Process creation. Implementations block until the child exits.
pub trait Launcher {
    /// Run the program and return its exit code. A missing program is
    /// reported as an [`io::ErrorKind::NotFound`] error.
    fn launch(&mut self, request: LaunchRequest<'_>) -> io::Result<i32>;
}

/// [`Launcher`] using `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

/// Split a command line into program and arguments.
#[cfg(not(windows))]
pub fn split_command_line(command_line: &str) -> Vec<String> {
    shlex::split(command_line).unwrap_or_else(|| {
        // Fallback: simple whitespace splitting if shlex can't parse
        command_line.split_whitespace().map(String::from).collect()
    })
}

impl Launcher for SystemLauncher {
    fn launch(&mut self, request: LaunchRequest<'_>) -> io::Result<i32> {
        let mut command = build_command(request.command_line)?;
        command
            .current_dir(request.cwd)
            .env_clear()
            .envs(request.env.iter().map(|(k, v)| (k, v)));
        if let Some(out) = request.stdout {
            command.stdout(Stdio::from(out));
        }
        if let Some(err) = request.stderr {
            command.stderr(Stdio::from(err));
        }
        if let Some(input) = request.stdin {
            command.stdin(Stdio::from(input));
        }
        debug!("spawning {:?}", request.command_line);
        let status = command.status()?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(not(windows))]
fn build_command(command_line: &str) -> io::Result<Command> {
    let argv = split_command_line(command_line);
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::from(io::ErrorKind::NotFound));
    };
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

#[cfg(windows)]
fn build_command(command_line: &str) -> io::Result<Command> {
    use std::os::windows::process::CommandExt;

    let (program, args) = crate::parse::command_word(command_line);
    if program.is_empty() {
        return Err(io::Error::from(io::ErrorKind::NotFound));
    }
    let mut command = Command::new(crate::parse::strip_quotes(program));
    command.raw_arg(args.trim_start());
    Ok(command)
}

/// Console output. Text is written as given; callers add line endings.
pub trait Console {
    fn write_out(&mut self, text: &str);
    fn write_err(&mut self, text: &str);
}

/// The process's real stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write_out(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn write_err(&mut self, text: &str) {
        let _ = io::stderr().lock().write_all(text.as_bytes());
    }
}

#[derive(Debug, Default)]
struct Captured {
    out: String,
    err: String,
}

/// In-memory console. Clones share one buffer, so a test can keep a handle
/// while the shell owns another.
#[derive(Debug, Default, Clone)]
pub struct CaptureConsole {
    inner: Rc<RefCell<Captured>>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(&self) -> String {
        self.inner.borrow().out.clone()
    }

    pub fn stderr(&self) -> String {
        self.inner.borrow().err.clone()
    }

    /// Captured stdout split into lines, trailing whitespace removed.
    pub fn lines(&self) -> Vec<String> {
        self.inner
            .borrow()
            .out
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.out.clear();
        inner.err.clear();
    }
}

impl Console for CaptureConsole {
    fn write_out(&mut self, text: &str) {
        self.inner.borrow_mut().out.push_str(text);
    }

    fn write_err(&mut self, text: &str) {
        self.inner.borrow_mut().err.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matches_wildcards_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.TXT"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("c.log"), "").unwrap();
        let names: Vec<String> = StdFileSystem
            .find(&dir.path().join("*.txt"))
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.txt"]);
    }

    #[test]
    fn find_without_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StdFileSystem.find(&dir.path().join("*.nonexistent")).is_empty());
    }

    #[test]
    fn star_dot_star_matches_names_without_dot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "").unwrap();
        assert_eq!(StdFileSystem.find(&dir.path().join("*.*")).len(), 1);
    }

    #[test]
    fn brackets_in_names_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("[x].txt"), "").unwrap();
        std::fs::write(dir.path().join("x.txt"), "").unwrap();
        let found = StdFileSystem.find(&dir.path().join("[x]*"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "[x].txt");
    }

    #[test]
    fn subdirectories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::create_dir(dir.path().join("A")).unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();
        assert_eq!(StdFileSystem.subdirectories(dir.path()).unwrap(), vec!["A", "b"]);
    }

    #[test]
    fn capture_console_shares_buffer() {
        let console = CaptureConsole::new();
        let mut handle = console.clone();
        handle.write_out("one\ntwo\n");
        handle.write_err("bad\n");
        assert_eq!(console.lines(), vec!["one", "two"]);
        assert_eq!(console.stderr(), "bad\n");
    }

    #[cfg(not(windows))]
    #[test]
    fn split_command_line_quotes() {
        assert_eq!(split_command_line("prog 'a b' c"), vec!["prog", "a b", "c"]);
    }
}
