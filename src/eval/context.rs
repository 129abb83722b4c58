use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

/// A loop variable bound for the duration of one iteration's block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBinding {
    /// Variable letter. Case-sensitive: `%i` and `%I` are different.
    pub name: char,
    pub value: String,
}

impl LoopBinding {
    pub fn new(name: char, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Environment variables with case-insensitive names.
///
/// Names keep the case they were first set with; iteration is ordered by
/// the upper-cased name, the way `SET` lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, (String, String)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process() -> Self {
        let mut env = Self::new();
        for (name, value) in std::env::vars() {
            env.set(&name, value);
        }
        env
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(&name.to_uppercase())
            .map(|(_, value)| value.as_str())
    }

    /// Set a variable. An empty value removes it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let key = name.to_uppercase();
        if value.is_empty() {
            self.vars.remove(&key);
            return;
        }
        match self.vars.get_mut(&key) {
            Some(entry) => entry.1 = value,
            None => {
                self.vars.insert(key, (name.to_string(), value));
            }
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(&name.to_uppercase());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Variables whose name starts with `prefix`, ignoring case.
    pub fn with_prefix<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
        let prefix = prefix.to_uppercase();
        self.vars
            .iter()
            .filter(move |(key, _)| key.starts_with(&prefix))
            .map(|(_, (name, value))| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// A pending change of control flow, raised by `GOTO` or `EXIT` and acted
/// on by whichever driver is running the affected lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// The current batch frame jumps to a new line.
    Goto,
    /// The current batch frame ends (`GOTO :EOF`, `EXIT /B`).
    Return,
    /// The interpreter stops.
    Exit,
}

/// State of one running batch file (or `CALL :label` subroutine).
#[derive(Debug, Clone)]
pub struct BatchFrame {
    pub path: PathBuf,
    /// Physical lines of the file, shared with subroutine frames.
    pub lines: Rc<[String]>,
    /// Index of the next line to read.
    pub next_line: usize,
    /// `%0`, `%1`, … as passed, quotes preserved.
    pub args: Vec<String>,
    /// `SETLOCAL` depth when the frame started; deeper scopes are dropped
    /// when it ends.
    pub locals_depth: usize,
}

impl BatchFrame {
    pub fn new(path: PathBuf, lines: Rc<[String]>, args: Vec<String>) -> Self {
        Self {
            path,
            lines,
            next_line: 0,
            args,
            locals_depth: 0,
        }
    }

    /// Argument `%n`, or empty when absent.
    pub fn arg(&self, n: usize) -> &str {
        self.args.get(n).map_or("", String::as_str)
    }

    /// Index of the line following `:label`, searching from the top.
    /// Matching ignores case and anything after the label's first word.
    pub fn find_label(&self, label: &str) -> Option<usize> {
        let wanted = label.trim_start_matches(':');
        let wanted = wanted.split_whitespace().next().unwrap_or("");
        self.lines.iter().position(|line| {
            line.trim_start()
                .strip_prefix(':')
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
        })
        .map(|index| index + 1)
    }
}

/// All mutable interpreter state: errorlevel, environment, working
/// directory, loop bindings and batch frames.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// `%ERRORLEVEL%`, tested by `IF ERRORLEVEL`.
    pub errorlevel: i32,
    /// Result of the last statement, tested by `&&` and `||`.
    pub status: i32,
    pub env: Environment,
    pub cwd: PathBuf,
    pub echo: bool,
    /// Directories saved by `PUSHD`.
    pub dir_stack: Vec<PathBuf>,
    pub frames: Vec<BatchFrame>,
    pub transfer: Option<Transfer>,
    /// Set by `EXIT`; the interpreter stops with this code.
    pub exit_code: Option<i32>,
    /// Statements dispatched so far.
    pub statements: usize,
    /// Errors reported so far.
    pub errors: usize,
    bindings: Vec<LoopBinding>,
    locals: Vec<(Environment, PathBuf)>,
}

impl ExecutionContext {
    pub fn new(env: Environment, cwd: PathBuf) -> Self {
        Self {
            errorlevel: 0,
            status: 0,
            env,
            cwd,
            echo: true,
            dir_stack: Vec::new(),
            frames: Vec::new(),
            transfer: None,
            exit_code: None,
            statements: 0,
            errors: 0,
            bindings: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// Record a statement result as both errorlevel and chain status.
    pub fn set_result(&mut self, code: i32) {
        self.errorlevel = code;
        self.status = code;
    }

    /// Push loop bindings; returns a mark for [`Self::pop_bindings`].
    pub fn push_bindings(&mut self, bindings: &[LoopBinding]) -> usize {
        let mark = self.bindings.len();
        self.bindings.extend_from_slice(bindings);
        mark
    }

    pub fn pop_bindings(&mut self, mark: usize) {
        self.bindings.truncate(mark);
    }

    /// Innermost binding for `name`.
    pub fn binding(&self, name: char) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.name == name)
            .map(|b| b.value.as_str())
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Variable lookup including the dynamic `ERRORLEVEL` and `CD`, which
    /// apply only when no real variable of that name exists.
    pub fn var(&self, name: &str) -> Option<String> {
        if let Some(value) = self.env.get(name) {
            return Some(value.to_string());
        }
        if name.eq_ignore_ascii_case("errorlevel") {
            Some(self.errorlevel.to_string())
        } else if name.eq_ignore_ascii_case("cd") {
            Some(self.cwd.display().to_string())
        } else {
            None
        }
    }

    pub fn in_batch(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn frame(&self) -> Option<&BatchFrame> {
        self.frames.last()
    }

    pub fn frame_mut(&mut self) -> Option<&mut BatchFrame> {
        self.frames.last_mut()
    }

    /// Resolve a path typed in a script against the working directory.
    pub fn resolve(&self, text: &str) -> PathBuf {
        resolve(&self.cwd, text)
    }

    /// `SETLOCAL`: snapshot environment and working directory.
    pub fn setlocal(&mut self) {
        self.locals.push((self.env.clone(), self.cwd.clone()));
    }

    /// `ENDLOCAL`: restore the latest snapshot. Returns false when there
    /// is none.
    pub fn endlocal(&mut self) -> bool {
        match self.locals.pop() {
            Some((env, cwd)) => {
                self.env = env;
                self.cwd = cwd;
                true
            }
            None => false,
        }
    }

    pub fn locals_depth(&self) -> usize {
        self.locals.len()
    }

    /// Drop `SETLOCAL` scopes above `depth`.
    pub fn unwind_locals(&mut self, depth: usize) {
        while self.locals.len() > depth && self.endlocal() {}
    }
}

/// Join `text` onto `base` unless it is absolute, then normalize `.` and
/// `..` lexically.
pub fn resolve(base: &Path, text: &str) -> PathBuf {
    let path = Path::new(text);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
