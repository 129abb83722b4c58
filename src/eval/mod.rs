//! The execution engine.
//!
//! A [`Shell`] owns all interpreter state and walks [`CommandList`]s with a
//! [`Cursor`]. [`Shell::process_commands`] drives a whole list (or one
//! bracket group of it); [`Shell::part_execute`] runs the body of an `IF` or
//! one `FOR` iteration and leaves the cursor after the construct.

pub mod batch;
pub mod condition;
pub mod context;
pub mod dirwalk;
pub mod expand;
pub mod fileset;
pub mod for_loop;
pub mod redirect;
pub mod set;

pub use context::{BatchFrame, Environment, ExecutionContext, LoopBinding, Transfer};
pub use dirwalk::DirectoryStack;
pub use fileset::{FileSetOptions, FileSetSource, TokenSpec};
pub use redirect::Redirection;
pub use set::{Range, SetSource};

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use log::{debug, trace, warn};
use serde::Serialize;

use crate::commands::Registry;
use crate::config::Config;
use crate::error::{BatchError, Result};
use crate::host::{
    Console, FileSystem, LaunchRequest, Launcher, StdConsole, StdFileSystem, SystemLauncher,
};
use crate::parse::{
    ChainOperator, Cursor, after_keyword, command_word, keyword_ws_found,
    strip_quotes,
};

/// Counters reported by `--json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errorlevel: i32,
    pub exit_code: Option<i32>,
    pub statements: usize,
    pub errors: usize,
}

/// A batch interpreter instance.
pub struct Shell {
    pub ctx: ExecutionContext,
    config: Config,
    registry: Registry,
    fs: Box<dyn FileSystem>,
    launcher: Box<dyn Launcher>,
    console: Box<dyn Console>,
    redirections: Vec<Redirection>,
    fileset_defaults: FileSetOptions,
}

impl Shell {
    /// A shell on the real filesystem, process launcher and console.
    pub fn new(config: Config) -> Self {
        Self::with_host(
            config,
            Box::new(StdFileSystem),
            Box::new(SystemLauncher),
            Box::new(StdConsole),
        )
    }

    /// A shell on caller-provided host services.
    pub fn with_host(
        config: Config,
        fs: Box<dyn FileSystem>,
        launcher: Box<dyn Launcher>,
        console: Box<dyn Console>,
    ) -> Self {
        let mut env = if config.settings.inherit_environment {
            Environment::from_process()
        } else {
            Environment::new()
        };
        for (name, value) in config.environment_pairs() {
            env.set(name, value);
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut ctx = ExecutionContext::new(env, cwd);
        ctx.echo = config.settings.echo;

        let fileset_defaults = FileSetOptions::from_config(&config.fileset).unwrap_or_else(|e| {
            warn!("ignoring invalid [fileset] defaults: {e}");
            FileSetOptions::default()
        });

        Self {
            ctx,
            registry: Registry::from_config(&config),
            config,
            fs,
            launcher,
            console,
            redirections: Vec::new(),
            fileset_defaults,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Set the working directory.
    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.ctx.cwd = cwd.into();
    }

    pub fn summary(&self) -> Summary {
        Summary {
            errorlevel: self.ctx.errorlevel,
            exit_code: self.ctx.exit_code,
            statements: self.ctx.statements,
            errors: self.ctx.errors,
        }
    }

    /// Code the interpreter should exit with: the `EXIT` code if one was
    /// given, else the errorlevel.
    pub fn exit_status(&self) -> i32 {
        self.ctx.exit_code.unwrap_or(self.ctx.errorlevel)
    }

    // ── Output ──

    /// Write to standard output, honoring active redirections.
    pub fn write_out(&mut self, text: &str) {
        match self.redirections.iter_mut().rev().find_map(|r| r.stdout.as_mut()) {
            Some(file) => {
                if let Err(e) = file.write_all(text.as_bytes()) {
                    warn!("redirected write failed: {e}");
                }
            }
            None => self.console.write_out(text),
        }
    }

    /// Write to standard error, honoring active redirections.
    pub fn write_err(&mut self, text: &str) {
        let mut to_stdout = false;
        for redirection in self.redirections.iter_mut().rev() {
            if let Some(file) = redirection.stderr.as_mut() {
                if let Err(e) = file.write_all(text.as_bytes()) {
                    warn!("redirected write failed: {e}");
                }
                return;
            }
            if redirection.stderr_to_stdout {
                to_stdout = true;
                break;
            }
        }
        if to_stdout {
            self.write_out(text);
        } else {
            self.console.write_err(text);
        }
    }

    /// Write one line to standard output.
    pub fn print(&mut self, line: &str) {
        self.write_out(&format!("{line}\n"));
    }

    /// Report an error: message to stderr, a `warn` log record, and the
    /// error's errorlevel.
    pub fn report(&mut self, err: &BatchError) {
        warn!("{err}");
        self.write_err(&format!("{err}\n"));
        self.ctx.set_result(err.errorlevel());
        self.ctx.errors += 1;
    }

    // ── Command-list traversal ──

    /// Run the nodes of a command list from `start`.
    ///
    /// In one-bracket mode the run ends at the first close node at or above
    /// the starting depth and the cursor after it is returned. Otherwise
    /// close nodes are ignored and the run continues to the end. Labels are
    /// skipped, and a chained node whose condition fails is skipped along
    /// with any group or `DO`/`ELSE` part it owns.
    pub fn process_commands<'a>(&mut self, start: Cursor<'a>, one_bracket: bool) -> Cursor<'a> {
        let group_depth = start.depth();
        let mut cursor = start;
        let mut previous_depth = None;

        while let Some(node) = cursor.current() {
            let origin = cursor;
            match node.text.as_deref() {
                None => {
                    if one_bracket && group_depth.is_some_and(|d| node.bracket_depth >= d) {
                        cursor.advance();
                        trace!("group at depth {} done", node.bracket_depth);
                        return cursor;
                    }
                }
                Some(text) if text.trim_start().starts_with(':') => {}
                Some(text) if !node.chain.permits(self.ctx.status) => {
                    trace!("chain {} not taken for {text:?}", node.chain.as_str());
                    if previous_depth.is_some_and(|d| d < node.bracket_depth) {
                        skip_group(&mut cursor, node.bracket_depth);
                    } else {
                        skip_statement(&mut cursor);
                    }
                }
                Some(text) => self.execute(text, &node.redirects, &mut cursor),
            }
            previous_depth = Some(node.bracket_depth);
            if cursor == origin {
                cursor.advance();
            }
        }
        cursor
    }

    /// Run the body of an `IF` or one `FOR` iteration.
    ///
    /// `cursor` is at the construct's node, whose tail `first` is the first
    /// command (text after `DO` or the condition). `bindings` stay in scope
    /// until the body finishes. With `execute` false nothing runs, but the
    /// cursor still moves past the body; with `is_if`, an `ELSE` node flips
    /// which branch runs. The cursor is left at the first node after the
    /// construct.
    pub fn part_execute<'a>(
        &mut self,
        cursor: &mut Cursor<'a>,
        first: &str,
        bindings: &[LoopBinding],
        is_if: bool,
        execute: bool,
    ) {
        let Some(start) = cursor.current() else {
            return;
        };
        let mark = self.ctx.push_bindings(bindings);
        let base_depth = start.bracket_depth;

        let origin = *cursor;
        if execute && !first.trim().is_empty() {
            self.execute(first, &start.redirects, cursor);
        } else if !execute && !is_if && opens_construct(first) {
            skip_statement(cursor);
        }
        if *cursor == origin {
            cursor.advance();
        }

        let mut active = execute;
        while let Some(node) = cursor.current() {
            let here = *cursor;
            if node.chain != ChainOperator::None {
                if let Some(text) = node.text.as_deref() {
                    if active && node.chain.permits(self.ctx.status) {
                        self.execute(text, &node.redirects, cursor);
                    } else if opens_construct(text) {
                        skip_statement(cursor);
                    }
                }
            } else if node.bracket_depth > base_depth {
                if active {
                    *cursor = self.process_commands(*cursor, true);
                } else {
                    trace!("skipping node at depth {}", node.bracket_depth);
                }
            } else if is_if
                && let Some(text) = node.text.as_deref()
                && keyword_ws_found("else", text)
            {
                active = !execute;
                let command = after_keyword("else", text);
                if active && !command.is_empty() {
                    self.execute(command, &node.redirects, cursor);
                } else if opens_construct(command) {
                    skip_statement(cursor);
                }
            } else {
                break;
            }
            if *cursor == here {
                cursor.advance();
            }
        }

        self.ctx.pop_bindings(mark);
    }

    // ── Statements ──

    /// Run one statement.
    ///
    /// Loop variables are substituted, a leading `@` is dropped, and the
    /// statement is dispatched to the `FOR` or `IF` driver, a builtin, or an
    /// external program. `FOR` and `IF` may move the cursor past the nodes
    /// they consume; a pending `GOTO` or `EXIT` moves it to the end.
    pub fn execute<'a>(&mut self, text: &str, redirects: &str, cursor: &mut Cursor<'a>) {
        let text = expand::substitute_bindings(text, &self.ctx, self.fs.as_ref());
        let line = text.trim_start().trim_start_matches('@').trim_start();
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        self.ctx.statements += 1;
        debug!("execute {line:?}");

        let (word, rest) = command_word(line);
        let result = if word.eq_ignore_ascii_case("for") {
            self.for_loop(rest, cursor)
        } else if word.eq_ignore_ascii_case("if") {
            self.condition(rest, cursor)
        } else {
            self.run_redirected(line, redirects);
            Ok(())
        };
        if let Err(err) = result {
            self.report(&err);
        }
        if self.ctx.transfer.is_some() {
            cursor.finish();
        }
    }

    /// Run a simple statement with its redirections open.
    fn run_redirected(&mut self, line: &str, redirects: &str) {
        let redirection = match Redirection::open(redirects, &self.ctx.cwd) {
            Ok(redirection) => redirection,
            Err(e) => {
                self.report(&BatchError::Io(e));
                return;
            }
        };
        self.redirections.push(redirection);
        if let Err(err) = self.dispatch(line) {
            self.report(&err);
        }
        self.redirections.pop();
    }

    fn dispatch(&mut self, line: &str) -> Result<()> {
        if let Some((builtin, args)) = self.registry.resolve(line) {
            match builtin.run(self, args)? {
                Some(code) => self.ctx.set_result(code),
                None => self.ctx.status = 0,
            }
            return Ok(());
        }
        let code = self.run_external(line)?;
        self.ctx.set_result(code);
        Ok(())
    }

    /// Run a batch file (without returning to the caller, as `cmd` does
    /// when a script names another one without `CALL`) or launch a program.
    fn run_external(&mut self, line: &str) -> Result<i32> {
        let (word, _) = command_word(line);
        let program = strip_quotes(word);

        if batch::is_batch_name(program) {
            let path = self.ctx.resolve(program);
            if self.fs.exists(&path) {
                let args = batch::batch_args(line);
                self.call_batch(path, args)?;
                if self.ctx.in_batch() && self.ctx.transfer.is_none() {
                    self.ctx.transfer = Some(Transfer::Return);
                }
                return Ok(self.ctx.errorlevel);
            }
        }

        let stdout = self.inherited_stdout()?;
        let stderr = self.inherited_stderr()?;
        let stdin = self
            .redirections
            .iter()
            .rev()
            .find_map(|r| r.stdin.as_ref())
            .map(File::try_clone)
            .transpose()?;
        let request = LaunchRequest {
            command_line: line.trim_end(),
            cwd: &self.ctx.cwd,
            env: self
                .ctx
                .env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            stdout,
            stderr,
            stdin,
        };
        match self.launcher.launch(request) {
            Ok(code) => {
                debug!("{program} exited with {code}");
                Ok(code)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BatchError::NotRecognized(program.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn inherited_stdout(&self) -> io::Result<Option<File>> {
        self.redirections
            .iter()
            .rev()
            .find_map(|r| r.stdout.as_ref())
            .map(File::try_clone)
            .transpose()
    }

    fn inherited_stderr(&self) -> io::Result<Option<File>> {
        for redirection in self.redirections.iter().rev() {
            if let Some(file) = redirection.stderr.as_ref() {
                return file.try_clone().map(Some);
            }
            if redirection.stderr_to_stdout {
                return self.inherited_stdout();
            }
        }
        Ok(None)
    }

    /// Parse and run a command line, the way `CALL` runs a non-batch
    /// target.
    pub fn run_command_line(&mut self, line: &str) {
        let list = crate::parse::parse(line);
        self.process_commands(list.cursor(), false);
    }

    pub(crate) fn push_redirection(&mut self, redirection: Redirection) {
        self.redirections.push(redirection);
    }

    pub(crate) fn pop_redirection(&mut self) {
        self.redirections.pop();
    }
}

/// Skip the statement under the cursor together with the bracket groups
/// and `DO`/`ELSE` parts it owns.
pub(crate) fn skip_statement(cursor: &mut Cursor<'_>) {
    let Some(depth) = cursor.depth() else {
        return;
    };
    cursor.advance();
    while let Some(node) = cursor.current() {
        let owned = node.bracket_depth > depth
            || (node.bracket_depth == depth
                && node.chain == ChainOperator::None
                && node
                    .text
                    .as_deref()
                    .is_some_and(|t| keyword_ws_found("else", t) || keyword_ws_found("do", t)));
        if !owned {
            break;
        }
        cursor.advance();
    }
}

/// Whether `text` starts an `IF` or `FOR`, whose `DO`/`ELSE` nodes follow
/// at the same depth.
fn opens_construct(text: &str) -> bool {
    let line = text.trim_start().trim_start_matches('@');
    let (word, _) = command_word(line);
    word.eq_ignore_ascii_case("if") || word.eq_ignore_ascii_case("for")
}

/// Skip to just after the close node of the group at `depth`.
fn skip_group(cursor: &mut Cursor<'_>, depth: usize) {
    while let Some(node) = cursor.current() {
        cursor.advance();
        if node.is_close() && node.bracket_depth == depth {
            break;
        }
    }
}

/// Default shell with a captured console and an empty environment.
#[cfg(test)]
pub(crate) fn test_shell() -> (Shell, crate::host::CaptureConsole) {
    let mut config = Config::default_config();
    config.settings.inherit_environment = false;
    config.environment.set.clear();
    let console = crate::host::CaptureConsole::new();
    let shell = Shell::with_host(
        config,
        Box::new(StdFileSystem),
        Box::new(crate::host::SystemLauncher),
        Box::new(console.clone()),
    );
    (shell, console)
}
