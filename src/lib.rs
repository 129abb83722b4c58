//! cmdflow: a batch-script interpreter with `cmd.exe` control flow.
//!
//! Each logical line of a script is parsed into a flat
//! [`CommandList`](crate::parse::CommandList) whose nodes carry a bracket
//! depth and a chain operator (`&`, `&&`, `||`). The engine walks that list
//! with a [`Cursor`](crate::parse::Cursor): `FOR` and `IF` consume the nodes
//! of their set, body and `ELSE` branch, and leave the cursor after the
//! construct, whether or not the body ran.
//!
//! # Architecture
//!
//! - **[`parse`]**: line parser, parameter tokenizer, command-list types.
//! - **[`eval`]**: the [`Shell`](crate::eval::Shell), block executor, `FOR`/`IF` drivers and
//!   set expansion.
//! - **[`commands`]**: builtins (`ECHO`, `SET`, `CALL`, `GOTO`, `CD`, …) and their registry.
//! - **[`host`]**: filesystem, process and console services behind traits.
//! - **[`config`]**: embedded defaults plus the user overlay.
//! - **[`logging`]**: log file and verbose stderr output.

/// Builtin trait and per-command implementations.
pub mod commands;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Interpreter error type and errorlevels.
pub mod error;
/// Execution engine: shell state, command-list traversal, `FOR` and `IF`.
pub mod eval;
/// Filesystem, launcher and console traits with standard implementations.
pub mod host;
/// Log file setup.
pub mod logging;
/// Batch line parsing: command lists, cursors, parameter extraction.
pub mod parse;

use host::{CaptureConsole, StdFileSystem, SystemLauncher};

/// Run batch text with the default configuration and a captured console.
///
/// Returns the exit status and everything written to standard output.
/// This is the main entry point for tests and simple usage; for scripts,
/// user config or custom host services, build an [`eval::Shell`] directly.
pub fn run(text: &str) -> (i32, String) {
    let console = CaptureConsole::new();
    let mut shell = eval::Shell::with_host(
        config::Config::default_config(),
        Box::new(StdFileSystem),
        Box::new(SystemLauncher),
        Box::new(console.clone()),
    );
    let code = shell.run_text(text);
    (code, console.stdout())
}
