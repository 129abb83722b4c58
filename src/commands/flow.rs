//! Batch control flow. Jumps are recorded as a pending
//! [`Transfer`](crate::eval::Transfer) and carried out by the batch driver
//! once the current line has been abandoned.

use log::debug;

use super::Builtin;
use crate::error::{BatchError, Result};
use crate::eval::batch::{batch_args, is_batch_name};
use crate::eval::{Shell, Transfer};
use crate::parse::{command_word, parameters, strip_quotes};

/// `GOTO label`, `GOTO :EOF`.
pub struct Goto;

impl Builtin for Goto {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        shell.goto(args)?;
        Ok(None)
    }
}

/// `CALL :label args`, `CALL script.bat args`, or `CALL command`.
pub struct Call;

impl Builtin for Call {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let line = args.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if line.starts_with(':') {
            let argv = batch_args(line);
            let label = argv.first().cloned().unwrap_or_default();
            shell.call_label(&label, argv)?;
            return Ok(Some(shell.ctx.errorlevel));
        }

        let (word, _) = command_word(line);
        let program = strip_quotes(word);
        if is_batch_name(program) {
            let path = shell.ctx.resolve(program);
            if shell.fs().exists(&path) {
                shell.call_batch(path, batch_args(line))?;
                return Ok(Some(shell.ctx.errorlevel));
            }
        }

        debug!("call runs {line:?} as a command");
        shell.run_command_line(line);
        Ok(Some(shell.ctx.errorlevel))
    }
}

/// `EXIT [/B] [code]`.
///
/// `/B` inside a batch file ends the current frame; anywhere else `EXIT`
/// stops the interpreter. Without a code the errorlevel is kept.
pub struct Exit;

impl Builtin for Exit {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let params = parameters(args);
        let mut params = params.iter().map(String::as_str).peekable();
        let frame_only = params.next_if(|p| p.eq_ignore_ascii_case("/b")).is_some();
        let code = params
            .next()
            .map_or(shell.ctx.errorlevel, |p| p.parse().unwrap_or(0));

        if frame_only && shell.ctx.in_batch() {
            shell.ctx.transfer = Some(Transfer::Return);
        } else {
            debug!("exit with code {code}");
            shell.ctx.exit_code = Some(code);
            shell.ctx.transfer = Some(Transfer::Exit);
        }
        Ok(Some(code))
    }
}

/// `SHIFT [/n]`: move batch arguments down by one, from `%n` on.
pub struct Shift;

impl Builtin for Shift {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let start = match args.trim().strip_prefix('/') {
            Some(n) => match n.parse::<usize>() {
                Ok(n) if n <= 8 => n,
                _ => return Err(BatchError::Syntax),
            },
            None => 0,
        };
        if let Some(frame) = shell.ctx.frame_mut()
            && start < frame.args.len()
        {
            frame.args.remove(start);
        }
        Ok(None)
    }
}
