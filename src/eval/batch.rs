//! Batch files, subroutines and line-oriented input.
//!
//! Each running script or `CALL :label` subroutine is a [`BatchFrame`] on
//! the context's frame stack. Lines are read one logical line at a time:
//! `%` variables are expanded as each physical line is read, bracket
//! groups pull in further lines, and the resulting list is run with
//! [`Shell::process_commands`].

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, trace};

use super::Shell;
use super::context::{BatchFrame, Transfer};
use super::expand::expand_line;
use crate::error::{BatchError, Result};
use crate::parse::{CommandList, parameter, parse_line};

/// Whether a program name refers to a batch file.
pub fn is_batch_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".bat") || lower.ends_with(".cmd")
}

/// Split a `CALL` or script invocation into `%0`, `%1`, … with quotes
/// preserved.
pub fn batch_args(line: &str) -> Vec<String> {
    (0..)
        .map_while(|n| parameter(line, n, true))
        .map(|p| p.value)
        .collect()
}

impl Shell {
    /// Run a script file with arguments and return the exit status.
    pub fn run_script(&mut self, path: &Path, args: &[String]) -> Result<i32> {
        let resolved = self.ctx.resolve(&path.to_string_lossy());
        let mut argv = vec![path.display().to_string()];
        argv.extend(args.iter().cloned());
        info!("running {}", resolved.display());
        self.call_batch(resolved, argv)?;
        Ok(self.exit_status())
    }

    /// Run another batch file to completion in a new frame.
    pub fn call_batch(&mut self, path: PathBuf, args: Vec<String>) -> Result<()> {
        self.check_call_depth()?;
        let lines = self.read_script(&path)?;
        let mut frame = BatchFrame::new(path, lines, args);
        frame.locals_depth = self.ctx.locals_depth();
        self.run_frame(frame);
        Ok(())
    }

    /// `CALL :label`: run the current script from the line after `label`
    /// in a new frame until it returns.
    pub fn call_label(&mut self, label: &str, args: Vec<String>) -> Result<()> {
        let Some(current) = self.ctx.frame() else {
            return Err(BatchError::LabelOutsideBatch);
        };
        let mut frame = BatchFrame::new(current.path.clone(), current.lines.clone(), args);
        frame.next_line = frame
            .find_label(label)
            .ok_or_else(|| BatchError::NoLabel(label.to_string()))?;
        frame.locals_depth = self.ctx.locals_depth();
        self.check_call_depth()?;
        self.run_frame(frame);
        Ok(())
    }

    /// `GOTO`: continue the current script after `label`. `:EOF` ends the
    /// frame. Outside a script the jump is ignored.
    pub fn goto(&mut self, label: &str) -> Result<()> {
        let target = label
            .trim()
            .trim_start_matches(':')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        if target.is_empty() {
            return Err(BatchError::Syntax);
        }
        if !self.ctx.in_batch() {
            debug!("goto {target} outside a script ignored");
            return Ok(());
        }
        if target.eq_ignore_ascii_case("eof") {
            self.ctx.transfer = Some(Transfer::Return);
            return Ok(());
        }

        let found = self.ctx.frame().and_then(|f| f.find_label(&target));
        let Some(line) = found else {
            self.ctx.transfer = Some(Transfer::Return);
            return Err(BatchError::NoLabel(target));
        };
        trace!("goto {target} -> line {line}");
        if let Some(frame) = self.ctx.frame_mut() {
            frame.next_line = line;
        }
        self.ctx.transfer = Some(Transfer::Goto);
        Ok(())
    }

    /// Run lines as typed at the prompt: `%` variables stay as typed when
    /// undefined and there is no `%0`–`%9`.
    pub fn run_lines<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut lines = lines.into_iter();
        while self.ctx.exit_code.is_none()
            && let Some(first) = lines.next()
        {
            let list = {
                let (ctx, fs) = (&self.ctx, self.fs.as_ref());
                let first = expand_line(&first, ctx, fs);
                parse_line(&first, || lines.next().map(|line| expand_line(&line, ctx, fs)))
            };
            self.process_commands(list.cursor(), false);
            self.ctx.transfer = None;
        }
    }

    /// Run `text` line by line and return the exit status.
    pub fn run_text(&mut self, text: &str) -> i32 {
        self.run_lines(text.lines().map(String::from));
        self.exit_status()
    }

    /// Run lines from a reader, such as standard input.
    pub fn run_reader<R: BufRead>(&mut self, reader: R) -> i32 {
        self.run_lines(reader.lines().map_while(std::result::Result::ok));
        self.exit_status()
    }

    fn check_call_depth(&self) -> Result<()> {
        let limit = self.config.settings.max_call_depth;
        if self.ctx.frames.len() >= limit {
            return Err(BatchError::CallDepth(limit));
        }
        Ok(())
    }

    fn read_script(&self, path: &Path) -> Result<Rc<[String]>> {
        let reader = self.fs.open(path).map_err(|source| BatchError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = Vec::new();
        for line in reader.split(b'\n') {
            let line = line?;
            lines.push(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string());
        }
        debug!("read {} line(s) from {}", lines.len(), path.display());
        Ok(lines.into())
    }

    fn run_frame(&mut self, frame: BatchFrame) {
        let locals = frame.locals_depth;
        self.ctx.frames.push(frame);

        while self.ctx.exit_code.is_none()
            && let Some(list) = self.next_command()
        {
            self.process_commands(list.cursor(), false);
            match self.ctx.transfer {
                Some(Transfer::Goto) => self.ctx.transfer = None,
                Some(Transfer::Return) => {
                    self.ctx.transfer = None;
                    break;
                }
                Some(Transfer::Exit) => break,
                None => {}
            }
        }

        self.ctx.frames.pop();
        self.ctx.unwind_locals(locals);
    }

    /// Read and parse the current frame's next logical line.
    fn next_command(&mut self) -> Option<CommandList> {
        let frame = self.ctx.frame()?;
        let lines = Rc::clone(&frame.lines);
        let mut next = frame.next_line;
        let first = lines.get(next)?;
        next += 1;

        let list = {
            let (ctx, fs) = (&self.ctx, self.fs.as_ref());
            let first = expand_line(first, ctx, fs);
            parse_line(&first, || {
                let line = lines.get(next)?;
                next += 1;
                Some(expand_line(line, ctx, fs))
            })
        };
        if let Some(frame) = self.ctx.frame_mut() {
            frame.next_line = next;
        }
        Some(list)
    }
}
