use log::debug;

use super::Builtin;
use crate::error::{BatchError, Result};
use crate::eval::Shell;
use crate::parse::strip_quotes;

/// `CD`/`CHDIR [/D] [path]`. Without a path, prints the working directory.
pub struct ChangeDir;

impl Builtin for ChangeDir {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let mut target = args.trim();
        if let Some(rest) = target.get(..2).filter(|s| s.eq_ignore_ascii_case("/d")) {
            target = target[rest.len()..].trim_start();
        }
        if target.is_empty() {
            let cwd = shell.ctx.cwd.display().to_string();
            shell.print(&cwd);
            return Ok(None);
        }
        change_to(shell, strip_quotes(target))?;
        Ok(None)
    }
}

/// `PUSHD path`: save the working directory and change to `path`.
pub struct PushDir;

impl Builtin for PushDir {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let target = strip_quotes(args.trim());
        if target.is_empty() {
            return Ok(None);
        }
        let previous = shell.ctx.cwd.clone();
        change_to(shell, target)?;
        shell.ctx.dir_stack.push(previous);
        Ok(None)
    }
}

/// `POPD`: return to the directory saved by the last `PUSHD`.
pub struct PopDir;

impl Builtin for PopDir {
    fn run(&self, shell: &mut Shell, _args: &str) -> Result<Option<i32>> {
        let dir = shell.ctx.dir_stack.pop().ok_or(BatchError::DirStackEmpty)?;
        debug!("popd to {}", dir.display());
        shell.ctx.cwd = dir;
        Ok(None)
    }
}

fn change_to(shell: &mut Shell, target: &str) -> Result<()> {
    let path = shell.ctx.resolve(target);
    if !shell.fs().is_dir(&path) {
        return Err(BatchError::PathNotFound);
    }
    debug!("cwd {}", path.display());
    shell.ctx.cwd = path;
    Ok(())
}
