use log::trace;

use super::Builtin;
use crate::error::Result;
use crate::eval::Shell;

/// `SETLOCAL`: start a local environment scope. Extension arguments are
/// accepted and ignored.
pub struct SetLocal;

impl Builtin for SetLocal {
    fn run(&self, shell: &mut Shell, _args: &str) -> Result<Option<i32>> {
        shell.ctx.setlocal();
        trace!("setlocal depth {}", shell.ctx.locals_depth());
        Ok(None)
    }
}

/// `ENDLOCAL`: restore the environment saved by the matching `SETLOCAL`.
/// Scopes opened by a calling script are out of reach.
pub struct EndLocal;

impl Builtin for EndLocal {
    fn run(&self, shell: &mut Shell, _args: &str) -> Result<Option<i32>> {
        let floor = shell.ctx.frame().map_or(0, |f| f.locals_depth);
        if shell.ctx.locals_depth() > floor {
            shell.ctx.endlocal();
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::test_shell;
    use crate::parse::parse;

    #[test]
    fn endlocal_restores_environment() {
        let (mut shell, _) = test_shell();
        let list = parse("set keep=1 & setlocal & set keep=2 & set temp=x & endlocal");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.env.get("keep"), Some("1 "));
        assert_eq!(shell.ctx.env.get("temp"), None);
    }

    #[test]
    fn unmatched_endlocal_is_harmless() {
        let (mut shell, _) = test_shell();
        let list = parse("set a=1& endlocal");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.env.get("a"), Some("1"));
        assert_eq!(shell.ctx.errorlevel, 0);
    }
}
