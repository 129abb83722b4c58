use super::Builtin;
use crate::error::{BatchError, Result};
use crate::eval::Shell;

/// `SET`: list variables, or assign `name=value`.
///
/// The value runs to the end of the statement, trailing spaces included.
/// The quoted form `set "name=value"` ends the value at the last quote.
/// Arithmetic (`/A`) and prompting (`/P`) are not supported.
pub struct Set;

impl Builtin for Set {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let args = args.trim_start();
        let switch = args.get(..2).map(str::to_ascii_lowercase);
        if matches!(switch.as_deref(), Some("/a" | "/p")) {
            return Err(BatchError::Syntax);
        }

        let text = match args.strip_prefix('"') {
            Some(inner) => inner.rfind('"').map_or(inner, |end| &inner[..end]),
            None => args,
        };

        let Some((name, value)) = text.split_once('=') else {
            return Ok(list(shell, text.trim()));
        };
        if name.is_empty() {
            return Err(BatchError::Syntax);
        }
        shell.ctx.env.set(name, value);
        Ok(None)
    }
}

/// Print `NAME=value` for variables starting with `prefix`.
fn list(shell: &mut Shell, prefix: &str) -> Option<i32> {
    let lines: Vec<String> = shell
        .ctx
        .env
        .with_prefix(prefix)
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if lines.is_empty() && !prefix.is_empty() {
        shell.write_err(&format!("Environment variable {prefix} not defined\n"));
        return Some(1);
    }
    for line in &lines {
        shell.print(line);
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::eval::test_shell;
    use crate::parse::parse;

    #[test]
    fn assign_and_remove() {
        let (mut shell, _) = test_shell();
        let list = parse("set Greeting=hi there");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.env.get("GREETING"), Some("hi there"));

        let list = parse("set greeting=");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.env.get("greeting"), None);
    }

    #[test]
    fn quoted_form_trims_at_last_quote() {
        let (mut shell, _) = test_shell();
        let list = parse("set \"x=a b\" ");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.env.get("x"), Some("a b"));
    }

    #[test]
    fn lists_by_prefix() {
        let (mut shell, console) = test_shell();
        let list = parse("set ab=1 & set abc=2 & set b=3 & set AB");
        shell.process_commands(list.cursor(), false);
        assert_eq!(console.lines(), vec!["ab=1", "abc=2"]);
        assert_eq!(shell.ctx.errorlevel, 0);
    }

    #[test]
    fn missing_prefix_sets_errorlevel() {
        let (mut shell, console) = test_shell();
        let list = parse("set nothing_here");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.errorlevel, 1);
        assert!(console.stderr().contains("not defined"));
    }

    #[test]
    fn arithmetic_is_rejected() {
        let (mut shell, _) = test_shell();
        let list = parse("set /a x=1+1");
        shell.process_commands(list.cursor(), false);
        assert_eq!(shell.ctx.errorlevel, 1);
        assert_eq!(shell.ctx.env.get("x"), None);
    }
}
