use super::Builtin;
use crate::error::Result;
use crate::eval::Shell;

/// Characters that may separate `ECHO` from its text. The separator itself
/// is not printed, so `echo.` prints an empty line.
const SEPARATORS: &[char] = &[' ', '\t', '.', ':', ';', ',', '/', '\\', '[', ']', '+', '(', '='];

pub struct Echo;

impl Builtin for Echo {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let mut chars = args.chars();
        let separator = chars.next();
        let text = chars.as_str();

        let Some(separator) = separator.filter(|c| SEPARATORS.contains(c)) else {
            show_state(shell);
            return Ok(None);
        };

        if separator == ' ' || separator == '\t' {
            let word = text.trim();
            if word.is_empty() {
                show_state(shell);
                return Ok(None);
            }
            if word.eq_ignore_ascii_case("on") || word.eq_ignore_ascii_case("off") {
                shell.ctx.echo = word.eq_ignore_ascii_case("on");
                return Ok(None);
            }
        }
        shell.print(text);
        Ok(None)
    }
}

fn show_state(shell: &mut Shell) {
    let state = if shell.ctx.echo { "on" } else { "off" };
    shell.print(&format!("ECHO is {state}."));
}

#[cfg(test)]
mod tests {
    use crate::eval::test_shell;
    use crate::parse::parse;

    fn echo(text: &str) -> (Vec<String>, bool) {
        let (mut shell, console) = test_shell();
        let list = parse(text);
        shell.process_commands(list.cursor(), false);
        (console.lines(), shell.ctx.echo)
    }

    #[test]
    fn prints_text() {
        assert_eq!(echo("echo hello  world").0, vec!["hello  world"]);
    }

    #[test]
    fn dot_prints_blank_line() {
        assert_eq!(echo("echo.").0, vec![""]);
        assert_eq!(echo("echo:on").0, vec!["on"]);
    }

    #[test]
    fn state_and_toggle() {
        assert_eq!(echo("echo").0, vec!["ECHO is on."]);
        let (lines, on) = echo("echo off");
        assert!(lines.is_empty());
        assert!(!on);
        assert_eq!(echo("echo off & echo").0, vec!["ECHO is off."]);
    }
}
