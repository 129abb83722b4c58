//! `IF` conditions.

use std::cmp::Ordering;

use log::trace;

use super::set::has_wildcard;
use super::{Shell, skip_statement};
use crate::error::{BatchError, Result};
use crate::parse::line::is_compare_op;
use crate::parse::{Cursor, parameter};

impl Shell {
    /// Run `IF`. `args` is the statement text after the keyword; the
    /// command following the condition and any `ELSE` branch are run by
    /// [`Shell::part_execute`].
    pub(crate) fn condition<'a>(&mut self, args: &str, cursor: &mut Cursor<'a>) -> Result<()> {
        let (test, command) = match self.evaluate(args) {
            Ok(outcome) => outcome,
            Err(err) => {
                skip_statement(cursor);
                return Err(err);
            }
        };
        trace!("if {:?} -> {test}", args.trim());
        self.part_execute(cursor, command, &[], true, test);
        Ok(())
    }

    /// Evaluate the condition at the start of `args`. Returns the outcome
    /// with `NOT` applied and the text that follows the condition.
    fn evaluate<'t>(&self, args: &'t str) -> Result<(bool, &'t str)> {
        let mut n = 0;
        let mut ignore_case = false;
        let mut negate = false;
        let keyword = loop {
            let param = parameter(args, n, false).ok_or(BatchError::Syntax)?;
            if param.value.eq_ignore_ascii_case("/i") {
                ignore_case = true;
            } else if param.value.eq_ignore_ascii_case("not") {
                negate = true;
            } else {
                break param;
            }
            n += 1;
        };

        let operand = || parameter(args, n + 1, false).ok_or(BatchError::Syntax);
        let (test, end) = match keyword.value.to_ascii_lowercase().as_str() {
            "errorlevel" => {
                let operand = operand()?;
                let level: i32 = operand.value.parse().map_err(|_| BatchError::Syntax)?;
                (self.ctx.errorlevel >= level, operand.end)
            }
            "exist" => {
                let operand = operand()?;
                let path = self.ctx.resolve(&operand.value);
                let found = if has_wildcard(&operand.value) {
                    !self.fs.find(&path).is_empty()
                } else {
                    self.fs.exists(&path)
                };
                (found, operand.end)
            }
            "defined" => {
                let operand = operand()?;
                (self.ctx.env.get(&operand.value).is_some(), operand.end)
            }
            _ => compare(args, n, ignore_case)?,
        };
        Ok((test != negate, &args[end..]))
    }
}

/// `a==b` or `a OP b` starting at parameter `n`. Returns the outcome and
/// the byte offset after the right operand.
fn compare(args: &str, n: usize, ignore_case: bool) -> Result<(bool, usize)> {
    let left = parameter(args, n, true).ok_or(BatchError::Syntax)?;
    let next = parameter(args, n + 1, true).ok_or(BatchError::Syntax)?;

    let between = args[left.end..next.start].trim();
    if between == "==" {
        let equal = if ignore_case {
            left.value.to_lowercase() == next.value.to_lowercase()
        } else {
            left.value == next.value
        };
        return Ok((equal, next.end));
    }
    if !between.is_empty() || !is_compare_op(&next.value) {
        return Err(BatchError::Syntax);
    }

    let right = parameter(args, n + 2, true).ok_or(BatchError::Syntax)?;
    let ordering = order(&left.value, &right.value, ignore_case);
    let outcome = match next.value.to_ascii_lowercase().as_str() {
        "equ" => ordering == Ordering::Equal,
        "neq" => ordering != Ordering::Equal,
        "lss" => ordering == Ordering::Less,
        "leq" => ordering != Ordering::Greater,
        "gtr" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok((outcome, right.end))
}

/// Numeric when both sides are integers, otherwise by text.
fn order(left: &str, right: &str, ignore_case: bool) -> Ordering {
    if let (Ok(a), Ok(b)) = (left.parse::<i64>(), right.parse::<i64>()) {
        return a.cmp(&b);
    }
    if ignore_case {
        left.to_lowercase().cmp(&right.to_lowercase())
    } else {
        left.cmp(right)
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::test_shell;
    use crate::parse::parse;

    fn run(text: &str) -> Vec<String> {
        let (mut shell, console) = test_shell();
        let list = parse(text);
        shell.process_commands(list.cursor(), false);
        console.lines()
    }

    #[test]
    fn string_equality() {
        assert_eq!(run("if abc==abc echo same"), vec!["same"]);
        assert_eq!(run("if abc==ABC echo same"), Vec::<String>::new());
        assert_eq!(run("if /i abc==ABC echo same"), vec!["same"]);
        assert_eq!(run("if \"a b\" == \"a b\" echo quoted"), vec!["quoted"]);
    }

    #[test]
    fn negation() {
        assert_eq!(run("if not 1==2 echo differ"), vec!["differ"]);
        assert_eq!(run("if /i not A==a echo no"), Vec::<String>::new());
    }

    #[test]
    fn numeric_and_text_operators() {
        assert_eq!(run("if 10 gtr 9 echo numeric"), vec!["numeric"]);
        assert_eq!(run("if 10 lss 9 echo wrong"), Vec::<String>::new());
        assert_eq!(run("if abc LSS abd echo text"), vec!["text"]);
        assert_eq!(run("if 5 geq 5 echo ge & if 5 neq 5 echo ne"), vec!["ge"]);
    }

    #[test]
    fn else_branches() {
        assert_eq!(run("if 1==2 (echo then) else (echo else)"), vec!["else"]);
        assert_eq!(run("if 1==1 (echo then) else echo else"), vec!["then"]);
        assert_eq!(run("if 1==2 (echo then) else echo else"), vec!["else"]);
    }

    #[test]
    fn errorlevel_and_defined() {
        let (mut shell, console) = test_shell();
        shell.ctx.set_result(3);
        shell.ctx.env.set("present", "1");
        let list = parse("if errorlevel 2 echo ge2 & if errorlevel 4 echo ge4");
        shell.process_commands(list.cursor(), false);
        let list = parse("if defined present echo yes & if not defined absent echo no");
        shell.process_commands(list.cursor(), false);
        assert_eq!(console.lines(), vec!["ge2", "yes", "no"]);
    }

    #[test]
    fn exist_with_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "").unwrap();
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        let list = parse(
            "if exist *.csv echo csv & if exist data.csv echo file & if exist *.xml echo xml",
        );
        shell.process_commands(list.cursor(), false);
        assert_eq!(console.lines(), vec!["csv", "file"]);
    }

    #[test]
    fn bad_condition_skips_branches() {
        let (mut shell, console) = test_shell();
        let list = parse("if errorlevel x (echo a) else (echo b)");
        shell.process_commands(list.cursor(), false);
        assert!(console.lines().is_empty());
        assert_eq!(shell.ctx.errorlevel, 1);
    }
}
