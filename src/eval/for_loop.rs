//! The `FOR` driver.
//!
//! A `FOR` statement spans several nodes: the statement itself, its set (a
//! bracket group one level deeper), then a node starting with `DO` whose
//! tail is the first command of the body, optionally followed by a deeper
//! group. The body is run once per value with [`Shell::part_execute`].

use std::io::{self, BufRead};
use std::path::PathBuf;

use log::{debug, trace};
use tempfile::NamedTempFile;

use super::dirwalk::DirectoryStack;
use super::expand::substitute_bindings;
use super::fileset::{FileSetOptions, FileSetSource};
use super::redirect::Redirection;
use super::set::{Range, SetSource};
use super::{LoopBinding, Shell, skip_statement};
use crate::error::{BatchError, Result};
use crate::parse::{
    Cursor, after_keyword, keyword_ws_found, parameter, parse, set_items, strip_quotes,
};

/// Qualifiers and loop variable of a `FOR` statement.
#[derive(Debug, Default)]
struct Header {
    /// `/D`: match directories.
    dirs: bool,
    /// `/L`: numeric range.
    numeric: bool,
    /// `/F` with its option text, if any.
    fileset: Option<Option<String>>,
    /// `/R` with its root, if any.
    recursive: Option<Option<String>>,
    variable: char,
}

impl Header {
    fn parse(args: &str) -> Result<Self> {
        let mut header = Header::default();
        let mut n = 0;
        let param = |n: usize| parameter(args, n, true).ok_or(BatchError::Syntax);

        loop {
            let word = param(n)?.value;
            if !word.starts_with('/') {
                break;
            }
            n += 1;
            // Qualifier arguments are optional and never start with `/` or `%`.
            let argument = parameter(args, n, true)
                .map(|p| p.value)
                .filter(|v| !v.starts_with(['/', '%']));
            match word.to_ascii_lowercase().as_str() {
                "/d" => header.dirs = true,
                "/l" => header.numeric = true,
                "/f" => {
                    n += usize::from(argument.is_some());
                    header.fileset = Some(argument);
                }
                "/r" => {
                    n += usize::from(argument.is_some());
                    header.recursive = Some(argument);
                }
                _ => return Err(BatchError::Syntax),
            }
        }
        if header.numeric && header.fileset.is_some() {
            return Err(BatchError::Syntax);
        }

        let variable = param(n)?.value;
        let mut chars = variable.chars();
        header.variable = match (chars.next(), chars.next(), chars.next()) {
            (Some('%'), Some(name), None) => name,
            _ => return Err(BatchError::Syntax),
        };
        if !param(n + 1)?.value.eq_ignore_ascii_case("in") {
            return Err(BatchError::Syntax);
        }
        Ok(header)
    }
}

/// The body being iterated: where it starts, its first command, and where
/// the last run of it ended.
struct Body<'a> {
    start: Cursor<'a>,
    first: String,
    resume: Option<Cursor<'a>>,
}

impl Shell {
    /// Run `FOR`. `args` is the statement text after the keyword and
    /// `cursor` is at the `FOR` node; on return it is after the whole
    /// construct.
    pub(crate) fn for_loop<'a>(&mut self, args: &str, cursor: &mut Cursor<'a>) -> Result<()> {
        let mut work = *cursor;
        match self.run_for(args, &mut work) {
            Ok(()) => {
                *cursor = work;
                Ok(())
            }
            Err(err) => {
                skip_statement(cursor);
                Err(err)
            }
        }
    }

    fn run_for<'a>(&mut self, args: &str, cursor: &mut Cursor<'a>) -> Result<()> {
        let header = Header::parse(args)?;
        let depth = cursor.depth().ok_or(BatchError::Syntax)?;
        cursor.advance();

        // The set: every node of the group one level deeper.
        if !cursor.depth().is_some_and(|d| d > depth) {
            return Err(BatchError::Syntax);
        }
        let mut set_lines = Vec::new();
        while let Some(node) = cursor.current() {
            if node.bracket_depth <= depth {
                break;
            }
            cursor.advance();
            match node.text.as_deref() {
                Some(text) => {
                    set_lines.push(substitute_bindings(text, &self.ctx, self.fs.as_ref()));
                }
                None if node.bracket_depth == depth + 1 => break,
                None => {}
            }
        }

        let do_text = cursor
            .current()
            .and_then(|node| node.text.as_deref())
            .filter(|text| keyword_ws_found("do", text))
            .ok_or(BatchError::Syntax)?;
        let mut body = Body {
            start: *cursor,
            first: after_keyword("do", do_text).to_string(),
            resume: None,
        };
        trace!("for %{} over {} set line(s)", header.variable, set_lines.len());

        if header.numeric {
            let items: Vec<String> =
                set_lines.iter().flat_map(|line| set_items(line, false)).collect();
            for value in Range::from_items(&items) {
                let binding = [LoopBinding::new(header.variable, value.to_string())];
                if !self.run_body(&mut body, &binding) {
                    break;
                }
            }
        } else if let Some(options) = &header.fileset {
            let options = match options {
                Some(text) => FileSetOptions::parse(text, &self.fileset_defaults)?,
                None => self.fileset_defaults.clone(),
            };
            self.for_fileset(&header, &options, &set_lines, &mut body)?;
        } else {
            self.for_items(&header, &set_lines, &mut body);
        }

        *cursor = match body.resume {
            Some(resume) => resume,
            None => {
                let mut skip = body.start;
                self.part_execute(&mut skip, &body.first, &[], false, false);
                skip
            }
        };
        Ok(())
    }

    /// Run one iteration. Returns false once a `GOTO` or `EXIT` ends the
    /// loop.
    fn run_body<'a>(&mut self, body: &mut Body<'a>, bindings: &[LoopBinding]) -> bool {
        let mut cursor = body.start;
        self.part_execute(&mut cursor, &body.first, bindings, false, true);
        body.resume = Some(cursor);
        self.ctx.transfer.is_none()
    }

    /// Plain, wildcard, `/D` and `/R` sets.
    fn for_items<'a>(&mut self, header: &Header, set_lines: &[String], body: &mut Body<'a>) {
        let mut walk = header.recursive.as_ref().map(|root| {
            let root = root.as_deref().map(strip_quotes).unwrap_or(".");
            DirectoryStack::new(self.ctx.resolve(root))
        });

        loop {
            let dir = match walk.as_mut() {
                Some(walk) => {
                    let Some(dir) = walk.current().map(PathBuf::from) else {
                        break;
                    };
                    walk.expand_current(self.fs.as_ref());
                    trace!("for /r in {}", dir.display());
                    Some(dir)
                }
                None => None,
            };

            for line in set_lines {
                for item in set_items(line, false) {
                    let values: Vec<String> = SetSource::for_item(
                        &item,
                        &self.ctx.cwd,
                        dir.as_deref(),
                        header.dirs,
                        self.fs.as_ref(),
                    )
                    .collect();
                    for value in values {
                        if !self.run_body(body, &[LoopBinding::new(header.variable, value)]) {
                            return;
                        }
                    }
                }
            }

            match walk.as_mut() {
                Some(walk) => walk.advance(),
                None => break,
            }
        }
    }

    /// `/F` sets: files, literal strings and command output, split into
    /// tokens bound to successive variable letters.
    fn for_fileset<'a>(
        &mut self,
        header: &Header,
        options: &FileSetOptions,
        set_lines: &[String],
        body: &mut Body<'a>,
    ) -> Result<()> {
        for line in set_lines {
            for item in set_items(line, true) {
                let source = FileSetSource::classify(&item, options.usebackq);
                let (reader, _capture) = self.open_fileset(&source)?;
                for record in options.records(reader) {
                    let bindings: Vec<LoopBinding> = record
                        .into_iter()
                        .enumerate()
                        .map(|(offset, value)| {
                            LoopBinding::new(letter(header.variable, offset), value)
                        })
                        .collect();
                    if !self.run_body(body, &bindings) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Open the lines of a `/F` item. Captured command output lives in a
    /// temporary file that must be kept until reading is done.
    fn open_fileset(
        &mut self,
        source: &FileSetSource,
    ) -> Result<(Box<dyn BufRead>, Option<NamedTempFile>)> {
        match source {
            FileSetSource::File(name) => {
                let path = self.ctx.resolve(name);
                let reader = self
                    .fs
                    .open(&path)
                    .map_err(|source| BatchError::ReadFailed { path, source })?;
                Ok((reader, None))
            }
            FileSetSource::Literal(text) => {
                Ok((Box::new(io::Cursor::new(text.clone().into_bytes())), None))
            }
            FileSetSource::Command(command) => {
                let capture = self.capture_output(command)?;
                let reader = self
                    .fs
                    .open(capture.path())
                    .map_err(|source| BatchError::ReadFailed {
                        path: capture.path().to_path_buf(),
                        source,
                    })?;
                Ok((reader, Some(capture)))
            }
        }
    }

    /// Run `command` with its standard output sent to a temporary file.
    fn capture_output(&mut self, command: &str) -> Result<NamedTempFile> {
        let temp = self.config.temp.clone();
        let mut builder = tempfile::Builder::new();
        builder.prefix(&temp.prefix).suffix(".tmp");
        let capture = if temp.dir.is_empty() {
            builder.tempfile()?
        } else {
            builder.tempfile_in(&temp.dir)?
        };
        debug!("capturing {command:?} in {}", capture.path().display());

        let handle = capture.as_file().try_clone()?;
        self.push_redirection(Redirection::stdout_to(handle));
        let list = parse(command);
        self.process_commands(list.cursor(), false);
        self.pop_redirection();
        Ok(capture)
    }
}

/// The variable letter `offset` places after `first`.
fn letter(first: char, offset: usize) -> char {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| char::from_u32(first as u32 + offset))
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::test_shell;
    use crate::parse::parse;

    fn run(shell: &mut Shell, text: &str) {
        let list = parse(text);
        shell.process_commands(list.cursor(), false);
    }

    #[test]
    fn literal_items() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for %i in (a b,c;\"d e\") do echo %i");
        assert_eq!(console.lines(), vec!["a", "b", "c", "d e"]);
    }

    #[test]
    fn numeric_ranges() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for /l %n in (1,2,7) do echo %n");
        run(&mut shell, "for /L %n in (3 -1 1) do echo %n");
        assert_eq!(console.lines(), vec!["1", "3", "5", "7", "3", "2", "1"]);
    }

    #[test]
    fn zero_step_never_runs() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for /l %n in (1,0,5) do echo %n");
        assert!(console.lines().is_empty());
    }

    #[test]
    fn empty_range_resumes_like_a_full_one() {
        let text = |range: &str| format!("(for /l %i in ({range}) do (echo %i)\necho after)");
        for (range, expected) in [("5,1,1", vec!["after"]), ("1,1,1", vec!["1", "after"])] {
            let (mut shell, console) = test_shell();
            let list = parse(&text(range));
            let mut cursor = list.cursor();
            let first = cursor.current().and_then(|n| n.text.clone()).unwrap();
            shell.execute(&first, "", &mut cursor);
            assert_eq!(cursor.position(), 6, "{range}");
            shell.process_commands(list.cursor(), false);
            let lines = console.lines();
            assert_eq!(lines[lines.len() - expected.len()..], expected[..], "{range}");
        }
    }

    #[test]
    fn group_body_and_following_statement() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for %x in (1 2) do (\necho a%x\necho b%x\n)\n");
        run(&mut shell, "echo end");
        assert_eq!(console.lines(), vec!["a1", "b1", "a2", "b2", "end"]);
    }

    #[test]
    fn nested_loops_see_outer_variables() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for %i in (x y) do for %j in (1 2) do echo %i%j");
        assert_eq!(console.lines(), vec!["x1", "x2", "y1", "y2"]);
    }

    #[test]
    fn fileset_tokens_bind_successive_letters() {
        let dir = tempfile::tempdir().unwrap();
        let data = "# header\r\nalpha,1,one\r\n\r\nbeta,2,two\r\n";
        std::fs::write(dir.path().join("data.txt"), data).unwrap();
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        run(&mut shell, "for /f \"eol=# tokens=1,3 delims=,\" %a in (data.txt) do echo %a-%b");
        assert_eq!(console.lines(), vec!["alpha-one", "beta-two"]);
    }

    #[test]
    fn fileset_literal_string() {
        let (mut shell, console) = test_shell();
        run(&mut shell, "for /f \"tokens=2*\" %a in (\"one two three four\") do echo %a/%b");
        assert_eq!(console.lines(), vec!["two/three four"]);
    }

    #[test]
    fn fileset_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        run(&mut shell, "for /f %l in ('echo first^& echo second') do echo got %l");
        assert_eq!(console.lines(), vec!["got first", "got second"]);
    }

    #[test]
    fn fileset_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        run(&mut shell, "for /f %l in (absent.txt) do (echo %l)");
        run(&mut shell, "echo next");
        assert_eq!(console.lines(), vec!["next"]);
        assert!(console.stderr().contains("absent.txt"));
    }

    #[test]
    fn recursive_walk_is_preorder() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "a/x", "b"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        run(&mut shell, "for /r %d in (.) do echo %d");
        let root = dir.path().display().to_string();
        let sep = std::path::MAIN_SEPARATOR;
        let expected: Vec<String> = ["", "a", "a/x", "b"]
            .iter()
            .map(|sub| {
                let base = if sub.is_empty() {
                    root.clone()
                } else {
                    dir.path().join(sub).display().to_string()
                };
                format!("{base}{sep}.")
            })
            .collect();
        assert_eq!(console.lines(), expected);
    }

    #[test]
    fn wildcard_items_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.log"), "").unwrap();
        std::fs::write(dir.path().join("two.log"), "").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let (mut shell, console) = test_shell();
        shell.set_cwd(dir.path());
        run(&mut shell, "for %f in (*.log) do echo %f");
        run(&mut shell, "for /d %f in (*) do echo dir %f");
        assert_eq!(console.lines(), vec!["one.log", "two.log", "dir logs"]);
    }

    #[test]
    fn goto_ends_the_loop() {
        let (mut shell, console) = test_shell();
        shell.ctx.frames.push(crate::eval::BatchFrame::new(
            "t.bat".into(),
            vec![":out".to_string()].into(),
            Vec::new(),
        ));
        run(&mut shell, "for %i in (1 2 3) do (echo %i & goto out)");
        assert_eq!(console.lines(), vec!["1"]);
        assert_eq!(shell.ctx.transfer, Some(crate::eval::Transfer::Goto));
    }

    #[test]
    fn malformed_headers_are_syntax_errors() {
        for text in [
            "for %i (a) do echo",
            "for /x %i in (a) do echo %i",
            "for %ii in (a) do echo",
            "for /l /f %i in (1) do echo",
        ] {
            let (mut shell, console) = test_shell();
            run(&mut shell, text);
            assert_eq!(shell.ctx.errorlevel, 1, "{text}");
            assert!(console.lines().is_empty(), "{text}");
        }
    }

    #[test]
    fn letters_advance() {
        assert_eq!(letter('a', 0), 'a');
        assert_eq!(letter('a', 2), 'c');
    }
}
