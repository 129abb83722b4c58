use log::trace;

use super::tokenize::{after_keyword, keyword_ws_found, parameters};
use super::types::{ChainOperator, CommandList, CommandNode};

/// Parse one logical line into a [`CommandList`].
///
/// `next_line` supplies further physical lines while a bracket group is
/// open (or after a trailing `^`). Parsing stops at the end of the physical
/// line on which the outermost group closes.
pub fn parse_line(first: &str, mut next_line: impl FnMut() -> Option<String>) -> CommandList {
    let mut parser = LineParser::default();
    let mut line = first.to_string();
    loop {
        let continued = parser.feed(&line);
        if !continued && parser.depth == 0 {
            break;
        }
        match next_line() {
            Some(next) => line = next,
            None => {
                trace!("input ended with {} unclosed bracket(s)", parser.depth);
                break;
            }
        }
    }
    parser.end_statement();
    CommandList::new(parser.nodes)
}

/// Parse `text` as a single logical line, taking continuation lines from
/// the text itself.
pub fn parse(text: &str) -> CommandList {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");
    parse_line(first, || lines.next().map(String::from))
}

#[derive(Default)]
struct LineParser {
    nodes: Vec<CommandNode>,
    depth: usize,
    current: String,
    redirects: String,
    chain: ChainOperator,
}

impl LineParser {
    /// Consume one physical line. Returns true when the line ended with a
    /// `^` continuation.
    fn feed(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if self.current.trim().is_empty()
            && (is_label(trimmed) || keyword_ws_found("rem", strip_at(trimmed)))
        {
            self.current.push_str(trimmed);
            self.end_statement();
            return false;
        }

        let chars: Vec<char> = line.chars().collect();
        let len = chars.len();
        let mut i = 0;
        let mut in_quotes = false;

        while i < len {
            let c = chars[i];

            if c == '"' {
                in_quotes = !in_quotes;
                self.current.push(c);
                i += 1;
                continue;
            }
            if in_quotes {
                self.current.push(c);
                i += 1;
                continue;
            }

            match c {
                '^' => {
                    if i + 1 == len {
                        return true;
                    }
                    self.current.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                '&' => {
                    let chain = if chars.get(i + 1) == Some(&'&') {
                        i += 1;
                        ChainOperator::OnSuccess
                    } else {
                        ChainOperator::Always
                    };
                    self.end_statement();
                    self.chain = chain;
                }
                '|' if chars.get(i + 1) == Some(&'|') => {
                    i += 1;
                    self.end_statement();
                    self.chain = ChainOperator::OnFailure;
                }
                '>' | '<' => {
                    i = self.take_redirection(&chars, i);
                    continue;
                }
                '(' if opens_group(&self.current) => {
                    self.end_statement();
                    self.depth += 1;
                }
                ')' if self.depth > 0 => {
                    self.end_statement();
                    self.nodes.push(CommandNode::close(self.depth));
                    self.depth -= 1;
                }
                _ => self.current.push(c),
            }
            i += 1;
        }

        self.end_statement();
        self.chain = ChainOperator::None;
        false
    }

    /// Move a redirection starting at `chars[i]` from the statement into the
    /// redirect text. Returns the index after it.
    fn take_redirection(&mut self, chars: &[char], mut i: usize) -> usize {
        let mut redirect = String::new();

        // A handle number directly before the operator belongs to it: `2>`
        if let Some(last) = self.current.chars().last()
            && last.is_ascii_digit()
        {
            let before = self.current[..self.current.len() - 1].chars().last();
            if before.is_none_or(char::is_whitespace) {
                self.current.pop();
                redirect.push(last);
            }
        }

        let op = chars[i];
        redirect.push(op);
        i += 1;
        if op == '>' && chars.get(i) == Some(&'>') {
            redirect.push('>');
            i += 1;
        }
        if chars.get(i) == Some(&'&') && chars.get(i + 1).is_some_and(char::is_ascii_digit) {
            redirect.push('&');
            redirect.push(chars[i + 1]);
            i += 2;
        } else {
            while chars.get(i).is_some_and(|c| *c == ' ' || *c == '\t') {
                i += 1;
            }
            let mut in_quotes = false;
            while let Some(&c) = chars.get(i) {
                if c == '"' {
                    in_quotes = !in_quotes;
                } else if !in_quotes && (c.is_whitespace() || "&|()<>".contains(c)) {
                    break;
                }
                redirect.push(c);
                i += 1;
            }
        }
        if self.current.ends_with([' ', '\t']) {
            while chars.get(i).is_some_and(|c| *c == ' ' || *c == '\t') {
                i += 1;
            }
        }

        if !self.redirects.is_empty() {
            self.redirects.push(' ');
        }
        self.redirects.push_str(&redirect);
        i
    }

    /// Turn the pending text into a node, if there is any.
    fn end_statement(&mut self) {
        let text = self.current.trim_start();
        if !text.is_empty() {
            let node = CommandNode::statement(text, self.depth)
                .with_chain(self.chain)
                .with_redirects(std::mem::take(&mut self.redirects));
            trace!("node d{} {:?} {:?}", node.bracket_depth, node.chain, text);
            self.nodes.push(node);
            self.chain = ChainOperator::None;
        }
        self.current.clear();
    }
}

fn is_label(text: &str) -> bool {
    text.starts_with(':')
}

fn strip_at(text: &str) -> &str {
    text.trim_start_matches('@').trim_start()
}

/// Whether a `(` following `pending` opens a bracket group.
fn opens_group(pending: &str) -> bool {
    let text = strip_at(pending.trim());
    if text.is_empty() || text.eq_ignore_ascii_case("else") || text.eq_ignore_ascii_case("do") {
        return true;
    }
    // A statement after `DO` or `ELSE` opens groups like its bare form.
    let text = ["do", "else"]
        .into_iter()
        .find(|keyword| keyword_ws_found(keyword, text))
        .map_or(text, |keyword| after_keyword(keyword, text));
    if keyword_ws_found("for", text) {
        let last = text.split_whitespace().last().unwrap_or("");
        return last.eq_ignore_ascii_case("in") || last.eq_ignore_ascii_case("do");
    }
    if keyword_ws_found("if", text) {
        return if_condition_complete(&text[2..]);
    }
    false
}

/// Whether `rest` (the text after `IF`) is exactly a complete condition with
/// no command following it yet.
fn if_condition_complete(rest: &str) -> bool {
    let params = parameters(rest);
    let mut words = params.iter().map(String::as_str).peekable();
    while words
        .peek()
        .is_some_and(|w| w.eq_ignore_ascii_case("/i") || w.eq_ignore_ascii_case("not"))
    {
        words.next();
    }
    let words: Vec<&str> = words.collect();
    let Some(first) = words.first() else {
        return false;
    };
    let needed = if ["errorlevel", "exist", "defined"]
        .iter()
        .any(|k| first.eq_ignore_ascii_case(k))
    {
        2
    } else if words.get(1).is_some_and(|w| is_compare_op(w)) {
        3
    } else {
        2
    };
    words.len() == needed
}

pub(crate) fn is_compare_op(word: &str) -> bool {
    ["equ", "neq", "lss", "leq", "gtr", "geq"]
        .iter()
        .any(|op| word.eq_ignore_ascii_case(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(list: &CommandList) -> Vec<(Option<&str>, usize, ChainOperator)> {
        list.nodes()
            .iter()
            .map(|n| (n.text.as_deref(), n.bracket_depth, n.chain))
            .collect()
    }

    #[test]
    fn simple_statement() {
        let list = parse("echo hello");
        assert_eq!(shape(&list), vec![(Some("echo hello"), 0, ChainOperator::None)]);
    }

    #[test]
    fn chain_operators() {
        let list = parse("a&& b|| c& d");
        assert_eq!(
            shape(&list),
            vec![
                (Some("a"), 0, ChainOperator::None),
                (Some("b"), 0, ChainOperator::OnSuccess),
                (Some("c"), 0, ChainOperator::OnFailure),
                (Some("d"), 0, ChainOperator::Always),
            ]
        );
    }

    #[test]
    fn for_with_bracketed_if_else() {
        let list = parse("FOR %i IN (1 2 3) DO (IF %i==2 (echo two) ELSE (echo other))");
        assert_eq!(
            shape(&list),
            vec![
                (Some("FOR %i IN "), 0, ChainOperator::None),
                (Some("1 2 3"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
                (Some("DO "), 0, ChainOperator::None),
                (Some("IF %i==2 "), 1, ChainOperator::None),
                (Some("echo two"), 2, ChainOperator::None),
                (None, 2, ChainOperator::None),
                (Some("ELSE "), 1, ChainOperator::None),
                (Some("echo other"), 2, ChainOperator::None),
                (None, 2, ChainOperator::None),
                (None, 1, ChainOperator::None),
            ]
        );
    }

    #[test]
    fn statements_after_do_and_else_open_groups() {
        let list = parse("for %i in (a) do if %i==a (echo y) else if 1==1 (echo n)");
        assert_eq!(
            shape(&list),
            vec![
                (Some("for %i in "), 0, ChainOperator::None),
                (Some("a"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
                (Some("do if %i==a "), 0, ChainOperator::None),
                (Some("echo y"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
                (Some("else if 1==1 "), 0, ChainOperator::None),
                (Some("echo n"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
            ]
        );
        let list = parse("for %a in (x) do for %b in (y) do echo %a%b");
        assert_eq!(list.len(), 7);
        assert_eq!(list.nodes()[3].text.as_deref(), Some("do for %b in "));
    }

    #[test]
    fn inline_do_stays_one_node() {
        let list = parse("for %i in (a b) do echo %i");
        assert_eq!(list.nodes()[3].text.as_deref(), Some("do echo %i"));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn paren_inside_command_is_literal() {
        let list = parse("echo (hi)");
        assert_eq!(shape(&list), vec![(Some("echo (hi)"), 0, ChainOperator::None)]);
        let list = parse("if 1==1 echo (hi)");
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn quotes_protect_operators() {
        let list = parse("echo \"a && b\" & echo c");
        assert_eq!(list.len(), 2);
        assert_eq!(list.nodes()[0].text.as_deref(), Some("echo \"a && b\" "));
    }

    #[test]
    fn caret_escapes() {
        let list = parse("echo a ^& b");
        assert_eq!(shape(&list), vec![(Some("echo a & b"), 0, ChainOperator::None)]);
    }

    #[test]
    fn multi_line_group_pulls_more_lines() {
        let list = parse("if exist x (\n  echo yes\n  echo again\n) else (\n echo no\n)");
        assert_eq!(
            shape(&list),
            vec![
                (Some("if exist x "), 0, ChainOperator::None),
                (Some("echo yes"), 1, ChainOperator::None),
                (Some("echo again"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
                (Some("else "), 0, ChainOperator::None),
                (Some("echo no"), 1, ChainOperator::None),
                (None, 1, ChainOperator::None),
            ]
        );
    }

    #[test]
    fn group_ends_at_its_closing_line() {
        let mut rest = ["echo inside", ")", "echo later"].into_iter().map(String::from);
        let list = parse_line("(", || rest.next());
        assert_eq!(list.len(), 2);
        assert_eq!(rest.next().as_deref(), Some("echo later"));
    }

    #[test]
    fn redirections_move_out_of_text() {
        let list = parse("echo hi > out.txt 2>&1");
        let node = &list.nodes()[0];
        assert_eq!(node.text.as_deref(), Some("echo hi "));
        assert_eq!(node.redirects, "> out.txt 2>&1");
    }

    #[test]
    fn append_redirect_with_handle() {
        let list = parse("dir 2>>err.log");
        assert_eq!(list.nodes()[0].redirects, "2>>err.log");
        assert_eq!(list.nodes()[0].text.as_deref(), Some("dir "));
    }

    #[test]
    fn rem_takes_rest_of_line() {
        let list = parse("rem a & b (c");
        assert_eq!(shape(&list), vec![(Some("rem a & b (c"), 0, ChainOperator::None)]);
    }

    #[test]
    fn label_line() {
        let list = parse(":loop");
        assert_eq!(list.nodes()[0].text.as_deref(), Some(":loop"));
    }

    #[test]
    fn chained_group_carries_chain_on_first_inner_node() {
        let list = parse("a && (b)");
        assert_eq!(
            shape(&list),
            vec![
                (Some("a"), 0, ChainOperator::None),
                (Some("b"), 1, ChainOperator::OnSuccess),
                (None, 1, ChainOperator::None),
            ]
        );
    }

    #[test]
    fn if_condition_forms() {
        assert!(if_condition_complete(" not exist x "));
        assert!(if_condition_complete(" /i a==b "));
        assert!(if_condition_complete(" 1 lss 2 "));
        assert!(!if_condition_complete(" errorlevel 1 echo "));
    }
}
