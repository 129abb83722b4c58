/// Characters that separate parameters outside double quotes.
const SEPARATORS: &[char] = &[' ', '\t', ',', ';', '='];

/// Characters that end a command name (besides whitespace).
const COMMAND_TERMINATORS: &[char] = &['/', '(', '=', ',', ';', '+'];

/// One parameter extracted from a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// The parameter text, with quotes removed unless extracted raw.
    pub value: String,
    /// Byte offset of the parameter's first character in the source text.
    pub start: usize,
    /// Byte offset one past the parameter's last character.
    pub end: usize,
}

fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c)
}

/// Return the `n`th parameter of `text` (zero-based).
///
/// Parameters are separated by whitespace, `,`, `;` and `=`. A double-quoted
/// run never splits; with `raw` the quotes are kept in `value`, otherwise
/// they are dropped.
pub fn parameter(text: &str, n: usize, raw: bool) -> Option<Param> {
    let mut index = 0;
    let mut chars = text.char_indices().peekable();
    loop {
        while chars.peek().is_some_and(|&(_, c)| is_separator(c)) {
            chars.next();
        }
        let &(start, _) = chars.peek()?;
        let mut value = String::new();
        let mut end = text.len();
        let mut in_quotes = false;
        while let Some(&(i, c)) = chars.peek() {
            if c == '"' {
                in_quotes = !in_quotes;
                if raw {
                    value.push(c);
                }
            } else if !in_quotes && is_separator(c) {
                end = i;
                break;
            } else {
                value.push(c);
            }
            chars.next();
        }
        if index == n {
            return Some(Param { value, start, end });
        }
        index += 1;
    }
}

/// All parameters of `text`, quotes removed.
pub fn parameters(text: &str) -> Vec<String> {
    (0..)
        .map_while(|n| parameter(text, n, false))
        .map(|p| p.value)
        .collect()
}

/// Case-insensitive keyword test: `text` starts with `keyword` followed by
/// whitespace or the end of the text. `done` does not match `do`.
pub fn keyword_ws_found(keyword: &str, text: &str) -> bool {
    let text = text.trim_start();
    let Some(head) = text.get(..keyword.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(keyword)
        && text[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| c == ' ' || c == '\t')
}

/// Text following a keyword found with [`keyword_ws_found`], with leading
/// whitespace removed.
pub fn after_keyword<'a>(keyword: &str, text: &'a str) -> &'a str {
    let text = text.trim_start();
    text.get(keyword.len()..).unwrap_or("").trim_start_matches([' ', '\t'])
}

/// Remove one pair of surrounding double quotes (or a lone leading quote).
pub fn strip_quotes(text: &str) -> &str {
    match text.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner),
        None => text,
    }
}

/// Split a statement into its command name and the remaining text.
///
/// The name ends at whitespace or one of `/ ( = , ; +`; the terminator stays
/// at the front of the remainder. A leading double-quoted run is taken whole
/// (quotes included) so program paths with spaces survive.
pub fn command_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    if let Some(inner) = text.strip_prefix('"') {
        let close = inner.find('"').map_or(text.len(), |i| i + 2);
        return (&text[..close], &text[close..]);
    }
    let end = text
        .find(|c: char| c.is_whitespace() || COMMAND_TERMINATORS.contains(&c))
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

/// Split one line of a `FOR` set into items.
///
/// Items are separated like parameters and keep their quotes. In fileset
/// mode (`/F`) single-quoted and back-quoted runs are items too, so a quoted
/// command line containing spaces stays whole.
pub fn set_items(text: &str, fileset: bool) -> Vec<String> {
    let mut items = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.peek().is_some_and(|&c| is_separator(c)) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };
        let mut item = String::new();
        if fileset && (first == '\'' || first == '`') {
            item.push(first);
            chars.next();
            for c in chars.by_ref() {
                item.push(c);
                if c == first {
                    break;
                }
            }
        } else {
            let mut in_quotes = false;
            while let Some(&c) = chars.peek() {
                if c == '"' {
                    in_quotes = !in_quotes;
                } else if !in_quotes && is_separator(c) {
                    break;
                }
                item.push(c);
                chars.next();
            }
        }
        items.push(item);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_whitespace_separated() {
        assert_eq!(parameter("a b  c", 0, false).unwrap().value, "a");
        assert_eq!(parameter("a b  c", 2, false).unwrap().value, "c");
        assert_eq!(parameter("a b  c", 3, false), None);
    }

    #[test]
    fn parameter_spans() {
        let p = parameter("  %i in (x)", 1, false).unwrap();
        assert_eq!(p.value, "in");
        assert_eq!((p.start, p.end), (5, 7));
    }

    #[test]
    fn parameter_commas_and_equals_separate() {
        assert_eq!(parameters("1,2,3"), vec!["1", "2", "3"]);
        assert_eq!(parameters("a==b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parameter_quotes_group() {
        assert_eq!(parameter("\"a b\" c", 0, false).unwrap().value, "a b");
        assert_eq!(parameter("\"a b\" c", 0, true).unwrap().value, "\"a b\"");
        assert_eq!(
            parameter("/f \"delims=, tokens=2\" %i", 1, true).unwrap().value,
            "\"delims=, tokens=2\""
        );
    }

    #[test]
    fn keyword_requires_whitespace_or_end() {
        assert!(keyword_ws_found("do", "DO echo"));
        assert!(keyword_ws_found("do", "do"));
        assert!(keyword_ws_found("else", "else\t(x)"));
        assert!(!keyword_ws_found("do", "done"));
        assert!(!keyword_ws_found("do", "d"));
        assert!(!keyword_ws_found("else", "elsewhere"));
    }

    #[test]
    fn after_keyword_strips_leading_blanks() {
        assert_eq!(after_keyword("do", "do   echo %i"), "echo %i");
        assert_eq!(after_keyword("else", "ELSE"), "");
    }

    #[test]
    fn strip_quotes_pairs() {
        assert_eq!(strip_quotes("\"a b\""), "a b");
        assert_eq!(strip_quotes("\"open"), "open");
        assert_eq!(strip_quotes("bare"), "bare");
    }

    #[test]
    fn command_word_terminators() {
        assert_eq!(command_word("echo hi"), ("echo", " hi"));
        assert_eq!(command_word("set/a x"), ("set", "/a x"));
        assert_eq!(command_word("echo.hi"), ("echo.hi", ""));
        assert_eq!(command_word("\"my prog\" -x"), ("\"my prog\"", " -x"));
        assert_eq!(command_word(""), ("", ""));
    }

    #[test]
    fn set_items_plain() {
        assert_eq!(set_items("1 2 3", false), vec!["1", "2", "3"]);
        assert_eq!(set_items("5,1,1", false), vec!["5", "1", "1"]);
        assert_eq!(set_items("\"a b\" c", false), vec!["\"a b\"", "c"]);
    }

    #[test]
    fn set_items_fileset_quoted_commands() {
        assert_eq!(set_items("'dir /b'", true), vec!["'dir /b'"]);
        assert_eq!(set_items("`type a.txt` b.txt", true), vec!["`type a.txt`", "b.txt"]);
        assert_eq!(set_items("\"x,y\"", true), vec!["\"x,y\""]);
    }
}
