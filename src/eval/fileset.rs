//! `FOR /F` options and line splitting.

use std::io::BufRead;

use crate::config::FilesetConfig;
use crate::error::{BatchError, Result};
use crate::parse::strip_quotes;

/// Which fields of a line to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpec {
    /// 1-based field numbers, ascending and unique.
    pub fields: Vec<usize>,
    /// Trailing `*`: bind the rest of the line after the last field.
    pub rest: bool,
}

impl TokenSpec {
    /// Parse `1,3-5*` style specs.
    pub fn parse(text: &str) -> Result<Self> {
        let (list, rest) = match text.strip_suffix('*') {
            Some(list) => (list, true),
            None => (text, false),
        };
        let mut fields = Vec::new();
        for part in list.split(',').filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((from, to)) => {
                    let from = parse_field(from)?;
                    let to = parse_field(to)?;
                    if to < from {
                        return Err(BatchError::Syntax);
                    }
                    fields.extend(from..=to);
                }
                None => fields.push(parse_field(part)?),
            }
        }
        if fields.is_empty() && !rest {
            return Err(BatchError::Syntax);
        }
        fields.sort_unstable();
        fields.dedup();
        Ok(Self { fields, rest })
    }

    /// Number of loop variables the token list binds.
    pub fn variable_count(&self) -> usize {
        self.fields.len() + usize::from(self.rest)
    }
}

fn parse_field(text: &str) -> Result<usize> {
    match text.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(BatchError::Syntax),
    }
}

/// Parsed `FOR /F` options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSetOptions {
    pub eol: Option<char>,
    pub skip: u64,
    pub delims: Vec<char>,
    pub tokens: TokenSpec,
    pub usebackq: bool,
}

impl Default for FileSetOptions {
    fn default() -> Self {
        Self {
            eol: None,
            skip: 0,
            delims: vec![' ', '\t'],
            tokens: TokenSpec {
                fields: vec![1],
                rest: false,
            },
            usebackq: false,
        }
    }
}

impl FileSetOptions {
    /// Defaults taken from the `[fileset]` config section.
    pub fn from_config(config: &FilesetConfig) -> Result<Self> {
        Ok(Self {
            eol: config.eol.chars().next(),
            delims: config.delims.chars().collect(),
            tokens: TokenSpec::parse(&config.tokens)?,
            ..Self::default()
        })
    }

    /// Parse an options string (surrounding quotes optional) on top of
    /// `base`. Unrecognized text is a syntax error.
    pub fn parse(text: &str, base: &FileSetOptions) -> Result<Self> {
        let mut options = base.clone();
        let text = strip_quotes(text.trim());
        let chars: Vec<char> = text.chars().collect();
        let rest_of = |i: usize| chars[i..].iter().collect::<String>();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == ' ' || chars[i] == '\t' {
                i += 1;
                continue;
            }
            let rest = rest_of(i);
            let lower = rest.to_ascii_lowercase();
            if lower.starts_with("eol=") {
                i += 4;
                options.eol = chars.get(i).copied();
                i += 1;
            } else if lower.starts_with("skip=") {
                i += 5;
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                let value: String = chars[start..i].iter().collect();
                options.skip = strtoul(&value).ok_or(BatchError::Syntax)?;
            } else if lower.starts_with("delims=") {
                i += 7;
                let mut delims = Vec::new();
                while i < chars.len() && chars[i] != ' ' {
                    delims.push(chars[i]);
                    i += 1;
                }
                // A space ending the whole string is itself a delimiter.
                if i + 1 == chars.len() {
                    delims.push(' ');
                    i += 1;
                }
                options.delims = delims;
            } else if lower.starts_with("tokens=") {
                i += 7;
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                let value: String = chars[start..i].iter().collect();
                options.tokens = TokenSpec::parse(&value)?;
            } else if lower.starts_with("usebackq") {
                i += 8;
                options.usebackq = true;
            } else {
                return Err(BatchError::Syntax);
            }
        }
        Ok(options)
    }

    /// Split one line into values for the loop variables, or `None` when
    /// the line contributes no iteration (no tokens, or an `eol` comment).
    pub fn split(&self, line: &str) -> Option<Vec<String>> {
        let spans = self.token_spans(line);
        let (first_start, _) = *spans.first()?;
        if let Some(eol) = self.eol
            && line[first_start..].starts_with(eol)
        {
            return None;
        }

        let mut values = Vec::with_capacity(self.tokens.variable_count());
        values.extend(self.tokens.fields.iter().map(|&n| {
            spans
                .get(n - 1)
                .map_or_else(String::new, |&(s, e)| line[s..e].to_string())
        }));
        if self.tokens.rest {
            let after = self.tokens.fields.last().copied().unwrap_or(0);
            let rest = spans.get(after).map_or("", |&(s, _)| &line[s..]);
            values.push(rest.to_string());
        }
        Some(values)
    }

    /// Byte spans of the delimiter-separated tokens of `line`.
    fn token_spans(&self, line: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in line.char_indices() {
            if self.delims.contains(&c) {
                if let Some(s) = start.take() {
                    spans.push((s, i));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            spans.push((s, line.len()));
        }
        spans
    }

    /// Lines of `reader` turned into loop values, after `skip`, `eol` and
    /// empty-line filtering. Invalid UTF-8 is replaced and trailing `\r`
    /// dropped.
    pub fn records<R: BufRead>(&self, reader: R) -> impl Iterator<Item = Vec<String>> {
        let mut skip = self.skip;
        reader
            .split(b'\n')
            .map_while(std::result::Result::ok)
            .filter_map(move |bytes| {
                if skip > 0 {
                    skip -= 1;
                    return None;
                }
                let line = String::from_utf8_lossy(&bytes);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                self.split(line)
            })
    }
}

/// C `strtoul` with base 0: `0x` hex, leading `0` octal, else decimal.
/// The whole string must be consumed.
pub fn strtoul(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Where a `FOR /F` item takes its lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSetSource {
    File(String),
    /// The item text itself is the single line.
    Literal(String),
    /// Output of a command line.
    Command(String),
}

impl FileSetSource {
    /// Classify an item by its quoting. Without `usebackq`: `"…"` is a
    /// literal, `'…'` a command, anything else a file name. With it: `"…"`
    /// is a file name, `'…'` a literal and `` `…` `` a command.
    pub fn classify(item: &str, usebackq: bool) -> Self {
        let quoted = |q: char| -> Option<String> {
            let inner = item.strip_prefix(q)?;
            Some(inner.strip_suffix(q).unwrap_or(inner).to_string())
        };
        if usebackq {
            if let Some(inner) = quoted('`') {
                return FileSetSource::Command(inner);
            }
            if let Some(inner) = quoted('\'') {
                return FileSetSource::Literal(inner);
            }
            if let Some(inner) = quoted('"') {
                return FileSetSource::File(inner);
            }
        } else {
            if let Some(inner) = quoted('\'') {
                return FileSetSource::Command(inner);
            }
            if let Some(inner) = quoted('"') {
                return FileSetSource::Literal(inner);
            }
        }
        FileSetSource::File(item.to_string())
    }
}
