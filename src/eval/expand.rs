//! Textual expansion of `%` references.
//!
//! Two passes exist. [`expand_line`] runs when a physical line is read and
//! replaces `%VAR%`, batch arguments (`%1`, `%*`, `%~dp0`) and `%%`.
//! [`substitute_bindings`] runs when a statement executes and replaces loop
//! variables (`%i`, `%~nxi`) with the innermost bound value.

use std::path::{Component, Path};

use super::context::{ExecutionContext, resolve};
use crate::host::FileSystem;
use crate::parse::strip_quotes;

/// Modifier letters accepted after `%~`.
const MODIFIERS: &[char] = &['f', 'd', 'p', 'n', 'x', 's', 'a', 't', 'z'];

/// Read-time expansion of one physical line.
///
/// In a batch file `%%` becomes `%`, `%0`-`%9` and `%*` expand to the frame's
/// arguments, and undefined `%VAR%` references expand to nothing. On the
/// command line undefined references are left as typed.
pub fn expand_line(line: &str, ctx: &ExecutionContext, fs: &dyn FileSystem) -> String {
    let frame = ctx.frame();
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '%' {
            out.push(c);
            i += 1;
            continue;
        }

        if let Some(frame) = frame {
            match chars.get(i + 1) {
                Some('%') => {
                    out.push('%');
                    i += 2;
                    continue;
                }
                Some(d) if d.is_ascii_digit() => {
                    out.push_str(frame.arg(digit(*d)));
                    i += 2;
                    continue;
                }
                Some('*') => {
                    out.push_str(&frame.args.iter().skip(1).cloned().collect::<Vec<_>>().join(" "));
                    i += 2;
                    continue;
                }
                Some('~') => {
                    let (mods, end) = modifier_run(&chars, i + 2);
                    if let Some(d) = chars.get(end).filter(|d| d.is_ascii_digit()) {
                        let value = frame.arg(digit(*d));
                        out.push_str(&apply_modifiers(value, &mods, ctx, fs));
                        i = end + 1;
                        continue;
                    }
                }
                _ => {}
            }
        }

        let close = chars[i + 1..].iter().position(|&c| c == '%').map(|p| p + i + 1);
        match close {
            Some(close) if close > i + 1 => {
                let name: String = chars[i + 1..close].iter().collect();
                match ctx.var(&name) {
                    Some(value) => out.push_str(&value),
                    None if frame.is_some() => {}
                    None => {
                        out.push('%');
                        out.push_str(&name);
                        out.push('%');
                    }
                }
                i = close + 1;
            }
            _ => {
                // A lone percent sign is dropped in batch files.
                if frame.is_none() {
                    out.push('%');
                }
                i += 1;
            }
        }
    }
    out
}

/// Replace loop-variable references with their bound values.
///
/// `%x` matches only a bound name (case-sensitive). `%~mods x` applies path
/// modifiers; when the letter after the modifier run is not bound, the last
/// modifier letter is tried as the variable instead, so `%~n` still works
/// with a variable named `n`.
pub fn substitute_bindings(text: &str, ctx: &ExecutionContext, fs: &dyn FileSystem) -> String {
    if !ctx.has_bindings() || !text.contains('%') {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '%' {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('~') => {
                let (mods, end) = modifier_run(&chars, i + 2);
                if let Some(&name) = chars.get(end)
                    && let Some(value) = ctx.binding(name)
                {
                    out.push_str(&apply_modifiers(value, &mods, ctx, fs));
                    i = end + 1;
                    continue;
                }
                if let Some(last) = mods.chars().last()
                    && let Some(value) = ctx.binding(last)
                {
                    let mods = &mods[..mods.len() - 1];
                    out.push_str(&apply_modifiers(value, mods, ctx, fs));
                    i = end;
                    continue;
                }
            }
            Some(&name) => {
                if let Some(value) = ctx.binding(name) {
                    out.push_str(value);
                    i += 2;
                    continue;
                }
            }
            None => {}
        }
        out.push('%');
        i += 1;
    }
    out
}

fn digit(c: char) -> usize {
    c.to_digit(10).map_or(0, |d| d as usize)
}

/// Collect modifier letters starting at `start`. Returns them lower-cased
/// along with the index after the run.
fn modifier_run(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    let mut mods = String::new();
    while let Some(c) = chars.get(end)
        && MODIFIERS.contains(&c.to_ascii_lowercase())
    {
        mods.push(c.to_ascii_lowercase());
        end += 1;
    }
    (mods, end)
}

/// Apply `%~` modifiers to a value.
///
/// No modifiers strips quotes. `f` is the full path; `d`, `p`, `n` and `x`
/// select drive, directory, name and extension of the full path and are
/// concatenated in that order; `z` is the file size. `s`, `a` and `t` are
/// accepted and ignored.
pub fn apply_modifiers(
    value: &str,
    mods: &str,
    ctx: &ExecutionContext,
    fs: &dyn FileSystem,
) -> String {
    let raw = strip_quotes(value);
    if mods.is_empty() || raw.is_empty() {
        return raw.to_string();
    }
    let full = resolve(&ctx.cwd, raw);
    let mut out = String::new();

    if mods.contains('z')
        && let Some(size) = fs.file_size(&full)
    {
        out.push_str(&size.to_string());
    }

    let parts: Vec<char> = ['d', 'p', 'n', 'x']
        .into_iter()
        .filter(|m| mods.contains(*m))
        .collect();
    if parts.is_empty() {
        if mods.contains('f') {
            push_spaced(&mut out, &full.display().to_string());
        } else if !mods.contains('z') {
            push_spaced(&mut out, raw);
        }
        return out;
    }

    let mut path_text = String::new();
    for part in parts {
        match part {
            'd' => path_text.push_str(&drive(&full)),
            'p' => path_text.push_str(&directory(&full)),
            'n' => {
                if let Some(stem) = full.file_stem() {
                    path_text.push_str(&stem.to_string_lossy());
                }
            }
            'x' => {
                if let Some(ext) = full.extension() {
                    path_text.push('.');
                    path_text.push_str(&ext.to_string_lossy());
                }
            }
            _ => {}
        }
    }
    push_spaced(&mut out, &path_text);
    out
}

fn push_spaced(out: &mut String, text: &str) {
    if !out.is_empty() && !text.is_empty() {
        out.push(' ');
    }
    out.push_str(text);
}

/// Drive prefix (`C:`), empty where paths have none.
fn drive(path: &Path) -> String {
    match path.components().next() {
        Some(Component::Prefix(prefix)) => prefix.as_os_str().to_string_lossy().into_owned(),
        _ => String::new(),
    }
}

/// Parent directory without the drive, with a trailing separator.
fn directory(path: &Path) -> String {
    let Some(parent) = path.parent() else {
        return String::new();
    };
    let text = parent.display().to_string();
    let mut dir = text
        .strip_prefix(drive(path).as_str())
        .unwrap_or(&text)
        .to_string();
    if !dir.ends_with(std::path::MAIN_SEPARATOR) {
        dir.push(std::path::MAIN_SEPARATOR);
    }
    dir
}
