//! Builtin statements: commands the interpreter runs itself instead of
//! launching a program.
//!
//! Each builtin family has its own module implementing [`Builtin`]. The
//! [`Registry`] maps lower-cased names to implementations and is built from
//! configuration, so individual builtins can be disabled.

/// `CD`/`CHDIR`, `PUSHD` and `POPD`.
pub mod dirs;
/// `ECHO` output and the echo flag.
pub mod echo;
/// `GOTO`, `CALL`, `EXIT` and `SHIFT`: batch control flow.
pub mod flow;
/// `REM` comments.
pub mod rem;
/// `SETLOCAL` and `ENDLOCAL` environment scopes.
pub mod scope;
/// `SET` environment listing and assignment.
pub mod set;
/// `TYPE` file output.
pub mod type_file;

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::config::Config;
use crate::error::Result;
use crate::eval::Shell;
use crate::parse::command_word;

/// Trait for builtin statements.
///
/// `args` is the statement text after the command name, with loop variables
/// already substituted. Returning `Some(code)` sets the errorlevel;
/// `None` leaves it untouched and counts as success for `&&`/`||`.
pub trait Builtin: Send + Sync {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>>;
}

/// Registry of enabled builtins, keyed by lower-cased name.
#[derive(Clone)]
pub struct Registry {
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl Registry {
    /// Build the registry from configuration.
    pub fn from_config(config: &Config) -> Self {
        let all: [(&str, Arc<dyn Builtin>); 14] = [
            ("echo", Arc::new(echo::Echo)),
            ("set", Arc::new(set::Set)),
            ("rem", Arc::new(rem::Rem)),
            ("goto", Arc::new(flow::Goto)),
            ("call", Arc::new(flow::Call)),
            ("exit", Arc::new(flow::Exit)),
            ("shift", Arc::new(flow::Shift)),
            ("cd", Arc::new(dirs::ChangeDir)),
            ("chdir", Arc::new(dirs::ChangeDir)),
            ("pushd", Arc::new(dirs::PushDir)),
            ("popd", Arc::new(dirs::PopDir)),
            ("setlocal", Arc::new(scope::SetLocal)),
            ("endlocal", Arc::new(scope::EndLocal)),
            ("type", Arc::new(type_file::TypeFile)),
        ];

        let mut builtins = HashMap::new();
        for (name, builtin) in all {
            if config.builtin_enabled(name) {
                builtins.insert(name.to_string(), builtin);
            } else {
                debug!("builtin {name} disabled by config");
            }
        }
        Self { builtins }
    }

    /// Look up a builtin by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Resolve the builtin a statement starts with, returning it with the
    /// argument text.
    ///
    /// `ECHO` and `CD` may be glued to their argument (`echo.`, `echo:x`,
    /// `cd..`, `cd\`), which the command-word split does not separate.
    pub fn resolve<'a>(&self, line: &'a str) -> Option<(Arc<dyn Builtin>, &'a str)> {
        let line = line.trim_start();
        let (word, rest) = command_word(line);
        if let Some(builtin) = self.get(word) {
            return Some((builtin, rest));
        }
        ["echo", "cd", "chdir"].into_iter().find_map(|name| {
            let glued = word.get(name.len()..)?;
            let matches = word[..name.len()].eq_ignore_ascii_case(name)
                && glued.starts_with(['.', ':', '\\', '[', ']']);
            if matches {
                self.get(name).map(|builtin| (builtin, &line[name.len()..]))
            } else {
                None
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_registered_by_default() {
        let registry = Registry::from_config(&Config::default_config());
        for name in [
            "ECHO", "set", "Rem", "goto", "call", "exit", "shift", "cd", "chdir", "pushd", "popd",
            "setlocal", "endlocal", "type",
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert!(!registry.contains("dir"));
    }

    #[test]
    fn resolve_glued_arguments() {
        let registry = Registry::from_config(&Config::default_config());
        let (_, args) = registry.resolve("echo.hi there").unwrap();
        assert_eq!(args, ".hi there");
        let (_, args) = registry.resolve("cd..").unwrap();
        assert_eq!(args, "..");
        let (_, args) = registry.resolve("  ECHO hello").unwrap();
        assert_eq!(args, " hello");
        assert!(registry.resolve("echoes").is_none());
        assert!(registry.resolve("notepad x").is_none());
    }

    #[test]
    fn disabled_builtins_are_absent() {
        let mut config = Config::default_config();
        config.commands.disabled = vec!["TYPE".into()];
        let registry = Registry::from_config(&config);
        assert!(!registry.contains("type"));
        assert!(registry.contains("echo"));
    }
}
