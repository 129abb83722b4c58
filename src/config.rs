use serde::{Deserialize, Serialize};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub fileset: FilesetConfig,
    #[serde(default)]
    pub temp: TempConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub commands: Commands,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub echo: bool,
    #[serde(default = "default_call_depth")]
    pub max_call_depth: usize,
    #[serde(default = "default_true")]
    pub inherit_environment: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            echo: true,
            max_call_depth: default_call_depth(),
            inherit_environment: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_call_depth() -> usize {
    256
}

/// Defaults for `FOR /F` options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesetConfig {
    /// End-of-line character; empty means none.
    #[serde(default)]
    pub eol: String,
    #[serde(default = "default_delims")]
    pub delims: String,
    #[serde(default = "default_tokens")]
    pub tokens: String,
}

impl Default for FilesetConfig {
    fn default() -> Self {
        Self {
            eol: String::new(),
            delims: default_delims(),
            tokens: default_tokens(),
        }
    }
}

fn default_delims() -> String {
    " \t".into()
}

fn default_tokens() -> String {
    "1".into()
}

/// Where `FOR /F` puts captured command output.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TempConfig {
    /// Directory for temp files; empty uses the system temp directory.
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log file path (`~` expanded). Empty disables file logging.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: String::new(),
        }
    }
}

fn default_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EnvironmentConfig {
    /// `NAME=value` assignments applied at startup.
    #[serde(default)]
    pub set: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Commands {
    /// Builtin names that should not be handled internally.
    #[serde(default)]
    pub disabled: Vec<String>,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    fileset: FilesetOverlay,
    #[serde(default)]
    temp: TempOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
    #[serde(default)]
    environment: EnvironmentOverlay,
    #[serde(default)]
    commands: CommandsOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    echo: Option<bool>,
    max_call_depth: Option<usize>,
    inherit_environment: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct FilesetOverlay {
    eol: Option<String>,
    delims: Option<String>,
    tokens: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TempOverlay {
    dir: Option<String>,
    prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EnvironmentOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    set: Vec<String>,
    #[serde(default)]
    remove_set: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CommandsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    disabled: Vec<String>,
    #[serde(default)]
    remove_disabled: Vec<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/cmdflow/config.toml (if exists)
    ///
    /// User config merges with defaults: lists extend, scalars override.
    /// Set `replace = true` in a section to replace its list defaults entirely.
    /// Use `remove_<field>` lists to subtract specific items from defaults.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/cmdflow/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/cmdflow/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("cmdflow: config parse error: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.echo {
            self.settings.echo = v;
        }
        if let Some(v) = s.max_call_depth {
            self.settings.max_call_depth = v;
        }
        if let Some(v) = s.inherit_environment {
            self.settings.inherit_environment = v;
        }

        let f = overlay.fileset;
        if let Some(v) = f.eol {
            self.fileset.eol = v;
        }
        if let Some(v) = f.delims {
            self.fileset.delims = v;
        }
        if let Some(v) = f.tokens {
            self.fileset.tokens = v;
        }

        let t = overlay.temp;
        if let Some(v) = t.dir {
            self.temp.dir = v;
        }
        if let Some(v) = t.prefix {
            self.temp.prefix = v;
        }

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }

        // Environment: entries are matched by variable name, so an overlay
        // assignment replaces the default one for the same name.
        let e = overlay.environment;
        if e.replace {
            self.environment.set = e.set;
        } else {
            self.environment.set.retain(|entry| {
                let name = entry_name(entry);
                !e.remove_set.iter().any(|r| r.eq_ignore_ascii_case(name))
                    && !e.set.iter().any(|n| entry_name(n).eq_ignore_ascii_case(name))
            });
            self.environment.set.extend(e.set);
        }

        let c = overlay.commands;
        merge_list(
            &mut self.commands.disabled,
            c.disabled,
            &c.remove_disabled,
            c.replace,
        );
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }

    /// Startup environment assignments as `(name, value)` pairs. Entries
    /// without `=` are ignored.
    pub fn environment_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environment.set.iter().filter_map(|entry| entry.split_once('='))
    }

    /// Whether the named builtin is enabled.
    pub fn builtin_enabled(&self, name: &str) -> bool {
        !self
            .commands
            .disabled
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }
}

fn entry_name(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(name, _)| name)
}
