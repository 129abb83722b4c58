use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::config::LoggingConfig;

/// Install the global logger.
///
/// Appends to the configured log file and, when `verbose` is set, also logs
/// to stderr at debug level or finer. Best-effort: a log file that cannot be
/// opened (or a logger that is already installed) is silently skipped,
/// since logging must never stop a script from running.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let level = parse_level(&config.level);
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if let Some(path) = log_path(&config.file)
        && let Some(file) = open_log_file(&path)
    {
        loggers.push(WriteLogger::new(level, log_config.clone(), file));
    }

    if verbose {
        loggers.push(TermLogger::new(
            level.max(LevelFilter::Debug),
            log_config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}

/// Map a config level name to a filter. Unknown names fall back to `warn`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.trim().parse().unwrap_or(LevelFilter::Warn)
}

/// Expand `~` and environment references in the configured path.
fn log_path(file: &str) -> Option<PathBuf> {
    if file.trim().is_empty() {
        return None;
    }
    let expanded = shellexpand::full(file).ok()?;
    Some(PathBuf::from(expanded.as_ref()))
}

fn open_log_file(path: &std::path::Path) -> Option<std::fs::File> {
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("TRACE"), LevelFilter::Trace);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("loud"), LevelFilter::Warn);
    }

    #[test]
    fn empty_path_disables_file_logging() {
        assert_eq!(log_path(""), None);
        assert_eq!(log_path("  "), None);
    }

    #[test]
    fn tilde_is_expanded() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        let path = log_path("~/x.log").unwrap();
        assert_eq!(path, PathBuf::from(home).join("x.log"));
    }

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cmdflow.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }
}
