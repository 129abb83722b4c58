//! cmdflow: run batch scripts, single command lines, or lines from stdin.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use cmdflow::config::Config;
use cmdflow::eval::Shell;
use cmdflow::logging;

// ─── Arguments ───────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cmdflow", version, about = "Batch-script interpreter with cmd.exe control flow")]
struct Cli {
    /// Run LINE as a command line and exit.
    #[arg(short = 'c', value_name = "LINE", conflicts_with = "script")]
    command: Option<String>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Print a JSON run summary to stderr when done.
    #[arg(long)]
    json: bool,

    /// Also log to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Batch file to run. Lines are read from stdin when omitted.
    script: Option<PathBuf>,

    /// Arguments passed to the script as %1, %2, ...
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

// ─── Entry point ─────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    let config = Config::load();

    if cli.dump_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("cmdflow: cannot serialize config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    logging::init(&config.logging, cli.verbose);
    let mut shell = Shell::new(config);

    let code = if let Some(line) = &cli.command {
        info!("running command line");
        shell.run_text(line)
    } else if let Some(script) = &cli.script {
        match shell.run_script(script, &cli.args) {
            Ok(code) => code,
            Err(e) => {
                shell.report(&e);
                e.errorlevel()
            }
        }
    } else {
        shell.run_reader(io::stdin().lock())
    };

    if cli.json {
        match serde_json::to_string(&shell.summary()) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => eprintln!("cmdflow: cannot serialize summary: {e}"),
        }
    }

    std::process::exit(code);
}
