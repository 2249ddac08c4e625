use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use wsimple_sync::config::{self, LoadOptions};
use wsimple_sync::data::JsonLinesOutput;
use wsimple_sync::script::Script;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if handle_cli_flags(&args) {
        return;
    }

    if let Err(err) = run(&args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(args: &[String]) -> bool {
    let mut saw_flag = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wsimple-sync {}", wsimple_sync::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                let config_path = config::default_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "<none>".to_string());
                println!(
                    "wsimple-sync - replay recorded view sessions through the sync core.\n\nUsage: wsimple-sync [--config PATH] replay SCRIPT.yaml\n\n  --config PATH        Config file (default {config_path})\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn run(args: &[String]) -> Result<()> {
    let mut config_file: Option<PathBuf> = None;
    let mut script_path: Option<PathBuf> = None;
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_file = Some(PathBuf::from(path));
            }
            "replay" => {
                let path = args.next().context("replay needs a script path")?;
                script_path = Some(PathBuf::from(path));
            }
            other => bail!("unexpected argument {other:?} (see --help)"),
        }
    }
    let Some(script_path) = script_path else {
        bail!("nothing to do: expected `replay SCRIPT.yaml` (see --help)");
    };

    let cfg = config::load(LoadOptions {
        config_file,
        env_prefix: None,
    })
    .context("load config")?;
    wsimple_sync::telemetry::init(&cfg.log.filter)?;

    let script = Script::load(&script_path)?;
    wsimple_sync::replay(&cfg, script, Arc::new(JsonLinesOutput::stdout()))?;
    Ok(())
}
