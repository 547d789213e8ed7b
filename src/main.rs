use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use scenegine::{config::EngineConfig, engine, window};

#[derive(Parser, Debug)]
#[command(version, about = "Runs a Lua-scripted scene")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root scene script, overriding the configuration.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Camera script, overriding the configuration.
    #[arg(long)]
    camera_script: Option<PathBuf>,

    #[arg(long)]
    no_hot_reload: bool,

    /// Run this many frames without a window, then exit.
    #[arg(long, value_name = "FRAMES")]
    headless: Option<u32>,
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = Args::parse();
    let mut config = EngineConfig::load_or_default(args.config.as_deref())?;
    if let Some(script) = args.script {
        config.scene.root_script = Some(script);
    }
    if let Some(script) = args.camera_script {
        config.scene.camera_script = Some(script);
    }
    if args.no_hot_reload {
        config.scene.hot_reload = false;
    }

    match args.headless {
        Some(frames) => {
            engine::run_headless(config, frames);
            Ok(())
        }
        None => window::run(config),
    }
}
