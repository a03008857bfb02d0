// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};
use repeater_monitor::config::Config;
use repeater_monitor::preferences::{Background, PreferenceStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repeater-monitor-settings")]
#[command(about = "Read and change repeater-monitor display preferences")]
#[command(version)]
struct Cli {
    /// Preferences file (defaults to the one named in the monitor config)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Monitor config file
    #[arg(short, long, env = "REPEATER_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current preferences
    Show,
    /// Set the background theme
    Background {
        /// One of: default, dark, mesh, topo, aurora, plain
        name: String,
    },
    /// Set brightness (0-100)
    Brightness { value: u8 },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let path = match cli.file {
        Some(path) => path,
        None => Config::load_or_default(cli.config.as_deref())?.preferences_path,
    };
    let mut store = PreferenceStore::load(&path)?;

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => {}
        Commands::Background { name } => {
            let background = Background::parse(&name).ok_or_else(|| {
                let names: Vec<_> = Background::ALL.iter().map(|b| b.name()).collect();
                format!("unknown background {name:?}; expected one of {}", names.join(", "))
            })?;
            store.set_background(background)?;
        }
        Commands::Brightness { value } => store.set_brightness(value)?,
    }

    let prefs = store.get();
    println!("file:       {}", store.path().display());
    println!("background: {}", prefs.background.name());
    println!("brightness: {}", prefs.brightness);
    Ok(())
}
