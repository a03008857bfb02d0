// SPDX-License-Identifier: MPL-2.0

//! repeater-monitor: live terminal view and one-shot commands for a repeater

use clap::{Parser, Subcommand, ValueEnum};
use repeater_monitor::api::ApiClient;
use repeater_monitor::api::types::{LogLevel, Mode, PacketFilter, RadioConfigUpdate};
use repeater_monitor::config::Config;
use repeater_monitor::preferences::{Background, PreferenceStore};
use repeater_monitor::render::{self, Theme};
use repeater_monitor::state::{ResourceHistory, Slice, Store};
use repeater_monitor::views::{Navigator, TimeRange, View};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "repeater-monitor")]
#[command(about = "Monitor and control a LoRa mesh repeater over its HTTP API")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, env = "REPEATER_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Backend origin, overrides the config file
    #[arg(short, long)]
    api_url: Option<String>,

    /// Disable colors
    #[arg(long)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live, auto-refreshing view
    Watch {
        #[arg(short, long, value_enum, default_value_t = ViewArg::Dashboard)]
        view: ViewArg,

        /// Statistics range: 1h, 6h, 24h or 7d
        #[arg(short, long, default_value = "1h")]
        range: String,
    },
    /// Print the node stats card
    Stats,
    /// List packets, optionally filtered
    Packets {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Packet type number
        #[arg(long = "type")]
        packet_type: Option<u8>,
        /// Route type number
        #[arg(long)]
        route: Option<u8>,
        /// Only packets from the last N minutes
        #[arg(long)]
        since_minutes: Option<u32>,
    },
    /// Look up one packet by hash
    Packet { hash: String },
    /// Bucketed traffic histogram
    Buckets {
        #[arg(short, long, default_value = "1h")]
        range: String,
    },
    /// Noise floor summary
    Noise {
        #[arg(long, default_value = "24")]
        hours: u32,
    },
    /// Hardware usage
    Hardware,
    /// Recent log lines
    Logs {
        #[arg(short, long, default_value = "40")]
        lines: usize,
    },
    /// Available radio presets
    Presets,
    /// Switch between forwarding and monitor-only mode
    SetMode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Enable or disable duty cycle enforcement
    DutyCycle {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Change the backend's log level
    LogLevel {
        #[arg(value_enum)]
        level: LevelArg,
    },
    /// Broadcast an advert now
    Advert,
    /// Change radio parameters
    Radio {
        #[arg(long)]
        frequency: Option<f64>,
        #[arg(long)]
        sf: Option<u8>,
        #[arg(long)]
        bw: Option<f64>,
        #[arg(long)]
        cr: Option<u8>,
        #[arg(long)]
        tx_power: Option<i8>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Dashboard,
    Stats,
    Logs,
    System,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Forward,
    Monitor,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Debug,
    Info,
    Warning,
    Error,
}

fn parse_range(s: &str) -> Result<TimeRange, String> {
    TimeRange::parse(s).ok_or_else(|| format!("unknown range {s:?}; use 1h, 6h, 24h or 7d"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
        config.validate()?;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    log::debug!("Using backend {}", config.api_url);

    let api = ApiClient::from_config(&config)?;
    let prefs = PreferenceStore::load(&config.preferences_path)?;
    let theme = if cli.plain {
        Theme::plain()
    } else {
        Theme::from_preferences(&prefs.get())
    };

    match cli.command {
        Commands::Watch { view, range } => {
            let view = match view {
                ViewArg::Dashboard => View::Dashboard,
                ViewArg::Stats => View::Statistics(parse_range(&range)?),
                ViewArg::Logs => View::Logs,
                ViewArg::System => View::System,
            };
            watch(config, api, view, prefs, cli.plain).await?;
        }
        Commands::Stats => {
            let stats = api.stats().await?;
            print!("{}", render::stats_card(&theme, &stats));
            print!("{}", render::neighbor_table(&theme, &stats, usize::MAX));
        }
        Commands::Packets {
            limit,
            packet_type,
            route,
            since_minutes,
        } => {
            let packets = if packet_type.is_none() && route.is_none() && since_minutes.is_none() {
                api.recent_packets(limit).await?
            } else {
                let now = chrono::Utc::now().timestamp() as f64;
                let filter = PacketFilter {
                    packet_type,
                    route,
                    start_timestamp: since_minutes.map(|m| now - m as f64 * 60.0),
                    end_timestamp: None,
                    limit: Some(limit),
                };
                api.filtered_packets(&filter).await?
            };
            print!("{}", render::packet_table(&theme, &packets, limit as usize));
        }
        Commands::Packet { hash } => {
            let packet = api.packet_by_hash(&hash).await?;
            println!("{}", serde_json::to_string_pretty(&packet)?);
        }
        Commands::Buckets { range } => {
            let range = parse_range(&range)?;
            let stats = api.bucketed_stats(range.minutes(), range.buckets()).await?;
            print!(
                "{}",
                render::bucket_chart(&theme, &stats, &config.airtime, config.smoothing_window)
            );
        }
        Commands::Noise { hours } => {
            let stats = api.noise_floor_stats(hours).await?;
            let history = api.noise_floor_history(hours).await?;
            let values: Vec<f64> = history.iter().map(|s| s.noise_floor_dbm).collect();
            println!(
                "Noise floor over {hours}h: avg {:.1} dBm, min {:.1}, max {:.1} ({} samples)",
                stats.average, stats.min, stats.max, stats.count
            );
            println!("{}", render::sparkline(&values));
        }
        Commands::Hardware => {
            let hw = api.hardware_stats().await?;
            println!("CPU  {}", render::progress_bar(&theme, hw.cpu_percent, 20));
            println!("RAM  {}", render::progress_bar(&theme, hw.memory_percent, 20));
            println!("Disk {}", render::progress_bar(&theme, hw.disk_percent, 20));
        }
        Commands::Logs { lines } => {
            let logs = api.logs().await?;
            print!("{}", render::log_lines(&theme, &logs, lines));
        }
        Commands::Presets => {
            for preset in api.radio_presets().await? {
                println!(
                    "{:<24} {:.3} MHz  SF{}  BW{} kHz  CR4/{}",
                    preset.name,
                    preset.frequency_mhz,
                    preset.spreading_factor,
                    preset.bandwidth_khz,
                    preset.coding_rate
                );
            }
        }
        Commands::SetMode { mode } => {
            let mode = match mode {
                ModeArg::Forward => Mode::Forward,
                ModeArg::Monitor => Mode::Monitor,
            };
            report(api.set_mode(mode).await?);
        }
        Commands::DutyCycle { state } => {
            report(api.set_duty_cycle(matches!(state, Toggle::On)).await?);
        }
        Commands::LogLevel { level } => {
            let level = match level {
                LevelArg::Debug => LogLevel::Debug,
                LevelArg::Info => LogLevel::Info,
                LevelArg::Warning => LogLevel::Warning,
                LevelArg::Error => LogLevel::Error,
            };
            report(api.set_log_level(level).await?);
        }
        Commands::Advert => report(api.send_advert().await?),
        Commands::Radio {
            frequency,
            sf,
            bw,
            cr,
            tx_power,
        } => {
            let update = RadioConfigUpdate {
                frequency_mhz: frequency,
                spreading_factor: sf,
                bandwidth_khz: bw,
                coding_rate: cr,
                tx_power_dbm: tx_power,
            };
            if update == RadioConfigUpdate::default() {
                return Err("nothing to change; pass at least one radio option".into());
            }
            report(api.update_radio_config(&update).await?);
        }
    }
    Ok(())
}

fn report(ack: repeater_monitor::api::types::Ack) {
    println!("{}", ack.message.as_deref().unwrap_or("ok"));
}

// ============================================================================
// Live view
// ============================================================================

/// Keys typed on stdin while watching.
enum Input {
    Quit,
    Switch(View),
    Background(Background),
    Brightness(u8),
    Unknown(String),
}

fn parse_input(line: &str, current: View) -> Input {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("q"), _) | (Some("quit"), _) => Input::Quit,
        (Some("1"), _) => Input::Switch(View::Dashboard),
        (Some("2"), range) => {
            let range = range.and_then(TimeRange::parse).unwrap_or(match current {
                View::Statistics(r) => r,
                _ => TimeRange::default(),
            });
            Input::Switch(View::Statistics(range))
        }
        (Some("3"), _) => Input::Switch(View::Logs),
        (Some("4"), _) => Input::Switch(View::System),
        (Some("bg"), Some(name)) => match Background::parse(name) {
            Some(bg) => Input::Background(bg),
            None => Input::Unknown(line.to_string()),
        },
        (Some("brightness"), Some(value)) => match value.parse() {
            Ok(v) => Input::Brightness(v),
            Err(_) => Input::Unknown(line.to_string()),
        },
        _ => Input::Unknown(line.to_string()),
    }
}

async fn watch(
    config: Config,
    api: ApiClient,
    view: View,
    mut prefs: PreferenceStore,
    plain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let history = ResourceHistory::new(
        config.resource_history_slots,
        chrono::Duration::milliseconds(config.resource_min_spacing_ms as i64),
    );
    let store = Store::with_history(history);
    let mut nav = Navigator::new(api, store.clone(), config.clone(), view);

    let theme_for = |prefs: &PreferenceStore| {
        if plain {
            Theme::plain()
        } else {
            Theme::from_preferences(&prefs.get())
        }
    };
    let mut theme = theme_for(&prefs);
    let mut pref_events = prefs.subscribe();
    let mut screen = nav.current().select(&store);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut notice: Option<String> = None;
    // Redraws once a second so the flash marker fades, and picks up
    // preferences written by repeater-monitor-settings.
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        draw(&nav, &store, &theme, &config, notice.as_deref());

        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = screen.changed() => {
                if changed.is_none() {
                    break;
                }
            }
            _ = redraw.tick() => {
                if let Err(e) = prefs.reload() {
                    log::warn!("Could not reload preferences: {e}");
                }
            }
            event = pref_events.recv() => match event {
                Ok(event) => {
                    log::debug!("Preference changed: {event:?}");
                    theme = theme_for(&prefs);
                }
                Err(RecvError::Lagged(_)) => theme = theme_for(&prefs),
                Err(RecvError::Closed) => {}
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_input(&line, nav.current()) {
                    Input::Quit => break,
                    Input::Switch(view) => {
                        nav.switch(view);
                        screen = nav.current().select(&store);
                        notice = None;
                    }
                    Input::Background(bg) => prefs.set_background(bg)?,
                    Input::Brightness(value) => prefs.set_brightness(value)?,
                    Input::Unknown(cmd) if cmd.trim().is_empty() => {}
                    Input::Unknown(cmd) => notice = Some(format!("unknown command: {cmd}")),
                },
                None => stdin_open = false,
            },
        }
    }

    nav.shutdown().await;
    Ok(())
}

fn draw(nav: &Navigator, store: &Store, theme: &Theme, config: &Config, notice: Option<&str>) {
    let view = nav.current();
    let primary = match view {
        View::Dashboard | View::System => Slice::Stats,
        View::Statistics(_) => Slice::Bucketed,
        View::Logs => Slice::Logs,
    };
    let screen = store.read(|state| {
        let mut out = String::from("\x1b[2J\x1b[H");
        out.push_str(&format!(
            "{}  {}  {}\n",
            view.title(),
            render::last_updated(theme, state, primary),
            render::flash_marker(theme, state.flash.as_ref(), 2),
        ));
        out.push_str("[1] dashboard  [2 <range>] statistics  [3] logs  [4] system  [bg <name>] [brightness <n>]  [q] quit\n\n");
        if let Some(banner) = render::error_banner(theme, state) {
            out.push_str(&banner);
            out.push('\n');
        }
        out.push_str(&view.render(state, theme, config));
        out
    });

    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(screen.as_bytes());
    if let Some(notice) = notice {
        let _ = writeln!(stdout, "\n{notice}");
    }
    let _ = stdout.flush();
}
