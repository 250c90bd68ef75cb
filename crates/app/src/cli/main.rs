//! eqchain CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use eqchain_core::domain::config::{ConfigManager, EqConfig, PresetManager};
use eqchain_core::domain::dsp::Equalizer;
use eqchain_core::domain::params::{ControlParameters, ParameterId};
use eqchain_core::domain::response::bin_frequency;
use eqchain_infra::measure::{impulse_response, measure_gain_db};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eqchain")]
#[command(about = "Low cut, peak and high cut filter chain", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the frequency response of the configured chain
    Curve {
        /// Number of log-spaced bins (defaults to the configured width)
        #[arg(long)]
        width: Option<usize>,

        /// Config file (defaults to the user config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Drive sine tones through the engine and compare with the computed response
    Measure {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Frequencies to measure in Hz
        #[arg(long = "freq", num_args = 1..)]
        freqs: Vec<f64>,
    },

    /// Print the left-channel impulse response
    Impulse {
        #[arg(long, default_value_t = 32)]
        samples: usize,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage parameter presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,

        /// Preset directory (defaults to the user preset directory)
        #[arg(long, global = true)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// List saved presets
    List,

    /// Save the parameters of a config file as a preset
    Save {
        name: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a preset
    Show {
        name: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a preset
    Delete { name: String },
}

#[derive(Serialize)]
struct CurvePoint {
    freq_hz: f64,
    gain_db: f64,
}

const DEFAULT_MEASURE_FREQS: [f64; 6] = [30.0, 100.0, 750.0, 1000.0, 5000.0, 15000.0];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Curve {
            width,
            config,
            json,
        } => {
            let config = load_config(config.as_deref()).await?;
            let width = width.unwrap_or(config.engine.response_width as usize);
            print_curve(&config, width, json)
        }
        Command::Measure { config, freqs } => {
            let config = load_config(config.as_deref()).await?;
            let freqs = if freqs.is_empty() {
                DEFAULT_MEASURE_FREQS.to_vec()
            } else {
                freqs
            };
            print_measurements(&config, &freqs)
        }
        Command::Impulse { samples, config } => {
            let config = load_config(config.as_deref()).await?;
            let mut eq = build_equalizer(&config)?;
            for (i, sample) in impulse_response(&mut eq, samples)?.iter().enumerate() {
                println!("{i:>6} {sample:>+.9}");
            }
            Ok(())
        }
        Command::Preset { action, dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => ConfigManager::new(ConfigManager::default_config_dir()?).preset_dir(),
            };
            run_preset(action, PresetManager::new(dir)).await
        }
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<EqConfig> {
    match path {
        Some(path) => EqConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let manager = ConfigManager::new(ConfigManager::default_config_dir()?);
            Ok(manager.load().await)
        }
    }
}

fn build_equalizer(config: &EqConfig) -> anyhow::Result<Equalizer> {
    let spec = config.engine.process_spec()?;
    debug!(sample_rate = spec.sample_rate, block = spec.max_block_size, "Building equalizer");
    let mut eq = Equalizer::new();
    eq.prepare(spec.sample_rate, spec.max_block_size)?;
    eq.update_from_parameters(&config.parameters);
    Ok(eq)
}

fn print_curve(config: &EqConfig, width: usize, json: bool) -> anyhow::Result<()> {
    let eq = build_equalizer(config)?;
    let sample_rate = f64::from(config.engine.sample_rate);
    let points: Vec<CurvePoint> = eq
        .response_curve(width, sample_rate)
        .into_iter()
        .enumerate()
        .map(|(i, gain_db)| CurvePoint {
            freq_hz: bin_frequency(i, width),
            gain_db,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        println!("{:>10}  {:>9}", "Hz", "dB");
        for point in &points {
            println!("{:>10.1}  {:>+9.3}", point.freq_hz, point.gain_db);
        }
    }
    Ok(())
}

fn print_measurements(config: &EqConfig, freqs: &[f64]) -> anyhow::Result<()> {
    let mut eq = build_equalizer(config)?;

    println!("{:>10}  {:>10}  {:>10}", "Hz", "measured", "computed");
    for &freq in freqs {
        let measured = measure_gain_db(&mut eq, freq)
            .with_context(|| format!("measuring {freq} Hz"))?;
        let computed = eq.controller().snapshot().magnitude_db(freq);
        println!("{freq:>10.1}  {measured:>+10.3}  {computed:>+10.3}");
    }
    Ok(())
}

fn print_parameters(params: &ControlParameters) {
    for id in ParameterId::ALL {
        println!("{:<14} {:>12}", id.name(), id.format_value(params.get(id)));
    }
}

async fn run_preset(action: PresetAction, manager: PresetManager) -> anyhow::Result<()> {
    match action {
        PresetAction::List => {
            for name in manager.list_presets().await? {
                println!("{name}");
            }
        }
        PresetAction::Save { name, config } => {
            let config = load_config(config.as_deref()).await?;
            manager.save_preset(&name, &config.parameters).await?;
            info!(preset = %name, "Preset saved");
            println!("Saved preset '{name}' to {}", manager.preset_dir().display());
        }
        PresetAction::Show { name, json } => {
            let params = manager.load_preset(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&params)?);
            } else {
                print_parameters(&params);
            }
        }
        PresetAction::Delete { name } => {
            manager.delete_preset(&name).await?;
            println!("Deleted preset '{name}'");
        }
    }
    Ok(())
}
