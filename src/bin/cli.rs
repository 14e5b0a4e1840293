use anyhow::{anyhow, bail, Context, Result};
use dualpov::config::DualPovConfig;
use dualpov::persistence::VideoStore;
use dualpov::pipeline::PipelineDeps;
use dualpov::testing::{simulated_deps, SimulatedBackend};
use dualpov::{CameraPosition, DualCameraPipeline, RecordingPreset};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: dualpov-cli <command> [args]

Commands:
  simulate [--preset short|long] [--seconds <n>] [--fail front|back] [--encode] [--store <dir>] [--json]
  library [--store <dir>] [--json]
  config [--json]";

#[tokio::main]
async fn main() -> Result<()> {
    dualpov::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let config = DualPovConfig::load_layered(DualPovConfig::default_path())
        .context("loading dualpov.toml")?;

    let command = &args[1];
    match command.as_str() {
        "simulate" => cmd_simulate(config, &args[2..]).await,
        "library" => cmd_library(config, &args[2..]),
        "config" => cmd_config(config, &args[2..]),
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Default)]
struct SimulateArgs {
    preset: RecordingPreset,
    seconds: Option<u64>,
    fail: Option<CameraPosition>,
    encode: bool,
    store: Option<PathBuf>,
    json: bool,
}

fn parse_simulate_args(args: &[String]) -> Result<SimulateArgs> {
    let mut parsed = SimulateArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--preset needs a value"))?;
                parsed.preset = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "--seconds" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--seconds needs a value"))?;
                parsed.seconds = Some(value.parse().context("--seconds must be a whole number")?);
            }
            "--fail" => {
                i += 1;
                parsed.fail = match args.get(i).map(String::as_str) {
                    Some("front") => Some(CameraPosition::Front),
                    Some("back") => Some(CameraPosition::Back),
                    other => bail!("--fail expects front or back, got {:?}", other),
                };
            }
            "--store" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--store needs a directory"))?;
                parsed.store = Some(PathBuf::from(value));
            }
            "--encode" => parsed.encode = true,
            "--json" => parsed.json = true,
            other => bail!("Unknown simulate argument: {}", other),
        }
        i += 1;
    }
    if parsed.encode && parsed.fail.is_some() {
        bail!("--fail only applies to placeholder outputs, not --encode");
    }
    Ok(parsed)
}

/// Hardware to simulate with: placeholder files, or real MP4s from synthetic frames
enum SimulatedHardware {
    Placeholder(Arc<SimulatedBackend>),
    #[cfg(feature = "recording")]
    Encoded(dualpov::recording::EncoderSettings),
}

impl SimulatedHardware {
    fn new(encode: bool) -> Result<Self> {
        if !encode {
            return Ok(Self::Placeholder(Arc::new(SimulatedBackend::new())));
        }
        #[cfg(feature = "recording")]
        {
            use dualpov::recording::{EncoderQuality, EncoderSettings};
            let settings = EncoderSettings::from_quality(EncoderQuality::Low).with_title("DualPOV simulation");
            Ok(Self::Encoded(settings))
        }
        #[cfg(not(feature = "recording"))]
        {
            bail!("--encode requires building with the `recording` feature");
        }
    }

    /// Placeholder hardware exports composition plans; encoded hardware
    /// renders the composed movie from the recorded files
    fn deps(&self, store: Option<Arc<VideoStore>>) -> PipelineDeps {
        match self {
            Self::Placeholder(backend) => simulated_deps(backend.clone(), store),
            #[cfg(feature = "recording")]
            Self::Encoded(settings) => dualpov::testing::encoded_deps(settings.clone(), store),
        }
    }

    fn fail_output(&self, position: CameraPosition) -> Result<()> {
        match self {
            Self::Placeholder(backend) => {
                let output = backend
                    .output(position)
                    .ok_or_else(|| anyhow!("no {} output after setup", position))?;
                output.fail_next_recording("simulated write failure");
                Ok(())
            }
            #[cfg(feature = "recording")]
            Self::Encoded(_) => bail!("cannot inject failures into encoded outputs"),
        }
    }
}

async fn cmd_simulate(mut config: DualPovConfig, args: &[String]) -> Result<()> {
    let opts = parse_simulate_args(args)?;
    if let Some(store) = &opts.store {
        config.storage.store_directory = store.clone();
    }

    let store = VideoStore::open(&config.storage.store_directory, config.storage.thumbnail_width)
        .with_context(|| format!("opening video store at {:?}", config.storage.store_directory))?;
    let store = Arc::new(store);

    let hardware = SimulatedHardware::new(opts.encode)?;
    let pipeline = Arc::new(DualCameraPipeline::new(
        config,
        hardware.deps(Some(store.clone())),
    ));

    let devices = pipeline.prepare().await.context("preparing simulated capture")?;
    println!("Front: {} | Back: {} | Mic: {}", devices.front.name, devices.back.name, devices.audio.name);

    if let Some(position) = opts.fail {
        hardware.fail_output(position)?;
        println!("Injected a {} output failure", position);
    }

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl-C handler")?;

    pipeline.set_preset(opts.preset);
    match opts.seconds {
        Some(seconds) => pipeline.start_recording_for(Duration::from_secs(seconds)).await?,
        None => pipeline.start_recording().await?,
    }
    println!("Recording... (Ctrl-C stops early)");

    tokio::select! {
        _ = pipeline.wait_for_idle() => {}
        _ = stop_rx.recv() => {
            println!("Stopping early");
            pipeline.stop_recording().await?;
            pipeline.wait_for_idle().await;
        }
    }

    let status = pipeline.status();
    pipeline.shutdown().await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let recording = &status.recording;
    if let Some(error) = &recording.error {
        println!("Recording error: {}", error);
    }
    match (&recording.last_asset, store.list().first()) {
        (Some(asset), Some(entry)) => {
            println!("Final asset: {}", asset.display());
            println!(
                "Stored as {} ({:?}, {:.2}s)",
                store.file_path(entry).display(),
                entry.source,
                entry.duration_secs
            );
        }
        (Some(asset), None) => println!("Final asset: {} (not stored)", asset.display()),
        (None, _) => bail!("recording produced no asset"),
    }
    Ok(())
}

fn cmd_library(mut config: DualPovConfig, args: &[String]) -> Result<()> {
    if let Some(i) = args.iter().position(|a| a == "--store") {
        let dir = args.get(i + 1).ok_or_else(|| anyhow!("--store needs a directory"))?;
        config.storage.store_directory = PathBuf::from(dir);
    }

    let store = VideoStore::open(&config.storage.store_directory, config.storage.thumbnail_width)?;
    let entries = store.list();

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No stored videos in {}", store.root().display());
    } else {
        for entry in entries {
            println!(
                "{}  {}  {:>6.2}s  {:?}  {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.id,
                entry.duration_secs,
                entry.source,
                entry.file
            );
        }
    }
    Ok(())
}

fn cmd_config(config: DualPovConfig, args: &[String]) -> Result<()> {
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
