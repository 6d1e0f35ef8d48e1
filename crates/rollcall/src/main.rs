use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall::{Config, Session, TimestampMode};
use rollcall_core::{Gallery, OnnxAnalyzer, ReferenceImage};
use rollcall_hw::{Camera, Headless, Surface, Window};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const WINDOW_TITLE: &str = "Attendance System";

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Webcam attendance register backed by face recognition")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera and record attendance (default)
    Run(RunArgs),
    /// Enroll the reference photos and print a summary, without a camera
    Check(SourceArgs),
    /// List video capture devices
    Devices,
}

#[derive(Args, Default)]
struct SourceArgs {
    /// TOML file listing people and their reference photos
    #[arg(long)]
    roster: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[derive(Args, Default)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Camera index (/dev/videoN)
    #[arg(short, long)]
    camera: Option<usize>,
    /// Directory for the YYYY-MM-DD.csv register
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Maximum distance to the nearest known face
    #[arg(long)]
    threshold: Option<f32>,
    /// Tolerance of the per-identity match test
    #[arg(long)]
    tolerance: Option<f32>,
    /// Downscale factor applied before detection
    #[arg(long)]
    scale: Option<f32>,
    /// Time written for each person
    #[arg(long, value_enum)]
    timestamp_mode: Option<TimestampMode>,
    /// Key that ends the session
    #[arg(long)]
    quit_key: Option<char>,
    /// Run without a preview window
    #[arg(long)]
    headless: bool,
    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

impl SourceArgs {
    fn apply(self, config: &mut Config) {
        if let Some(roster) = self.roster {
            config.roster_path = Some(roster);
        }
        if let Some(dir) = self.model_dir {
            config.model_dir = dir;
        }
    }
}

impl RunArgs {
    fn apply(self, config: &mut Config) {
        self.source.apply(config);
        if let Some(v) = self.camera {
            config.camera_index = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = self.threshold {
            config.threshold = v;
        }
        if let Some(v) = self.tolerance {
            config.tolerance = v;
        }
        if let Some(v) = self.scale {
            config.scale = v;
        }
        if let Some(v) = self.timestamp_mode {
            config.timestamp_mode = v;
        }
        if let Some(v) = self.quit_key {
            config.quit_key = v;
        }
        if let Some(v) = self.max_frames {
            config.max_frames = Some(v);
        }
        config.headless |= self.headless;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            args.apply(&mut config);
            run(&config)
        }
        Commands::Check(args) => {
            args.apply(&mut config);
            check(&config)
        }
        Commands::Devices => {
            devices();
            Ok(())
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let settings = config.session_settings()?;
    let references = config.references()?;
    let analyzer = OnnxAnalyzer::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let camera = Camera::open_index(config.camera_index)
        .with_context(|| format!("opening camera {}", config.camera_index))?;

    if config.headless {
        tracing::info!("running headless");
        attend_with(settings, &references, camera, Headless, analyzer)
    } else {
        let window = Window::open(WINDOW_TITLE, camera.width, camera.height)?;
        println!("Press '{}' in the preview window to finish.", config.quit_key);
        attend_with(settings, &references, camera, window, analyzer)
    }
}

fn attend_with<D: Surface>(
    settings: rollcall::SessionSettings,
    references: &[ReferenceImage],
    camera: Camera,
    display: D,
    analyzer: OnnxAnalyzer,
) -> Result<()> {
    let session = Session::open(settings, references, camera, display, analyzer)?;
    let (summary, register) = session.run_and_close()?;

    println!(
        "{} present, {} absent, register written to {}",
        summary.records_written,
        summary.pending.len(),
        register.display()
    );
    if !summary.pending.is_empty() {
        println!("Absent: {}", summary.pending.join(", "));
    }
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let references = config.references()?;
    let mut analyzer = OnnxAnalyzer::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let gallery = Gallery::enroll(&references, &mut analyzer)?;

    let identities: Vec<_> = references
        .iter()
        .zip(gallery.identities())
        .map(|(reference, known)| {
            serde_json::json!({
                "name": known.name,
                "image": reference.path.display().to_string(),
                "embedding_dim": known.embedding.dim(),
            })
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "model_dir": config.model_dir.display().to_string(),
            "identities": identities,
        }))?
    );
    Ok(())
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}
