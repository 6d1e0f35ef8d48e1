use crate::session::{SessionSettings, TimestampMode};
use rollcall_core::gallery::resolve_path;
use rollcall_core::ReferenceImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Reference photos used when no roster file is given.
const BUILTIN_ROSTER: [(&str, &str); 4] = [
    ("MonaLisa", "photos/monalisa.jpg"),
    ("Sachin", "photos/sachin.jpg"),
    ("Ratan Tata", "photos/tata.jpg"),
    ("Tesla", "photos/tesla.jpeg"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read roster file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid roster file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capture device index, `/dev/video{N}` (default: 0).
    pub camera_index: usize,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Optional TOML file listing known people and their photos.
    pub roster_path: Option<PathBuf>,
    /// Directory the daily CSV register is written to.
    pub output_dir: PathBuf,
    /// Maximum distance to the nearest known face.
    pub threshold: f32,
    /// Tolerance of the per-identity match test.
    pub tolerance: f32,
    /// Downscale factor applied before detection.
    pub scale: f32,
    pub quit_key: char,
    /// How long each key poll waits.
    pub poll_interval_ms: u64,
    /// Consecutive failed reads before the run is aborted.
    pub max_read_failures: u32,
    pub timestamp_mode: TimestampMode,
    /// Run without a preview window.
    pub headless: bool,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = SessionSettings::default();

        Self {
            camera_index: env_parse("ROLLCALL_CAMERA_INDEX", 0),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| rollcall_core::default_model_dir()),
            roster_path: std::env::var("ROLLCALL_ROSTER").ok().map(PathBuf::from),
            output_dir: std::env::var("ROLLCALL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            threshold: env_parse("ROLLCALL_THRESHOLD", defaults.threshold),
            tolerance: env_parse("ROLLCALL_TOLERANCE", defaults.tolerance),
            scale: env_parse("ROLLCALL_SCALE", defaults.scale),
            quit_key: env_parse("ROLLCALL_QUIT_KEY", defaults.quit_key),
            poll_interval_ms: env_parse(
                "ROLLCALL_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            ),
            max_read_failures: env_parse("ROLLCALL_MAX_READ_FAILURES", defaults.max_read_failures),
            timestamp_mode: env_parse("ROLLCALL_TIMESTAMP_MODE", defaults.timestamp_mode),
            headless: std::env::var("ROLLCALL_HEADLESS")
                .map(|v| v != "0")
                .unwrap_or(false),
            max_frames: std::env::var("ROLLCALL_MAX_FRAMES")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Settings for the attendance loop.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let settings = SessionSettings {
            output_dir: self.output_dir.clone(),
            threshold: self.threshold,
            tolerance: self.tolerance,
            scale: self.scale,
            quit_key: self.quit_key,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_read_failures: self.max_read_failures,
            timestamp_mode: self.timestamp_mode,
            max_frames: self.max_frames,
        };
        settings.validate().map_err(ConfigError::Invalid)?;
        Ok(settings)
    }

    /// Reference photos from the roster file, or the built-in list.
    pub fn references(&self) -> Result<Vec<ReferenceImage>, ConfigError> {
        match &self.roster_path {
            Some(path) => load_roster_file(path),
            None => Ok(BUILTIN_ROSTER
                .iter()
                .map(|(name, image)| ReferenceImage::new(*name, *image))
                .collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    person: Vec<PersonEntry>,
}

#[derive(Debug, Deserialize)]
struct PersonEntry {
    name: String,
    image: PathBuf,
}

/// Parse a roster TOML file. Image paths are relative to the file.
pub fn load_roster_file(path: &Path) -> Result<Vec<ReferenceImage>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_roster(&text, base).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_roster(text: &str, base: &Path) -> Result<Vec<ReferenceImage>, toml::de::Error> {
    let file: RosterFile = toml::from_str(text)?;
    Ok(file
        .person
        .into_iter()
        .map(|p| ReferenceImage::new(p.name, resolve_path(base, &p.image)))
        .collect())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
