//! The attendance loop: open → run → close.

use crate::ledger::{AttendanceLedger, LedgerError};
use chrono::{Local, NaiveDateTime};
use rollcall_core::{
    attend, AnalyzerError, EuclideanMatcher, FaceAnalyzer, Gallery, GalleryError, ImageView,
    ReferenceImage, Roster,
};
use rollcall_hw::{CameraError, DisplayError, Frame, FrameError, FrameSource, Overlay, Surface};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("frame processing failed: {0}")]
    Frame(#[from] FrameError),
    #[error("display failed: {0}")]
    Display(#[from] DisplayError),
    #[error("camera failed {failures} times in a row: {source}")]
    Camera {
        failures: u32,
        #[source]
        source: CameraError,
    },
}

/// Which time of day goes into each register row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TimestampMode {
    /// Wall-clock time of the frame the person was recognised in.
    #[default]
    PerFrame,
    /// The time the session started, for every row.
    SessionStart,
}

impl FromStr for TimestampMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-frame" => Ok(Self::PerFrame),
            "session-start" => Ok(Self::SessionStart),
            other => Err(format!("unknown timestamp mode: {other}")),
        }
    }
}

/// Tunables for the attendance loop.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub output_dir: PathBuf,
    pub threshold: f32,
    pub tolerance: f32,
    pub scale: f32,
    pub quit_key: char,
    pub poll_interval: Duration,
    pub max_read_failures: u32,
    pub timestamp_mode: TimestampMode,
    pub max_frames: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            threshold: rollcall_core::types::DEFAULT_THRESHOLD,
            tolerance: rollcall_core::types::DEFAULT_TOLERANCE,
            scale: 0.25,
            quit_key: 'q',
            poll_interval: Duration::from_millis(1),
            max_read_failures: 30,
            timestamp_mode: TimestampMode::PerFrame,
            max_frames: None,
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(format!("scale must be in (0, 1], got {}", self.scale));
        }
        if !(self.threshold >= 0.0) || !(self.tolerance >= 0.0) {
            return Err(format!(
                "threshold and tolerance must be non-negative, got {} and {}",
                self.threshold, self.tolerance
            ));
        }
        if self.max_read_failures == 0 {
            return Err("max_read_failures must be at least 1".into());
        }
        Ok(())
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuitKey,
    WindowClosed,
    FrameLimit,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop: StopReason,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub records_written: usize,
    pub pending: Vec<String>,
}

/// Source of local date and time for a session.
pub type Clock = Box<dyn FnMut() -> NaiveDateTime>;

/// One attendance run. Owns the camera, the display and the register for
/// its whole lifetime; each is released when the session is closed or
/// dropped.
pub struct Session<C: FrameSource, D: Surface, A: FaceAnalyzer> {
    settings: SessionSettings,
    camera: C,
    display: D,
    analyzer: A,
    gallery: Gallery,
    roster: Roster,
    matcher: EuclideanMatcher,
    ledger: AttendanceLedger,
    started: NaiveDateTime,
    clock: Clock,
    frames_processed: u64,
    frames_skipped: u64,
    consecutive_failures: u32,
}

impl<C: FrameSource, D: Surface, A: FaceAnalyzer> Session<C, D, A> {
    /// Enroll the reference photos and create today's register.
    pub fn open(
        settings: SessionSettings,
        references: &[ReferenceImage],
        camera: C,
        display: D,
        analyzer: A,
    ) -> Result<Self, SessionError> {
        Self::open_with_clock(
            settings,
            references,
            camera,
            display,
            analyzer,
            Box::new(|| Local::now().naive_local()),
        )
    }

    /// As [`open`](Self::open), reading the time from `clock`.
    pub fn open_with_clock(
        settings: SessionSettings,
        references: &[ReferenceImage],
        camera: C,
        display: D,
        mut analyzer: A,
        mut clock: Clock,
    ) -> Result<Self, SessionError> {
        settings.validate().map_err(SessionError::InvalidSettings)?;

        let gallery = Gallery::enroll(references, &mut analyzer)?;
        let roster = Roster::from_gallery(&gallery);
        let started = clock();
        let ledger = AttendanceLedger::create(&settings.output_dir, started.date())?;
        let matcher = EuclideanMatcher {
            threshold: settings.threshold,
            tolerance: settings.tolerance,
        };

        tracing::info!(
            identities = gallery.len(),
            register = %ledger.path().display(),
            threshold = matcher.threshold,
            tolerance = matcher.tolerance,
            "session opened"
        );

        Ok(Self {
            settings,
            camera,
            display,
            analyzer,
            gallery,
            roster,
            matcher,
            ledger,
            started,
            clock,
            frames_processed: 0,
            frames_skipped: 0,
            consecutive_failures: 0,
        })
    }

    /// Names not yet marked present.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn register_path(&self) -> &std::path::Path {
        self.ledger.path()
    }

    /// Loop until the quit key, a closed window or the frame limit.
    pub fn run(&mut self) -> Result<RunSummary, SessionError> {
        let stop = loop {
            if let Some(reason) = self.step()? {
                break reason;
            }
        };

        let summary = RunSummary {
            stop,
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            records_written: self.ledger.rows(),
            pending: self.roster.names().to_vec(),
        };
        tracing::info!(
            stop = ?summary.stop,
            frames = summary.frames_processed,
            skipped = summary.frames_skipped,
            present = summary.records_written,
            pending = ?summary.pending,
            "session stopped"
        );
        Ok(summary)
    }

    /// One iteration: read, process and show a frame, then poll for the
    /// quit key. Returns the stop reason once the loop should end.
    ///
    /// A failed read skips the frame; `max_read_failures` consecutive
    /// failures abort the run.
    pub fn step(&mut self) -> Result<Option<StopReason>, SessionError> {
        if let Some(limit) = self.settings.max_frames {
            if self.frames_processed >= limit {
                return Ok(Some(StopReason::FrameLimit));
            }
        }

        match self.camera.read_frame() {
            Ok(frame) => {
                self.consecutive_failures = 0;
                self.process_frame(frame)?;
            }
            Err(source) => {
                self.consecutive_failures += 1;
                self.frames_skipped += 1;
                tracing::warn!(
                    error = %source,
                    consecutive = self.consecutive_failures,
                    "frame read failed; skipping"
                );
                if self.consecutive_failures >= self.settings.max_read_failures {
                    return Err(SessionError::Camera {
                        failures: self.consecutive_failures,
                        source,
                    });
                }
            }
        }

        if !self.display.is_open() {
            return Ok(Some(StopReason::WindowClosed));
        }
        if self.display.poll_key(self.settings.poll_interval) == Some(self.settings.quit_key) {
            return Ok(Some(StopReason::QuitKey));
        }
        Ok(None)
    }

    /// Detect, match and record one frame, then show it.
    fn process_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        let small = frame.downscale(self.settings.scale)?.into_rgb();
        let view = ImageView::new(&small.data, small.width, small.height);
        let faces = self.analyzer.analyze(&view)?;
        self.frames_processed += 1;

        let at = match self.settings.timestamp_mode {
            TimestampMode::PerFrame => (self.clock)().time(),
            TimestampMode::SessionStart => self.started.time(),
        };

        let outcome = attend(&faces, &self.gallery, &self.matcher, &self.roster, at);
        self.roster = outcome.roster;

        if !outcome.records.is_empty() {
            self.ledger.append(&outcome.records)?;
            self.ledger.flush()?;
            for record in &outcome.records {
                tracing::info!(
                    name = %record.name,
                    time = %record.time_label(),
                    remaining = ?self.roster.names(),
                    "attendance recorded"
                );
            }
        }

        // Downscaling rounds each side, so map back with the real ratios.
        let sx = frame.width as f32 / small.width as f32;
        let sy = frame.height as f32 / small.height as f32;
        let overlays: Vec<Overlay> = faces
            .iter()
            .zip(&outcome.labels)
            .map(|(face, label)| {
                let b = face.bbox.scaled(sx, sy);
                Overlay {
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                    recognized: label.is_some(),
                }
            })
            .collect();

        self.display.show(&frame, &overlays)?;
        Ok(())
    }

    /// Release the camera, close the display and flush the register.
    pub fn close(self) -> Result<PathBuf, SessionError> {
        self.camera.release();
        self.display.close();
        let path = self.ledger.finish()?;
        tracing::info!(register = %path.display(), "session closed");
        Ok(path)
    }

    /// [`run`](Self::run) then [`close`](Self::close). The session is closed
    /// even when the run fails; a run error is reported ahead of a close
    /// error.
    pub fn run_and_close(mut self) -> Result<(RunSummary, PathBuf), SessionError> {
        let outcome = self.run();
        settle(outcome, self.close())
    }
}

fn settle(
    outcome: Result<RunSummary, SessionError>,
    closed: Result<PathBuf, SessionError>,
) -> Result<(RunSummary, PathBuf), SessionError> {
    match (outcome, closed) {
        (Ok(summary), Ok(path)) => Ok((summary, path)),
        (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(e),
        (Err(run), Err(close)) => {
            tracing::error!(error = %close, "closing the session failed after the run aborted");
            Err(run)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_mode_from_str() {
        assert_eq!("per-frame".parse::<TimestampMode>(), Ok(TimestampMode::PerFrame));
        assert_eq!(
            "session-start".parse::<TimestampMode>(),
            Ok(TimestampMode::SessionStart)
        );
        assert!("hourly".parse::<TimestampMode>().is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(SessionSettings::default().validate().is_ok());

        let bad_scale = SessionSettings {
            scale: 0.0,
            ..Default::default()
        };
        assert!(bad_scale.validate().is_err());

        let bad_threshold = SessionSettings {
            threshold: f32::NAN,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let no_retries = SessionSettings {
            max_read_failures: 0,
            ..Default::default()
        };
        assert!(no_retries.validate().is_err());
    }

    fn summary() -> RunSummary {
        RunSummary {
            stop: StopReason::QuitKey,
            frames_processed: 3,
            frames_skipped: 0,
            records_written: 1,
            pending: vec![],
        }
    }

    #[test]
    fn test_settle_prefers_run_error() {
        let result = settle(
            Err(SessionError::InvalidSettings("run".into())),
            Err(SessionError::InvalidSettings("close".into())),
        );
        assert!(matches!(result, Err(SessionError::InvalidSettings(m)) if m == "run"));
    }

    #[test]
    fn test_settle_reports_single_error() {
        let close_only = settle(
            Ok(summary()),
            Err(SessionError::InvalidSettings("close".into())),
        );
        assert!(matches!(close_only, Err(SessionError::InvalidSettings(m)) if m == "close"));

        let run_only = settle(
            Err(SessionError::InvalidSettings("run".into())),
            Ok(PathBuf::from("2024-05-17.csv")),
        );
        assert!(matches!(run_only, Err(SessionError::InvalidSettings(m)) if m == "run"));

        let (s, path) = settle(Ok(summary()), Ok(PathBuf::from("2024-05-17.csv"))).unwrap();
        assert_eq!(s.records_written, 1);
        assert_eq!(path, PathBuf::from("2024-05-17.csv"));
    }
}
