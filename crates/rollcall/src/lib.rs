//! rollcall: Webcam attendance register.
//!
//! Enrolls a fixed set of people from reference photos, watches a camera,
//! and writes the first time each person is recognised to a CSV file named
//! after the day.

pub mod config;
pub mod ledger;
pub mod session;

pub use config::{Config, ConfigError};
pub use ledger::{AttendanceLedger, LedgerError};
pub use session::{
    Clock, RunSummary, Session, SessionError, SessionSettings, StopReason, TimestampMode,
};
