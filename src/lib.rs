//! # Hestia - Heat Pump Coordination Controller
//!
//! A control core for homes where several air-to-water heat pumps share one
//! hydronic loop: a primary pump carries the base load while assist pumps
//! are switched in and out based on how fast the house is actually warming
//! up.
//!
//! ## Features
//!
//! - **Trend Estimation**: outlier-robust temperature slope over a rolling
//!   window, driving time-to-target estimates
//! - **Assist Hysteresis**: condition timers plus minimum on/off dwell
//!   protection against short-cycling
//! - **Power Steering**: surplus-power budgets allocated by priority and
//!   tracked with per-device setpoint nudging
//! - **Presets**: boost, away, minimal-support and solar operating modes
//! - **Host Agnostic**: sensors and actuators behind async traits, so the
//!   same core runs against any automation bus
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `trend`: Rolling-window temperature derivative estimation
//! - `setpoint`: Setpoint band clamping and time-to-target estimation
//! - `conditions`: Assist trigger predicate tables
//! - `assist`: Assist timer state machine with anti-short-cycle gates
//! - `power`: Power budget allocation and power-tracking setpoints
//! - `resolver`: Per-device operating mode resolution
//! - `orchestrator`: Pass loop, command channel and status publishing
//! - `persistence`: Timer state persistence and recovery

pub mod assist;
pub mod conditions;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod persistence;
pub mod power;
pub mod resolver;
pub mod setpoint;
pub mod trend;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use error::{HestiaError, Result};
pub use orchestrator::Orchestrator;
pub use orchestrator::types::{HvacMode, OrchestratorCommand};
pub use resolver::SystemPreset;
