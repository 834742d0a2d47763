//! Collaborator traits implemented by the embedding host.
//!
//! The orchestrator never talks to a transport directly; the host hands it
//! a sensor reader and a device actuator at construction time. Tests use
//! in-memory mocks, a real deployment typically bridges to a home
//! automation bus or a Modbus gateway.

use super::status::StatusSnapshot;
use super::types::{DeviceReading, HvacMode};
use crate::error::CommandError;
use async_trait::async_trait;

/// Read-only access to sensors and device state.
#[async_trait]
pub trait SensorReader: Send + Sync {
    /// Current value of a numeric sensor, `None` when absent or not a
    /// number. Unit conversion is the orchestrator's job.
    async fn read_numeric(&self, sensor_id: &str) -> Option<f64>;

    /// Observed state of a climate entity, `None` when the entity is
    /// unknown or unavailable.
    async fn read_device(&self, entity: &str) -> Option<DeviceReading>;
}

/// Outbound command path to the heat pumps.
///
/// Implementations only need to deliver the command; pacing, idempotence
/// checks and the command timeout are enforced by the caller.
#[async_trait]
pub trait DeviceActuator: Send + Sync {
    async fn set_mode(&self, entity: &str, mode: HvacMode) -> Result<(), CommandError>;

    async fn set_temperature(&self, entity: &str, value: f64) -> Result<(), CommandError>;
}

/// Receives the status snapshot once per pass, fire and forget.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, snapshot: &StatusSnapshot);
}
