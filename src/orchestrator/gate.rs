//! Pacing and idempotence for outbound device commands.
//!
//! Every command toward a heat pump goes through the gate, which drops
//! repeats the device already satisfies, enforces a per-device cooldown
//! between writes, and bounds each actuator call with a timeout. A failed
//! or timed-out command still starts the cooldown but does not update the
//! last-sent cache, so the next pass retries it.

use super::io::DeviceActuator;
use super::types::{CommandOutcome, HvacMode};
use crate::config::ControlConfig;
use crate::error::CommandError;
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Duration;

pub struct CommandGate {
    cooldown_seconds: f64,
    timeout_seconds: u64,
    epsilon_c: f64,

    /// Last setpoint successfully sent per entity
    last_target: HashMap<String, f64>,
    last_mode_sent: HashMap<String, DateTime<Utc>>,
    last_temp_sent: HashMap<String, DateTime<Utc>>,

    logger: StructuredLogger,
}

impl CommandGate {
    pub fn new(control: &ControlConfig) -> Self {
        Self {
            cooldown_seconds: control.command_cooldown_seconds as f64,
            timeout_seconds: control.command_timeout_seconds,
            epsilon_c: control.setpoint_epsilon_c,
            last_target: HashMap::new(),
            last_mode_sent: HashMap::new(),
            last_temp_sent: HashMap::new(),
            logger: get_logger("commands"),
        }
    }

    /// Setpoint last successfully sent to `entity`, if any.
    pub fn last_sent_target(&self, entity: &str) -> Option<f64> {
        self.last_target.get(entity).copied()
    }

    /// Switch `entity` to `mode` unless it is already there.
    ///
    /// `observed` is the running state from this pass's reading; matching
    /// it short-circuits without consuming the cooldown.
    pub async fn ensure_mode(
        &mut self,
        actuator: &dyn DeviceActuator,
        entity: &str,
        mode: HvacMode,
        observed: Option<HvacMode>,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        if observed == Some(mode) {
            return CommandOutcome::Unchanged;
        }
        if self.in_cooldown(&self.last_mode_sent, entity, now) {
            self.logger
                .debug(&format!("Mode command for {entity} suppressed by cooldown"));
            return CommandOutcome::Cooldown;
        }

        self.last_mode_sent.insert(entity.to_string(), now);
        match self.deliver(actuator.set_mode(entity, mode)).await {
            Ok(()) => {
                self.logger.debug(&format!("Set {entity} hvac mode to {mode:?}"));
                CommandOutcome::Sent
            }
            Err(e) => {
                self.logger
                    .error(&format!("Mode command for {entity} failed: {e}"));
                CommandOutcome::Failed(e.to_string())
            }
        }
    }

    /// Send setpoint `value` unless it is within epsilon of the last
    /// successfully sent one.
    pub async fn ensure_temperature(
        &mut self,
        actuator: &dyn DeviceActuator,
        entity: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        if let Some(last) = self.last_target.get(entity) {
            if (last - value).abs() < self.epsilon_c {
                return CommandOutcome::Unchanged;
            }
        }
        if self.in_cooldown(&self.last_temp_sent, entity, now) {
            self.logger.debug(&format!(
                "Setpoint command for {entity} suppressed by cooldown"
            ));
            return CommandOutcome::Cooldown;
        }

        self.last_temp_sent.insert(entity.to_string(), now);
        match self.deliver(actuator.set_temperature(entity, value)).await {
            Ok(()) => {
                self.last_target.insert(entity.to_string(), value);
                self.logger
                    .debug(&format!("Set {entity} setpoint to {value:.1}"));
                CommandOutcome::Sent
            }
            Err(e) => {
                self.logger
                    .error(&format!("Setpoint command for {entity} failed: {e}"));
                CommandOutcome::Failed(e.to_string())
            }
        }
    }

    fn in_cooldown(
        &self,
        sent: &HashMap<String, DateTime<Utc>>,
        entity: &str,
        now: DateTime<Utc>,
    ) -> bool {
        sent.get(entity).is_some_and(|last| {
            let elapsed = (now - *last).num_milliseconds() as f64 / 1000.0;
            elapsed >= 0.0 && elapsed < self.cooldown_seconds
        })
    }

    async fn deliver<F>(&self, call: F) -> Result<(), CommandError>
    where
        F: std::future::Future<Output = Result<(), CommandError>>,
    {
        match tokio::time::timeout(Duration::from_secs(self.timeout_seconds), call).await {
            Ok(result) => result,
            Err(_) => Err(CommandError::timeout(self.timeout_seconds)),
        }
    }
}
