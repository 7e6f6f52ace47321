//! Relay outputs for the flush actuator
//!
//! Two backends:
//! - `GpioRelay` writes `1`/`0` into sysfs GPIO value files (relay pin plus an
//!   optional indicator LED that mirrors it)
//! - `SimulatedRelay` only logs, for benches without hardware

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ActuatorConfig;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to drive GPIO {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A physical (or simulated) output that can be asserted and deasserted
pub trait RelayOutput: Send {
    fn set_active(&mut self, active: bool) -> Result<(), RelayError>;
}

impl<T: RelayOutput + ?Sized> RelayOutput for Box<T> {
    fn set_active(&mut self, active: bool) -> Result<(), RelayError> {
        (**self).set_active(active)
    }
}

/// Relay driven through `/sys/class/gpio/gpioN/value` style files
pub struct GpioRelay {
    relay: PathBuf,
    indicator: Option<PathBuf>,
}

impl GpioRelay {
    pub fn new(relay: PathBuf, indicator: Option<PathBuf>) -> Self {
        Self { relay, indicator }
    }

    fn write_level(path: &Path, active: bool) -> Result<(), RelayError> {
        let level = if active { "1" } else { "0" };
        std::fs::write(path, level).map_err(|source| RelayError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl RelayOutput for GpioRelay {
    fn set_active(&mut self, active: bool) -> Result<(), RelayError> {
        Self::write_level(&self.relay, active)?;
        // The indicator is cosmetic; the relay level is what matters.
        if let Some(indicator) = &self.indicator {
            if let Err(e) = Self::write_level(indicator, active) {
                debug!("Indicator output failed: {}", e);
            }
        }
        Ok(())
    }
}

/// Logs transitions instead of touching hardware
#[derive(Debug, Default)]
pub struct SimulatedRelay {
    level: bool,
}

impl SimulatedRelay {
    pub fn level(&self) -> bool {
        self.level
    }
}

impl RelayOutput for SimulatedRelay {
    fn set_active(&mut self, active: bool) -> Result<(), RelayError> {
        self.level = active;
        info!("Simulated relay {}", if active { "ON" } else { "OFF" });
        Ok(())
    }
}

/// Pick the backend from configuration: GPIO when a relay pin is configured
pub fn from_config(actuator: &ActuatorConfig) -> Box<dyn RelayOutput> {
    match &actuator.relay_gpio {
        Some(relay) => {
            info!("Using GPIO relay at {}", relay.display());
            Box::new(GpioRelay::new(relay.clone(), actuator.indicator_gpio.clone()))
        }
        None => {
            info!("No relay GPIO configured, using simulated relay");
            Box::new(SimulatedRelay::default())
        }
    }
}
