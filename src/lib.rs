//! Power-lifecycle core for a battery-powered wireless sensor node.
//!
//! Decides, from a noisy and slowly declining supply voltage, when to
//! report battery state and when to halt the node for good to protect the
//! battery chemistry, and sequences peripheral shutdown so every sleep
//! transition is entered cleanly.
//!
//! Platform code implements the [`hal`] traits over its registers; the
//! host loop then drives [`battery::BatteryMonitor::update`] once per
//! cycle and ends the cycle through
//! [`sleep::SleepOrchestrator::end_cycle`], which quiesces the
//! peripherals and issues either a timed or a permanent sleep request.

#![cfg_attr(not(test), no_std)]

pub mod battery;
pub mod config;
pub mod hal;
pub mod led;
pub mod power;
pub mod sleep;

pub use battery::{BatteryMonitor, BatteryProfile, Report};
pub use config::{ConfigError, NodeConfig};
pub use power::{ConfirmTimeout, PowerSequencer, SleepPeripherals, Subsystem};
pub use sleep::{NodeState, SleepOrchestrator, WakeFlag, SLEEP_FOREVER};
