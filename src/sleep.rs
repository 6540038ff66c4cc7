//! Sleep-entry decisions and the wake-interrupt flag.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayUs;
use ufmt::derive::uDebug;

use crate::battery::Report;
use crate::config::NodeConfig;
use crate::hal::SleepControl;
use crate::power::{ConfirmTimeout, PowerSequencer, SleepPeripherals};

/// Sleep duration denoting "never wake".
pub const SLEEP_FOREVER: u32 = 0;

/// Lifecycle state of the node.
#[derive(uDebug, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeState {
    /// Running the host loop.
    Active,
    /// Peripherals down, waiting out a timed sleep.
    SleepTimed,
    /// Halted to protect the battery. Terminal; only a hardware reset
    /// leaves this state.
    SleepPermanent,
}

/// Turns the monitor's critical signal into the final sleep request,
/// routing every sleep entry through the peripheral shutdown pass first.
pub struct SleepOrchestrator {
    state: NodeState,
    force_halt_on_critical: bool,
}

impl SleepOrchestrator {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: NodeState::Active,
            force_halt_on_critical: config.force_halt_on_critical,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Quiesce the peripherals and issue the sleep request that ends this
    /// host cycle.
    ///
    /// A critical report on a chemistry configured to halt requests
    /// [`SLEEP_FOREVER`]; so does every later cycle, since the permanent
    /// state has no exit. Anything else sleeps for `timed_ms` and returns
    /// the node to [`NodeState::Active`] on wake.
    pub fn end_cycle<D: DelayUs<u16>>(
        &mut self,
        report: Option<&Report>,
        timed_ms: u32,
        sequencer: &mut PowerSequencer<D>,
        peripherals: &mut SleepPeripherals<'_>,
        sleeper: &mut dyn SleepControl,
    ) -> Result<NodeState, ConfirmTimeout> {
        let halt = self.state == NodeState::SleepPermanent
            || (self.force_halt_on_critical && report.map_or(false, |r| r.critical));

        sequencer.prepare_for_sleep(peripherals)?;

        if halt {
            self.state = NodeState::SleepPermanent;
            sleeper.sleep(SLEEP_FOREVER);
        } else {
            self.state = NodeState::SleepTimed;
            sleeper.sleep(timed_ms);
            // A timed sleep hands control back here once the host wakes.
            self.state = NodeState::Active;
        }
        Ok(self.state)
    }
}

/// Set by the comparator interrupt, drained by the main loop.
///
/// The handler's only job is to record that a wake occurred; register work
/// stays in the main loop. Single interrupt writer and single main-loop
/// reader on a single core, so the atomic is the only synchronization
/// needed.
pub struct WakeFlag(AtomicBool);

impl WakeFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Interrupt context: record the wake. Never blocks.
    pub fn notify(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Main loop: read and clear.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for WakeFlag {
    fn default() -> Self {
        Self::new()
    }
}
