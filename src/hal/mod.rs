//! Hardware abstraction seams.
//!
//! The core never touches registers. Platform code implements these traits
//! over the real peripherals (or over simulated ones on a host) and hands
//! them to the monitor, sequencer and orchestrator.

use ufmt::derive::uDebug;

/// Supplies an instantaneous supply-voltage reading on demand.
pub trait VoltageSource {
    type Error;

    /// Current supply voltage in millivolts.
    ///
    /// `WouldBlock` means no reading is available this cycle; callers skip
    /// their report rather than reuse a stale value.
    fn read_supply_millivolts(&mut self) -> nb::Result<f32, Self::Error>;
}

/// One shut-down-able hardware subsystem.
pub trait PeripheralGuard {
    /// Begin bringing the peripheral to its lowest-power state.
    ///
    /// Calling this on an already-quiesced peripheral is a no-op, never an
    /// error.
    fn quiesce(&mut self);

    /// Whether the hardware has confirmed the peripheral is off.
    fn is_quiesced(&self) -> bool;
}

/// Analog input pins usable as a comparator wake source.
#[derive(uDebug, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AnalogPin {
    Ain0 = 0,
    Ain1 = 1,
    Ain2 = 2,
    Ain3 = 3,
    Ain4 = 4,
    Ain5 = 5,
    Ain6 = 6,
    Ain7 = 7,
}

/// Single hardware operation in the comparator bring-up/teardown sequence.
#[derive(uDebug, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeStep {
    /// Route the monitored pin to the comparator.
    SelectPin(AnalogPin),
    /// Reference level = half of the supply voltage.
    ReferenceHalfSupply,
    /// Generate events on voltage crossings of the selected pin.
    DetectCross(AnalogPin),
    /// Unmask the wake interrupt.
    EnableInterrupt,
    /// Mask the wake interrupt.
    DisableInterrupt,
    /// Power the comparator block.
    Enable,
    /// Power the comparator block down.
    Disable,
    /// Start monitoring.
    Start,
}

/// Low-power comparator that can wake the node on a voltage crossing
/// without keeping the main clock running.
pub trait WakeComparator {
    /// Issue one operation. Must not block; confirmation is polled
    /// separately through [`confirmed`](WakeComparator::confirmed).
    fn apply(&mut self, step: WakeStep);

    /// Whether the hardware has confirmed the given operation.
    fn confirmed(&self, step: WakeStep) -> bool;

    /// Whether the comparator is enabled and ready.
    fn is_active(&self) -> bool;
}

/// Host sleep primitive. A duration of zero means "sleep forever".
pub trait SleepControl {
    fn sleep(&mut self, duration_ms: u32);
}

/// Board status LED.
pub trait StatusLed {
    fn set(&mut self, on: bool);
}
