//! Ordered, idempotent peripheral shutdown ahead of sleep.
//!
//! Every sleep transition, timed or permanent, is preceded by one pass
//! over the peripheral guards. Each step is confirmed by the hardware
//! before the next is issued; an unconfirmed step is fatal, because an
//! unconfirmed peripheral may keep drawing current through the sleep.

use embedded_hal::blocking::delay::DelayUs;
use ufmt::derive::uDebug;

use crate::config::NodeConfig;
use crate::hal::{AnalogPin, PeripheralGuard, WakeComparator, WakeStep};

/// Hardware subsystems the sequencer drives, in shutdown order.
#[derive(uDebug, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Subsystem {
    HfClock,
    Radio,
    Serial,
    Adc,
    WakeComparator,
}

/// A peripheral failed to confirm a state change within the poll budget.
#[derive(uDebug, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfirmTimeout {
    pub subsystem: Subsystem,
    pub attempts: u32,
}

impl core::fmt::Display for ConfirmTimeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?} did not confirm within {} polls",
            self.subsystem, self.attempts
        )
    }
}

/// Guards for every subsystem quiesced ahead of a sleep transition.
pub struct SleepPeripherals<'a> {
    pub hf_clock: &'a mut dyn PeripheralGuard,
    pub radio: &'a mut dyn PeripheralGuard,
    pub serial: &'a mut dyn PeripheralGuard,
    /// `None` on boards without a controllable ADC.
    pub adc: Option<&'a mut dyn PeripheralGuard>,
}

/// Drives the pre-sleep shutdown pass and the wake-comparator sequences.
///
/// Stateless across invocations; idempotence comes from the guards
/// reporting an already-quiesced peripheral, which is skipped without a
/// single write.
pub struct PowerSequencer<D> {
    delay: D,
    max_attempts: u32,
    debug_active: bool,
}

impl<D: DelayUs<u16>> PowerSequencer<D> {
    pub fn new(delay: D, config: &NodeConfig) -> Self {
        Self {
            delay,
            max_attempts: config.confirm_attempts,
            debug_active: config.debug_active,
        }
    }

    /// Quiesce every peripheral, largest current drain first.
    ///
    /// Clock and radio are cut first, the serial transport next unless a
    /// human is on the wire, and the ADC last since the battery check may
    /// have just used it. Safe to call twice in a row; the second pass
    /// performs no writes.
    pub fn prepare_for_sleep(
        &mut self,
        peripherals: &mut SleepPeripherals<'_>,
    ) -> Result<(), ConfirmTimeout> {
        self.shut_down(Subsystem::HfClock, peripherals.hf_clock)?;
        self.shut_down(Subsystem::Radio, peripherals.radio)?;
        if !self.debug_active {
            self.shut_down(Subsystem::Serial, peripherals.serial)?;
        }
        if let Some(adc) = peripherals.adc.as_deref_mut() {
            self.shut_down(Subsystem::Adc, adc)?;
        }
        Ok(())
    }

    /// Configure `pin` to wake the node on a voltage crossing relative to
    /// half the supply voltage.
    ///
    /// Each hardware operation is confirmed before the next is issued.
    pub fn arm_wake_comparator(
        &mut self,
        comparator: &mut dyn WakeComparator,
        pin: AnalogPin,
    ) -> Result<(), ConfirmTimeout> {
        let sequence = [
            WakeStep::SelectPin(pin),
            WakeStep::ReferenceHalfSupply,
            WakeStep::DetectCross(pin),
            WakeStep::EnableInterrupt,
            WakeStep::Enable,
            WakeStep::Start,
        ];
        for step in sequence {
            self.comparator_step(comparator, step)?;
        }
        #[cfg(feature = "defmt")]
        defmt::trace!("wake comparator armed on {}", pin);
        Ok(())
    }

    /// Tear the wake comparator down entirely.
    ///
    /// No-op when the comparator is not active.
    pub fn disarm_wake_comparator(
        &mut self,
        comparator: &mut dyn WakeComparator,
    ) -> Result<(), ConfirmTimeout> {
        if !comparator.is_active() {
            return Ok(());
        }
        self.comparator_step(comparator, WakeStep::DisableInterrupt)?;
        self.comparator_step(comparator, WakeStep::Disable)
    }

    /// Mask the wake interrupt while a wake event is being handled;
    /// leaving it live would race the interrupt currently in flight.
    ///
    /// No-op when the comparator is not active.
    pub fn suspend_wake_source(
        &mut self,
        comparator: &mut dyn WakeComparator,
    ) -> Result<(), ConfirmTimeout> {
        if !comparator.is_active() {
            return Ok(());
        }
        self.comparator_step(comparator, WakeStep::DisableInterrupt)
    }

    /// Unmask the wake interrupt once the handler has run.
    pub fn resume_wake_source(
        &mut self,
        comparator: &mut dyn WakeComparator,
    ) -> Result<(), ConfirmTimeout> {
        self.comparator_step(comparator, WakeStep::EnableInterrupt)
    }

    fn shut_down(
        &mut self,
        subsystem: Subsystem,
        guard: &mut dyn PeripheralGuard,
    ) -> Result<(), ConfirmTimeout> {
        if guard.is_quiesced() {
            return Ok(());
        }
        guard.quiesce();
        self.confirm(subsystem, || guard.is_quiesced())
    }

    fn comparator_step(
        &mut self,
        comparator: &mut dyn WakeComparator,
        step: WakeStep,
    ) -> Result<(), ConfirmTimeout> {
        comparator.apply(step);
        self.confirm(Subsystem::WakeComparator, || comparator.confirmed(step))
    }

    /// Poll `confirmed` up to the configured budget, pausing 1 µs between
    /// polls. The hardware is expected to settle within microseconds;
    /// exhausting the budget is fatal.
    fn confirm(
        &mut self,
        subsystem: Subsystem,
        mut confirmed: impl FnMut() -> bool,
    ) -> Result<(), ConfirmTimeout> {
        for _ in 0..self.max_attempts {
            if confirmed() {
                return Ok(());
            }
            self.delay.delay_us(1);
        }
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "{} unconfirmed after {} polls",
            subsystem,
            self.max_attempts
        );
        Err(ConfirmTimeout {
            subsystem,
            attempts: self.max_attempts,
        })
    }
}
