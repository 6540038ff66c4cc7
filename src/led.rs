//! Status blink patterns.
//!
//! Hosts flash these to signal lifecycle events (startup, wake, join)
//! without a serial console attached.

use embedded_hal::blocking::delay::DelayMs;

use crate::hal::StatusLed;

const PULSE_ON_MS: u16 = 20;
const PULSE_GAP_MS: u16 = 100;
const GROUP_GAP_MS: u16 = 500;

/// Flash `pulses` short blinks, repeated `repetitions` times with a pause
/// between groups. No trailing pause after the final group.
pub fn blink<D: DelayMs<u16>>(led: &mut dyn StatusLed, delay: &mut D, pulses: u8, repetitions: u8) {
    for repetition in 0..repetitions {
        for _ in 0..pulses {
            led.set(true);
            delay.delay_ms(PULSE_ON_MS);
            led.set(false);
            delay.delay_ms(PULSE_GAP_MS);
        }
        if repetition + 1 < repetitions {
            delay.delay_ms(GROUP_GAP_MS);
        }
    }
}

/// Double-pulse heartbeat, repeated `repetitions` times.
pub fn double_blink<D: DelayMs<u16>>(led: &mut dyn StatusLed, delay: &mut D, repetitions: u8) {
    blink(led, delay, 2, repetitions);
}
