//! Battery-threshold state machine.
//!
//! Two-level policy over a noisy, slowly declining supply voltage: above
//! the drained threshold, reports are rate limited to one per configured
//! interval; at or below it, a critical report always goes out and the
//! caller is expected to halt the node.

use crate::config::{ConfigError, NodeConfig};
use crate::hal::VoltageSource;

/// Immutable description of one battery chemistry.
///
/// The thresholds are per-cell supply voltages in millivolts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryProfile {
    /// Fully charged pack.
    pub high_mv: u16,
    /// Drained pack; readings at or below this are critical.
    pub low_mv: u16,
}

impl BatteryProfile {
    /// LiFePO4 pack: 3350 mV full, 3050 mV drained. The floor protects the
    /// chemistry as well as the attached sensors.
    pub const LIFEPO4: Self = Self {
        high_mv: 3350,
        low_mv: 3050,
    };

    /// CR2032-class coin cell: 3400 mV fresh, 1700 mV drained.
    pub const COIN_CELL: Self = Self {
        high_mv: 3400,
        low_mv: 1700,
    };

    /// Enforce `high > low > 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_mv <= self.low_mv || self.low_mv == 0 {
            return Err(ConfigError::InvalidProfile {
                high_mv: self.high_mv,
                low_mv: self.low_mv,
            });
        }
        Ok(())
    }

    /// Millivolts per percentage point.
    pub fn range(&self) -> f32 {
        f32::from(self.high_mv - self.low_mv) / 100.0
    }

    /// Charge percentage for a reading above the drained threshold.
    ///
    /// Floor, not round: telemetry values must match across node
    /// revisions bit for bit.
    fn percent(&self, mv: f32) -> u8 {
        let pct = ((mv - f32::from(self.low_mv)) / self.range()) as u8;
        pct.min(100)
    }
}

/// One telemetry emission from the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Report {
    /// Telemetry channel the report belongs on.
    pub sensor_id: u8,
    /// Remaining charge, 0..=100.
    pub percent: u8,
    /// Supply voltage in volts, three decimal places. `None` when voltage
    /// telemetry is disabled.
    pub voltage_v: Option<f32>,
    /// Supply at or below the drained threshold.
    pub critical: bool,
}

/// Rate-limited battery sampler and threshold checker.
///
/// Constructed once at startup and never reset. Time is passed in
/// explicitly as the host millisecond counter, so behaviour is
/// deterministic under test and rollover-safe in the field.
pub struct BatteryMonitor {
    profile: BatteryProfile,
    report_interval_ms: u32,
    send_voltage: bool,
    sensor_id: u8,
    last_reported_percent: u8,
    last_sample_mv: f32,
    previous_report_ms: u32,
}

impl BatteryMonitor {
    /// Build the monitor, refusing configurations the node must not run
    /// with.
    pub fn new(config: &NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            profile: config.profile,
            report_interval_ms: config.report_interval_ms,
            send_voltage: config.send_voltage_telemetry,
            sensor_id: config.sensor_id,
            last_reported_percent: 0,
            last_sample_mv: 0.0,
            previous_report_ms: 0,
        })
    }

    /// Sample the supply and decide whether a report is due.
    ///
    /// Ordinary reports are spaced at least one interval apart; a critical
    /// reading (at or below the drained threshold, inclusive) always
    /// produces a report. Returns `None` when the interval guard holds or
    /// the source had no reading this cycle.
    pub fn update<V: VoltageSource>(&mut self, now_ms: u32, source: &mut V) -> Option<Report> {
        let mv = match source.read_supply_millivolts() {
            Ok(mv) => mv,
            // No reading this cycle: skip the report rather than emit a
            // stale or synthetic value.
            Err(_) => return None,
        };
        self.last_sample_mv = mv;

        if mv > f32::from(self.profile.low_mv) {
            if now_ms.wrapping_sub(self.previous_report_ms) > self.report_interval_ms {
                let percent = self.profile.percent(mv);
                self.previous_report_ms = now_ms;
                self.last_reported_percent = percent;
                Some(self.report(percent, false))
            } else {
                // Not time yet.
                None
            }
        } else {
            self.last_reported_percent = 0;
            Some(self.report(0, true))
        }
    }

    fn report(&self, percent: u8, critical: bool) -> Report {
        Report {
            sensor_id: self.sensor_id,
            percent,
            voltage_v: self.send_voltage.then(|| round_to_volts(self.last_sample_mv)),
            critical,
        }
    }

    /// Last percentage sent, for diagnostics.
    pub fn last_reported_percent(&self) -> u8 {
        self.last_reported_percent
    }

    /// Most recent raw reading in millivolts, for diagnostics.
    pub fn last_sample_millivolts(&self) -> f32 {
        self.last_sample_mv
    }
}

/// Volts from millivolts, rounded to three decimal places.
fn round_to_volts(mv: f32) -> f32 {
    // Supply readings are positive, so adding 0.5 and truncating rounds to
    // the nearest millivolt.
    ((mv + 0.5) as u32) as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Source(f32);

    impl VoltageSource for Source {
        type Error = ();

        fn read_supply_millivolts(&mut self) -> nb::Result<f32, ()> {
            Ok(self.0)
        }
    }

    struct NoReading;

    impl VoltageSource for NoReading {
        type Error = ();

        fn read_supply_millivolts(&mut self) -> nb::Result<f32, ()> {
            Err(nb::Error::WouldBlock)
        }
    }

    fn monitor_with_interval(interval_ms: u32) -> BatteryMonitor {
        let mut config = NodeConfig::new(BatteryProfile::LIFEPO4);
        config.report_interval_ms = interval_ms;
        BatteryMonitor::new(&config).unwrap()
    }

    #[test]
    fn lifepo4_midpoint_reads_fifty_percent() {
        let mut monitor = monitor_with_interval(1000);
        let report = monitor.update(1001, &mut Source(3200.0)).unwrap();
        assert_eq!(report.percent, 50);
        assert!(!report.critical);
        assert_eq!(report.sensor_id, 244);
    }

    #[test]
    fn reports_are_rate_limited() {
        let mut monitor = monitor_with_interval(1000);
        assert!(monitor.update(1001, &mut Source(3200.0)).is_some());
        assert!(monitor.update(1500, &mut Source(3200.0)).is_none());
        assert!(monitor.update(2001, &mut Source(3200.0)).is_none());
        assert!(monitor.update(2002, &mut Source(3200.0)).is_some());
    }

    #[test]
    fn elapsed_exactly_interval_does_not_emit() {
        let mut monitor = monitor_with_interval(1000);
        assert!(monitor.update(1000, &mut Source(3200.0)).is_none());
        assert!(monitor.update(1001, &mut Source(3200.0)).is_some());
    }

    #[test]
    fn critical_bypasses_rate_limit() {
        let mut monitor = monitor_with_interval(1000);
        for now in [0, 1, 2, 3] {
            let report = monitor.update(now, &mut Source(3000.0)).unwrap();
            assert_eq!(report.percent, 0);
            assert!(report.critical);
        }
    }

    #[test]
    fn drained_threshold_is_inclusive() {
        let mut monitor = monitor_with_interval(1000);
        let report = monitor.update(0, &mut Source(3050.0)).unwrap();
        assert!(report.critical);
        assert_eq!(report.percent, 0);
    }

    #[test]
    fn coin_cell_at_floor_is_critical() {
        let mut config = NodeConfig::new(BatteryProfile::COIN_CELL);
        config.report_interval_ms = 1000;
        let mut monitor = BatteryMonitor::new(&config).unwrap();
        let report = monitor.update(0, &mut Source(1700.0)).unwrap();
        assert!(report.critical);
        assert_eq!(report.percent, 0);
    }

    #[test]
    fn percent_is_clamped_to_one_hundred() {
        let mut monitor = monitor_with_interval(1000);
        let report = monitor.update(1001, &mut Source(5000.0)).unwrap();
        assert_eq!(report.percent, 100);
    }

    #[test]
    fn percent_is_monotone_over_the_profile_span() {
        let mut previous = 0;
        for mv in 3051..=3350u16 {
            let mut monitor = monitor_with_interval(0);
            let report = monitor.update(1, &mut Source(f32::from(mv))).unwrap();
            assert!(report.percent >= previous);
            assert!(report.percent <= 100);
            previous = report.percent;
        }
    }

    #[test]
    fn missing_reading_skips_the_cycle() {
        let mut monitor = monitor_with_interval(1000);
        assert!(monitor.update(5000, &mut NoReading).is_none());
        // The next real reading reports as usual.
        assert!(monitor.update(5001, &mut Source(3200.0)).is_some());
    }

    #[test]
    fn voltage_telemetry_is_rounded_to_millivolts() {
        let mut config = NodeConfig::new(BatteryProfile::LIFEPO4);
        config.report_interval_ms = 1000;
        config.send_voltage_telemetry = true;
        let mut monitor = BatteryMonitor::new(&config).unwrap();
        let report = monitor.update(1001, &mut Source(3204.6)).unwrap();
        assert_eq!(report.voltage_v, Some(3205.0 / 1000.0));
    }

    #[test]
    fn voltage_telemetry_defaults_off() {
        let mut monitor = monitor_with_interval(1000);
        let report = monitor.update(1001, &mut Source(3200.0)).unwrap();
        assert_eq!(report.voltage_v, None);
    }

    #[test]
    fn rate_limit_survives_millis_rollover() {
        let mut monitor = monitor_with_interval(1000);
        assert!(monitor.update(u32::MAX - 500, &mut Source(3200.0)).is_some());
        // 901 ms elapsed across the wrap: still inside the interval.
        assert!(monitor.update(400, &mut Source(3200.0)).is_none());
        // 1101 ms elapsed: due again.
        assert!(monitor.update(600, &mut Source(3200.0)).is_some());
    }

    #[test]
    fn diagnostics_track_every_sample() {
        let mut monitor = monitor_with_interval(1000);
        monitor.update(1, &mut Source(3210.0));
        assert_eq!(monitor.last_sample_millivolts(), 3210.0);
        // Sample is retained even when the interval guard held the report.
        monitor.update(2, &mut Source(3190.0));
        assert_eq!(monitor.last_sample_millivolts(), 3190.0);
    }

    #[test]
    fn invalid_profile_prevents_startup() {
        let config = NodeConfig::new(BatteryProfile {
            high_mv: 1000,
            low_mv: 2000,
        });
        assert!(BatteryMonitor::new(&config).is_err());
    }
}
