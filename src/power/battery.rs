//! # Battery Voltage
//!
//! Converts raw ADC codes to hundredths of a volt, rejects spurious drops
//! with a one-sided hold filter and maps the filtered voltage to a battery
//! percentage.
//!
//! The ADC reports 11-bit codes against a 4.09 V full scale, so
//! `voltage = raw * 4.09 / 2047 * 100`, truncated.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};

/// ADC full-scale voltage
pub const ADC_FULL_SCALE: f64 = 4.09;

/// Largest ADC code
pub const ADC_MAX_CODE: f64 = 2047.0;

/// Accepted value before the first sample. Drops from the sentinel are
/// never held.
pub const FILTER_SENTINEL: i32 = 450;

/// Samples below this are implausible and always held.
pub const FILTER_FLOOR: i32 = 300;

/// Largest drop between consecutive samples accepted as real.
pub const FILTER_MAX_DROP: i32 = 6;

/// Raw ADC code to hundredths of a volt.
#[must_use]
pub fn adc_to_voltage(raw: i32) -> i32 {
    (f64::from(raw) * (ADC_FULL_SCALE / ADC_MAX_CODE) * 100.0) as i32
}

/// Battery percentage for `voltage`, linear between the shutdown and full
/// thresholds and clamped to `0..=100`.
///
/// # Examples
///
/// ```
/// use handheld_monitor::power::battery::battery_percent;
///
/// assert_eq!(battery_percent(370, 320, 420), 50);
/// assert_eq!(battery_percent(300, 320, 420), 0);
/// assert_eq!(battery_percent(430, 320, 420), 100);
/// ```
#[must_use]
pub fn battery_percent(voltage: i32, shutdown: i32, full: i32) -> u8 {
    let span = f64::from(full - shutdown);
    if span <= 0.0 {
        return if voltage >= full { 100 } else { 0 };
    }
    let percent = (f64::from(voltage - shutdown) / span * 100.0) as i64;
    percent.clamp(0, 100) as u8
}

/// One-sided hold filter over voltage samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoltageFilter {
    last: i32,
}

impl Default for VoltageFilter {
    fn default() -> Self {
        Self {
            last: FILTER_SENTINEL,
        }
    }
}

impl VoltageFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted value.
    #[must_use]
    pub fn last(&self) -> i32 {
        self.last
    }

    /// Feeds one sample and returns the accepted value.
    ///
    /// The previous value is kept when the sample is below
    /// [`FILTER_FLOOR`], or when it drops more than [`FILTER_MAX_DROP`]
    /// from a previous value above the floor that is not the sentinel.
    /// Rises are always accepted.
    pub fn accept(&mut self, sample: i32) -> i32 {
        let last = self.last;
        let spurious_drop =
            last > FILTER_FLOOR && last - sample > FILTER_MAX_DROP && last != FILTER_SENTINEL;
        if sample >= FILTER_FLOOR && !spurious_drop {
            self.last = sample;
        }
        self.last
    }
}

/// Source of raw battery ADC codes.
#[cfg_attr(test, mockall::automock)]
pub trait BatteryAdc: Send + Sync {
    /// Reads one raw code from the battery channel.
    fn read_raw(&mut self) -> Result<i32>;
}

/// [`BatteryAdc`] reading an IIO channel through sysfs
/// (`/sys/bus/iio/devices/iio:deviceN/in_voltageM_raw`)
#[derive(Debug, Clone)]
pub struct SysfsAdc {
    path: PathBuf,
}

impl SysfsAdc {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BatteryAdc for SysfsAdc {
    fn read_raw(&mut self) -> Result<i32> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            MonitorError::Adc(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        raw.trim().parse().map_err(|_| {
            MonitorError::Adc(format!(
                "Unexpected value {:?} in {}",
                raw.trim(),
                self.path.display()
            ))
        })
    }
}

/// ADC plus filter: yields filtered voltages.
pub struct BatteryReader {
    adc: Box<dyn BatteryAdc>,
    filter: VoltageFilter,
}

impl BatteryReader {
    #[must_use]
    pub fn new(adc: Box<dyn BatteryAdc>) -> Self {
        Self {
            adc,
            filter: VoltageFilter::new(),
        }
    }

    /// Reads the ADC and returns the filtered voltage in hundredths of a
    /// volt.
    ///
    /// # Errors
    ///
    /// Returns `Adc` error if the ADC cannot be read. The filter state is
    /// left untouched in that case.
    pub fn read_voltage(&mut self) -> Result<i32> {
        let raw = self.adc.read_raw()?;
        Ok(self.filter.accept(adc_to_voltage(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    /// xorshift32
    struct Rng(u32);

    impl Rng {
        fn below(&mut self, bound: u32) -> u32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            self.0 % bound
        }
    }

    #[test]
    fn test_adc_to_voltage() {
        assert_eq!(adc_to_voltage(0), 0);
        assert_eq!(adc_to_voltage(2047), 409);
        assert_eq!(adc_to_voltage(2000), 399);
        assert_eq!(adc_to_voltage(1000), 199);
    }

    #[test]
    fn test_battery_percent_endpoints() {
        assert_eq!(battery_percent(320, 320, 420), 0);
        assert_eq!(battery_percent(420, 320, 420), 100);
        assert_eq!(battery_percent(370, 320, 420), 50);
    }

    #[test]
    fn test_battery_percent_clamped() {
        assert_eq!(battery_percent(0, 320, 420), 0);
        assert_eq!(battery_percent(319, 320, 420), 0);
        assert_eq!(battery_percent(500, 320, 420), 100);
    }

    #[test]
    fn test_battery_percent_monotonic() {
        let mut previous = 0;
        for voltage in 250..=500 {
            let percent = battery_percent(voltage, 320, 420);
            assert!(percent >= previous, "percent fell at {}", voltage);
            assert!(percent <= 100);
            previous = percent;
        }
    }

    #[test]
    fn test_filter_holds_below_floor() {
        let mut rng = Rng(0xdead_beef);
        let mut filter = VoltageFilter::new();
        filter.accept(400);
        for _ in 0..500 {
            let sample = rng.below(300) as i32;
            assert_eq!(filter.accept(sample), 400);
        }
    }

    #[test]
    fn test_filter_tracks_gradual_drops() {
        let mut rng = Rng(0x0102_0304);
        let mut filter = VoltageFilter::new();
        let mut sample = 420;
        assert_eq!(filter.accept(sample), sample);
        while sample > 310 {
            sample -= rng.below(FILTER_MAX_DROP as u32 + 1) as i32;
            assert_eq!(filter.accept(sample), sample);
        }
    }

    #[test]
    fn test_filter_holds_sudden_drop() {
        let mut filter = VoltageFilter::new();
        filter.accept(400);
        assert_eq!(filter.accept(393), 400);
        assert_eq!(filter.accept(394), 394);
    }

    #[test]
    fn test_filter_accepts_sudden_rise() {
        let mut filter = VoltageFilter::new();
        filter.accept(340);
        assert_eq!(filter.accept(410), 410);
    }

    #[test]
    fn test_filter_accepts_any_drop_from_sentinel() {
        let mut filter = VoltageFilter::new();
        assert_eq!(filter.last(), FILTER_SENTINEL);
        assert_eq!(filter.accept(330), 330);
    }

    #[test]
    fn test_filter_keeps_sentinel_on_implausible_first_sample() {
        let mut filter = VoltageFilter::new();
        assert_eq!(filter.accept(120), FILTER_SENTINEL);
        assert_eq!(filter.accept(360), 360);
    }

    #[test]
    fn test_sysfs_adc_reads_code() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "1843\n").unwrap();
        let mut adc = SysfsAdc::new(file.path());
        assert_eq!(adc.read_raw().unwrap(), 1843);
    }

    #[test]
    fn test_sysfs_adc_garbage_is_adc_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "n/a").unwrap();
        let mut adc = SysfsAdc::new(file.path());
        assert!(matches!(adc.read_raw(), Err(MonitorError::Adc(_))));
    }

    #[test]
    fn test_sysfs_adc_missing_file() {
        let mut adc = SysfsAdc::new("/nonexistent/in_voltage0_raw");
        assert!(matches!(adc.read_raw(), Err(MonitorError::Adc(_))));
    }

    #[test]
    fn test_reader_filters_adc_codes() {
        let mut adc = MockBatteryAdc::new();
        let mut codes = vec![2000, 1000, 1990].into_iter();
        adc.expect_read_raw()
            .times(3)
            .returning(move || Ok(codes.next().unwrap_or(0)));

        let mut reader = BatteryReader::new(Box::new(adc));
        assert_eq!(reader.read_voltage().unwrap(), 399);
        // 199 is below the floor
        assert_eq!(reader.read_voltage().unwrap(), 399);
        assert_eq!(reader.read_voltage().unwrap(), 397);
    }

    #[test]
    fn test_reader_propagates_adc_error() {
        let mut adc = MockBatteryAdc::new();
        adc.expect_read_raw()
            .returning(|| Err(MonitorError::Adc("i2c timeout".to_string())));

        let mut reader = BatteryReader::new(Box::new(adc));
        assert!(reader.read_voltage().is_err());
    }
}
