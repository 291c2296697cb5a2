//! Recording telemetry
//!
//! Derives a `(power, elapsed_seconds)` signal from the audio stream for
//! live UI feedback (level meter + duration label). Peak level is tracked
//! over fixed windows of interleaved samples and normalized against a
//! fixed divisor, so a quiet room sits near zero and ordinary speech near
//! the top of the range. Published on a watch channel; consumers read the
//! latest value and the signal has no effect on pipeline state.

use crate::assets::{POWER_PEAK_DIVISOR, POWER_WINDOW_SAMPLES};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    /// Normalized audio power, 0..1.
    pub power: f32,
    pub elapsed_seconds: f64,
}

struct PowerMeter {
    peak: i16,
    count: usize,
}

impl PowerMeter {
    fn new() -> Self {
        Self { peak: 0, count: 0 }
    }

    /// Feed samples; returns the window's normalized power each time a
    /// full window completes.
    fn feed(&mut self, samples: &[i16]) -> Option<f32> {
        let mut emitted = None;
        for &sample in samples {
            let magnitude = sample.saturating_abs();
            if self.peak < magnitude {
                self.peak = magnitude;
            }
            self.count += 1;

            if self.count >= POWER_WINDOW_SAMPLES {
                emitted = Some((self.peak as f32 / POWER_PEAK_DIVISOR).clamp(0.0, 1.0));
                self.peak = 0;
                self.count = 0;
            }
        }
        emitted
    }
}

pub struct Telemetry {
    meter: PowerMeter,
    tx: watch::Sender<TelemetrySample>,
    last: TelemetrySample,
}

impl Telemetry {
    pub fn new() -> (Self, watch::Receiver<TelemetrySample>) {
        let (tx, rx) = watch::channel(TelemetrySample::default());
        (
            Self {
                meter: PowerMeter::new(),
                tx,
                last: TelemetrySample::default(),
            },
            rx,
        )
    }

    /// Feed one audio callback's samples together with the recorder's
    /// accumulated duration.
    pub fn process(&mut self, samples: &[i16], elapsed: Duration) {
        self.last.elapsed_seconds = elapsed.as_secs_f64();
        if let Some(power) = self.meter.feed(samples) {
            self.last.power = power;
        }
        let _ = self.tx.send(self.last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_meter_emits_per_window() {
        let mut meter = PowerMeter::new();
        // One short of a window: nothing emitted
        assert!(meter.feed(&vec![1000i16; POWER_WINDOW_SAMPLES - 1]).is_none());
        // The last sample completes the window
        let power = meter.feed(&[2000]).expect("window complete");
        assert!((power - 2000.0 / POWER_PEAK_DIVISOR).abs() < f32::EPSILON);
    }

    #[test]
    fn test_power_is_clamped() {
        let mut meter = PowerMeter::new();
        let power = meter.feed(&vec![i16::MAX; POWER_WINDOW_SAMPLES]).unwrap();
        assert_eq!(power, 1.0);
    }

    #[test]
    fn test_peak_resets_between_windows() {
        let mut meter = PowerMeter::new();
        let loud = meter.feed(&vec![3000i16; POWER_WINDOW_SAMPLES]).unwrap();
        let quiet = meter.feed(&vec![100i16; POWER_WINDOW_SAMPLES]).unwrap();
        assert!(loud > quiet);
    }

    #[test]
    fn test_negative_samples_count_as_magnitude() {
        let mut meter = PowerMeter::new();
        let power = meter.feed(&vec![-2000i16; POWER_WINDOW_SAMPLES]).unwrap();
        assert!(power > 0.0);
    }

    #[test]
    fn test_telemetry_publishes_elapsed() {
        let (mut telemetry, rx) = Telemetry::new();
        telemetry.process(&[0; 4], Duration::from_millis(1500));
        assert_eq!(rx.borrow().elapsed_seconds, 1.5);
    }
}
