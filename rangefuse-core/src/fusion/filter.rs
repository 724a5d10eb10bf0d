//! Kalman smoothing for ranging measurements
//!
//! Implements a 2-state Kalman filter per measurement axis (value and rate)
//! with a constant velocity model. A [`SphericalFilter`] bundles one axis for
//! range plus lazily created axes for azimuth and elevation, matching the
//! spherical coordinates ranging hardware reports.

use std::f64::consts::PI;
use std::time::Duration;

use nalgebra::{Matrix2, RowVector2, Vector2};

use crate::report::RangingReport;
use crate::technology::RangingTechnology;

/// Process noise - controls how quickly an axis adapts to real motion
/// Higher values = faster adaptation but more noise sensitivity
/// Lower values = smoother output but slower to follow a moving peer
const PROCESS_NOISE: f64 = 0.25;

/// UWB two-way time-of-flight ranging noise (meters squared)
const UWB_RANGE_VARIANCE: f64 = 0.01;

/// Channel Sounding phase-based ranging noise (meters squared)
const CS_RANGE_VARIANCE: f64 = 0.25;

/// Angle-of-arrival noise for azimuth and elevation (radians squared)
const ANGLE_VARIANCE: f64 = 0.05;

/// Initial rate uncertainty, (m/s)² or (rad/s)²
const INITIAL_RATE_VARIANCE: f64 = 1.0;

/// Wrap an angle to [-PI, PI]
fn wrap_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Noise model for one technology's measurements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterTuning {
    /// Rate process noise shared by all axes
    pub process_noise: f64,
    /// Range measurement variance (meters squared)
    pub range_variance: f64,
    /// Angle measurement variance (radians squared)
    pub angle_variance: f64,
    /// Samples required before the filter output is trusted
    pub warmup: u32,
}

impl FilterTuning {
    /// Default tuning for a technology's ranging characteristics
    pub fn for_technology(technology: RangingTechnology) -> Self {
        let range_variance = match technology {
            RangingTechnology::Uwb => UWB_RANGE_VARIANCE,
            RangingTechnology::Cs => CS_RANGE_VARIANCE,
        };
        FilterTuning {
            process_noise: PROCESS_NOISE,
            range_variance,
            angle_variance: ANGLE_VARIANCE,
            warmup: 1,
        }
    }
}

/// 2-state Kalman filter for a single measurement axis
///
/// State vector: [value, rate]. The first measurement initializes the state
/// directly, so the first output always equals the first observation.
#[derive(Debug, Clone)]
pub struct AxisKalman {
    /// State estimate [value, rate]
    x: Vector2<f64>,
    /// Estimate error covariance
    p: Matrix2<f64>,
    /// Measurement noise variance
    r: f64,
    /// Process noise variance on the rate
    q: f64,
    initialized: bool,
}

impl AxisKalman {
    pub fn new(measurement_variance: f64, process_noise: f64) -> Self {
        AxisKalman {
            x: Vector2::zeros(),
            p: Matrix2::zeros(),
            r: measurement_variance,
            q: process_noise,
            initialized: false,
        }
    }

    /// Predict step: project state and covariance forward in time
    pub fn predict(&mut self, delta_time: f64) {
        if !self.initialized || delta_time <= 0.0 {
            return;
        }

        // x_new = x + rate * dt
        let a = Matrix2::new(1.0, delta_time, 0.0, 1.0);
        self.x = a * self.x;

        // Noise enters through the rate: W = [0, 1]^T
        let w = Vector2::new(0.0, 1.0);
        // P = A * P * A^T + W * q * W^T
        self.p = a * self.p * a.transpose() + w * self.q * w.transpose();
    }

    /// Update step: incorporate a measurement of the value
    pub fn update(&mut self, z: f64) {
        self.update_inner(z, false);
    }

    /// Update step with the innovation wrapped to [-PI, PI]
    ///
    /// A peer crossing the +-PI azimuth boundary must pull the estimate
    /// through the boundary, not the long way around through zero.
    pub fn update_wrapped(&mut self, z: f64) {
        self.update_inner(z, true);
    }

    fn update_inner(&mut self, z: f64, wrap: bool) {
        if !self.initialized {
            self.x = Vector2::new(z, 0.0);
            self.p = Matrix2::new(self.r, 0.0, 0.0, INITIAL_RATE_VARIANCE);
            self.initialized = true;
            return;
        }

        // Innovation (measurement residual)
        let mut y = z - self.x[0];
        if wrap {
            y = wrap_angle(y);
        }

        // Observation matrix: we measure the value directly
        let h = RowVector2::new(1.0, 0.0);

        // Innovation covariance: S = H * P * H^T + R
        let s = (h * self.p * h.transpose())[(0, 0)] + self.r;
        if s.abs() < 1e-12 {
            // Degenerate covariance, skip update
            return;
        }

        // Kalman gain: K = P * H^T / S
        let k = self.p * h.transpose() / s;

        // Update state: x = x + K * y
        self.x += k * y;
        if wrap {
            self.x[0] = wrap_angle(self.x[0]);
        }

        // Update covariance: P = (I - K * H) * P
        self.p = (Matrix2::identity() - k * h) * self.p;
    }

    pub fn value(&self) -> f64 {
        self.x[0]
    }

    pub fn rate(&self) -> f64 {
        self.x[1]
    }

    /// Current value variance (for confidence estimation)
    pub fn variance(&self) -> f64 {
        self.p[(0, 0)]
    }
}

/// Smoothing filter for one technology's report stream
///
/// Range is always filtered. Azimuth and elevation axes are created the
/// first time a report carries them, so angle-less hardware never pays for
/// them. Smoothed angles are only emitted for reports that carried the
/// corresponding raw component.
#[derive(Debug, Clone)]
pub struct SphericalFilter {
    tuning: FilterTuning,
    range: AxisKalman,
    azimuth: Option<AxisKalman>,
    elevation: Option<AxisKalman>,
    last_timestamp: Option<Duration>,
    samples: u32,
}

impl SphericalFilter {
    pub fn new(tuning: FilterTuning) -> Self {
        SphericalFilter {
            tuning,
            range: AxisKalman::new(tuning.range_variance, tuning.process_noise),
            azimuth: None,
            elevation: None,
            last_timestamp: None,
            samples: 0,
        }
    }

    /// Feed one raw report and get its smoothed counterpart.
    ///
    /// Out-of-order timestamps skip the predict step rather than running
    /// time backwards.
    pub fn update(&mut self, report: &RangingReport) -> RangingReport {
        let tuning = self.tuning;
        let delta_time = match self.last_timestamp {
            Some(last) if report.timestamp > last => (report.timestamp - last).as_secs_f64(),
            _ => 0.0,
        };
        self.last_timestamp = Some(self.last_timestamp.map_or(report.timestamp, |last| {
            std::cmp::max(last, report.timestamp)
        }));

        self.range.predict(delta_time);
        self.range.update(report.range_m);

        if let Some(axis) = self.azimuth.as_mut() {
            axis.predict(delta_time);
        }
        if let Some(axis) = self.elevation.as_mut() {
            axis.predict(delta_time);
        }

        let mut smoothed = RangingReport::new(
            report.technology,
            report.peer.clone(),
            report.timestamp,
            self.range.value(),
        );

        if let Some(raw) = report.azimuth_rad {
            let axis = self
                .azimuth
                .get_or_insert_with(|| AxisKalman::new(tuning.angle_variance, tuning.process_noise));
            axis.update_wrapped(raw);
            smoothed = smoothed.with_azimuth(axis.value());
        }
        if let Some(raw) = report.elevation_rad {
            let axis = self
                .elevation
                .get_or_insert_with(|| AxisKalman::new(tuning.angle_variance, tuning.process_noise));
            axis.update(raw);
            smoothed = smoothed.with_elevation(axis.value());
        }
        if let Some(rssi) = report.rssi_dbm {
            smoothed = smoothed.with_rssi(rssi);
        }

        self.samples = self.samples.saturating_add(1);
        smoothed
    }

    /// Whether enough samples have been seen to trust the output
    pub fn is_warm(&self) -> bool {
        self.samples >= self.tuning.warmup
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Range estimate confidence (variance in meters squared)
    pub fn range_variance(&self) -> f64 {
        self.range.variance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::PeerAddress;

    fn report(seconds: f64, range_m: f64) -> RangingReport {
        RangingReport::new(
            RangingTechnology::Uwb,
            PeerAddress::new(vec![0x01, 0x02]),
            Duration::from_secs_f64(seconds),
            range_m,
        )
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
        assert!((wrap_angle(-1.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((wrap_angle(4.0 * PI)).abs() < 1e-12);
    }

    #[test]
    fn test_axis_first_measurement_initializes() {
        let mut axis = AxisKalman::new(0.01, 0.25);
        axis.update(5.0);
        assert!((axis.value() - 5.0).abs() < 1e-12);
        assert!((axis.rate()).abs() < 1e-12);
    }

    #[test]
    fn test_axis_converges_on_constant_signal() {
        let mut axis = AxisKalman::new(0.25, 0.01);
        axis.update(10.0);
        let initial_variance = axis.variance();
        for _ in 0..20 {
            axis.predict(0.1);
            axis.update(10.0);
        }
        assert!((axis.value() - 10.0).abs() < 1e-6);
        assert!(axis.variance() < initial_variance);
    }

    #[test]
    fn test_axis_tracks_ramp() {
        let mut axis = AxisKalman::new(0.01, 0.25);
        // Peer receding at 1 m/s
        for step in 0..30 {
            axis.predict(0.1);
            axis.update(10.0 + step as f64 * 0.1);
        }
        assert!(axis.rate() > 0.5, "rate: {}", axis.rate());
        assert!((axis.value() - 12.9).abs() < 0.5, "value: {}", axis.value());
    }

    #[test]
    fn test_azimuth_update_crosses_boundary() {
        let mut axis = AxisKalman::new(0.05, 0.25);
        axis.update(3.0);
        // Measurement on the far side of +PI: the estimate must move toward
        // the boundary, not swing back through zero
        axis.update_wrapped(-3.1);
        assert!(axis.value() > 3.0 && axis.value() <= PI, "value: {}", axis.value());

        let mut axis = AxisKalman::new(0.05, 0.25);
        axis.update(3.1);
        axis.update_wrapped(-3.0);
        // Pulled across the boundary onto the negative side
        assert!(axis.value() < 0.0, "value: {}", axis.value());
    }

    #[test]
    fn test_spherical_filter_first_output_matches_input() {
        let mut filter = SphericalFilter::new(FilterTuning::for_technology(RangingTechnology::Uwb));
        let smoothed = filter.update(&report(1.0, 4.2));
        assert!((smoothed.range_m - 4.2).abs() < 1e-12);
        assert!(filter.is_warm());
    }

    #[test]
    fn test_spherical_filter_smooths_jitter() {
        let mut filter = SphericalFilter::new(FilterTuning::for_technology(RangingTechnology::Uwb));
        filter.update(&report(0.0, 10.0));
        filter.update(&report(0.2, 10.2));
        let smoothed = filter.update(&report(0.4, 9.8));
        assert!(
            (smoothed.range_m - 10.0).abs() < 0.2,
            "range: {}",
            smoothed.range_m
        );
    }

    #[test]
    fn test_angle_axes_are_lazy() {
        let mut filter = SphericalFilter::new(FilterTuning::for_technology(RangingTechnology::Uwb));
        let smoothed = filter.update(&report(0.0, 5.0));
        assert!(smoothed.azimuth_rad.is_none());

        let smoothed = filter.update(&report(0.2, 5.0).with_azimuth(0.4).with_elevation(-0.1));
        assert!(smoothed.azimuth_rad.is_some());
        assert!(smoothed.elevation_rad.is_some());

        // Axis persists but only reports when the raw component is present
        let smoothed = filter.update(&report(0.4, 5.0));
        assert!(smoothed.azimuth_rad.is_none());
    }

    #[test]
    fn test_out_of_order_timestamp_skips_predict() {
        let mut filter = SphericalFilter::new(FilterTuning::for_technology(RangingTechnology::Cs));
        filter.update(&report(1.0, 8.0));
        // Regressing timestamp must not panic or run time backwards
        let smoothed = filter.update(&report(0.5, 8.4));
        assert!(smoothed.range_m > 8.0 && smoothed.range_m < 8.4);
    }

    #[test]
    fn test_warmup_threshold() {
        let mut tuning = FilterTuning::for_technology(RangingTechnology::Cs);
        tuning.warmup = 3;
        let mut filter = SphericalFilter::new(tuning);
        filter.update(&report(0.0, 2.0));
        assert!(!filter.is_warm());
        filter.update(&report(0.5, 2.0));
        filter.update(&report(1.0, 2.0));
        assert!(filter.is_warm());
        assert_eq!(filter.samples(), 3);
    }
}
