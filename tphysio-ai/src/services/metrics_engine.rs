//! Derived session metrics
//!
//! Pure computation: a point series and an athlete profile in, `DerivedMetrics`
//! out. No I/O and no state between calls.
//!
//! # Metrics
//! - Pacing strategy (first half vs second half mean speed)
//! - Heart-rate zone distribution (heart-rate reserve based, 5 zones)
//! - Cardiovascular decoupling per quintile
//! - Cadence and stride length per quintile (estimated from height when no sensor)
//! - Elevation gain/loss and terrain distribution
//! - Training load (zone-weighted minutes)

use std::borrow::Cow;

use crate::models::{
    AthleteProfile, DecouplingPoint, DecouplingTrend, DerivedMetrics, ElevationMetrics,
    PacingStrategy, QuintileTrend, TerrainDistribution, TerrainSegment, TimeSeriesPoint,
    ZoneBucket,
};

/// Series shorter than this produce the insufficient-data sentinel
pub const MIN_POINTS: usize = 100;

/// Zone names and upper bounds as fractions of heart-rate reserve
const ZONES: [(&str, f64); 5] = [
    ("Z1 (Easy)", 0.6),
    ("Z2 (Moderate)", 0.7),
    ("Z3 (Hard)", 0.8),
    ("Z4 (Very hard)", 0.9),
    ("Z5 (Maximum)", 1.01),
];

const QUINTILES: usize = 5;

/// Points slower than this (m/s) are standing still
const MOVING_SPEED_MS: f64 = 0.5;

/// Minimum qualifying points for a quintile efficiency value
const MIN_EFFICIENCY_POINTS: usize = 10;

/// Altitude changes within ±this many metres count as flat
const ELEVATION_NOISE_M: f64 = 0.1;

/// Half-to-half speed change that counts as a split
const PACING_THRESHOLD: f64 = 0.02;

/// Stride model: stride (m) = HEIGHT_FACTOR * height (m) + SPEED_FACTOR * speed (m/s)
const STRIDE_HEIGHT_FACTOR: f64 = 0.43;
const STRIDE_SPEED_FACTOR: f64 = 0.08;

/// Metrics engine
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    min_points: usize,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self {
            min_points: MIN_POINTS,
        }
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive every metric for `series`
    ///
    /// Returns `DerivedMetrics::insufficient()` for series under the minimum
    /// length instead of failing.
    pub fn compute(&self, series: &[TimeSeriesPoint], profile: &AthleteProfile) -> DerivedMetrics {
        if series.len() < self.min_points {
            tracing::debug!(
                points = series.len(),
                min_points = self.min_points,
                "Not enough points for metrics"
            );
            return DerivedMetrics::insufficient();
        }

        let (series, is_cadence_estimated) = with_estimated_cadence(series, profile);

        let zones = zone_distribution(&series, profile);
        let training_load = zones.as_ref().map(|z| training_load(z));
        let (decoupling, cadence, stride_length) = quintile_trends(&series, is_cadence_estimated);

        DerivedMetrics {
            insufficient_data: false,
            pacing_strategy: pacing_strategy(&series),
            zone_distribution: zones,
            decoupling,
            cadence,
            stride_length,
            is_cadence_estimated,
            elevation: elevation_metrics(&series),
            training_load,
        }
    }
}

/// Fill cadence from the stride model when the series has no cadence sensor
/// data and the athlete's height is known.
///
/// `cadence = (speed / stride) * 60 * 2`, doubled to count both legs. Points
/// below moving speed get no cadence.
pub fn with_estimated_cadence<'a>(
    series: &'a [TimeSeriesPoint],
    profile: &AthleteProfile,
) -> (Cow<'a, [TimeSeriesPoint]>, bool) {
    let has_real_cadence = series.iter().any(|p| p.cadence.is_some_and(|c| c > 0.0));
    let height_m = match profile.height_m() {
        Some(h) if !has_real_cadence => h,
        _ => return (Cow::Borrowed(series), false),
    };

    let base_stride = height_m * STRIDE_HEIGHT_FACTOR;
    let estimated = series
        .iter()
        .map(|point| {
            let cadence = point.speed.filter(|s| *s > MOVING_SPEED_MS).map(|speed| {
                let stride = base_stride + speed * STRIDE_SPEED_FACTOR;
                (speed / stride) * 60.0 * 2.0
            });
            TimeSeriesPoint {
                cadence,
                ..point.clone()
            }
        })
        .collect();

    (Cow::Owned(estimated), true)
}

/// Zone boundaries in bpm (upper bound of each zone, inclusive)
pub fn zone_boundaries(hr_rest: f64, hr_max: f64) -> [u32; 5] {
    let reserve = hr_max - hr_rest;
    ZONES.map(|(_, fraction)| (hr_rest + reserve * fraction).round() as u32)
}

fn zone_distribution(
    series: &[TimeSeriesPoint],
    profile: &AthleteProfile,
) -> Option<Vec<ZoneBucket>> {
    let (hr_rest, hr_max) = match (profile.hr_rest, profile.hr_max) {
        (Some(rest), Some(max)) if rest > 0.0 && max > rest => (rest, max),
        _ => return None,
    };
    let boundaries = zone_boundaries(hr_rest, hr_max);

    let mut counts = [0u64; 5];
    for hr in series.iter().filter_map(|p| positive(p.heart_rate)) {
        let zone = boundaries
            .iter()
            .position(|&upper| hr <= f64::from(upper))
            .unwrap_or(ZONES.len() - 1);
        counts[zone] += 1;
    }

    let total: u64 = counts.iter().sum();
    if total == 0 {
        return None;
    }

    let tenths = largest_remainder_tenths(&counts, total);

    Some(
        ZONES
            .iter()
            .enumerate()
            .map(|(i, (name, _))| ZoneBucket {
                zone: name.to_string(),
                min_bpm: if i == 0 {
                    hr_rest.round() as u32
                } else {
                    boundaries[i - 1] + 1
                },
                max_bpm: boundaries[i],
                percentage: tenths[i] as f64 / 10.0,
                seconds: counts[i],
                time: format_mm_ss(counts[i]),
            })
            .collect(),
    )
}

/// Split 1000 tenths of a percent across `counts` so the rounded shares sum
/// to exactly 100.0
fn largest_remainder_tenths(counts: &[u64; 5], total: u64) -> [u64; 5] {
    let mut tenths = [0u64; 5];
    let mut remainders = [(0u64, 0usize); 5];
    for (i, &count) in counts.iter().enumerate() {
        let scaled = count * 1000;
        tenths[i] = scaled / total;
        remainders[i] = (scaled % total, i);
    }

    let assigned: u64 = tenths.iter().sum();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take((1000 - assigned) as usize) {
        tenths[i] += 1;
    }
    tenths
}

/// Σ (zone_index + 1) * seconds_in_zone / 60, rounded
fn training_load(zones: &[ZoneBucket]) -> i64 {
    let weighted: u64 = zones
        .iter()
        .enumerate()
        .map(|(i, z)| (i as u64 + 1) * z.seconds)
        .sum();
    (weighted as f64 / 60.0).round() as i64
}

fn quintile_trends(
    series: &[TimeSeriesPoint],
    cadence_estimated: bool,
) -> (DecouplingTrend, QuintileTrend, QuintileTrend) {
    let size = series.len() / QUINTILES;

    let mut efficiency = Vec::with_capacity(QUINTILES);
    let mut cadence = Vec::with_capacity(QUINTILES);
    let mut stride = Vec::with_capacity(QUINTILES);

    for i in 0..QUINTILES {
        let segment = &series[i * size..(i + 1) * size];

        efficiency.push(DecouplingPoint {
            name: format!("{}%", i * 20),
            efficiency: round_to(efficiency_factor(segment), 3),
        });

        let avg_speed = mean_positive(segment, |p| p.speed);
        let avg_cadence = mean_positive(segment, |p| p.cadence);
        let stride_m = if avg_speed > 0.0 && avg_cadence > 0.0 {
            avg_speed / (avg_cadence / 60.0)
        } else {
            0.0
        };

        cadence.push(round_to(avg_cadence, 1));
        stride.push(round_to(stride_m, 2));
    }

    let decoupling_drop = percent_drop(
        efficiency[0].efficiency,
        efficiency[QUINTILES - 1].efficiency,
    );
    let (cadence_drop, stride_drop) = if cadence_estimated {
        (None, None)
    } else {
        (
            percent_drop(cadence[0], cadence[QUINTILES - 1]),
            percent_drop(stride[0], stride[QUINTILES - 1]),
        )
    };

    (
        DecouplingTrend {
            trend: efficiency,
            overall_drop_pct: decoupling_drop,
        },
        QuintileTrend {
            trend: cadence,
            overall_drop_pct: cadence_drop,
            estimated: cadence_estimated,
        },
        QuintileTrend {
            trend: stride,
            overall_drop_pct: stride_drop,
            estimated: cadence_estimated,
        },
    )
}

/// (mean speed in km/h) / (mean heart rate) over moving points with a heart
/// rate; 0 when fewer than 10 points qualify
pub fn efficiency_factor(segment: &[TimeSeriesPoint]) -> f64 {
    let qualifying: Vec<(f64, f64)> = segment
        .iter()
        .filter_map(|p| {
            let speed = p.speed.filter(|s| *s > MOVING_SPEED_MS)?;
            let hr = positive(p.heart_rate)?;
            Some((speed, hr))
        })
        .collect();

    if qualifying.len() < MIN_EFFICIENCY_POINTS {
        return 0.0;
    }

    let n = qualifying.len() as f64;
    let avg_speed = qualifying.iter().map(|(s, _)| s).sum::<f64>() / n;
    let avg_hr = qualifying.iter().map(|(_, hr)| hr).sum::<f64>() / n;
    (avg_speed * 3.6) / avg_hr
}

fn pacing_strategy(series: &[TimeSeriesPoint]) -> PacingStrategy {
    let mid = series.len() / 2;
    let first = mean_positive(&series[..mid], |p| p.speed);
    let second = mean_positive(&series[mid..], |p| p.speed);

    if second > first * (1.0 + PACING_THRESHOLD) {
        PacingStrategy::NegativeSplit
    } else if second < first * (1.0 - PACING_THRESHOLD) {
        PacingStrategy::PositiveSplit
    } else {
        PacingStrategy::Uniform
    }
}

fn elevation_metrics(series: &[TimeSeriesPoint]) -> Option<ElevationMetrics> {
    let mut gain = 0.0;
    let mut loss = 0.0;
    let mut uphill = 0.0;
    let mut downhill = 0.0;
    let mut flat = 0.0;

    for pair in series.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let distance = curr.distance.unwrap_or(0.0) - prev.distance.unwrap_or(0.0);
        if distance <= 0.0 {
            continue;
        }

        // A step touching a missing altitude is flat, never a climb from sea level
        let climb = match (prev.altitude, curr.altitude) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        };

        if climb > ELEVATION_NOISE_M {
            gain += climb;
            uphill += distance;
        } else if climb < -ELEVATION_NOISE_M {
            loss += -climb;
            downhill += distance;
        } else {
            flat += distance;
        }
    }

    let total = uphill + downhill + flat;
    if total <= 0.0 {
        return None;
    }

    let segment = |distance: f64| TerrainSegment {
        distance_km: round_to(distance / 1000.0, 2),
        percentage: round_to(distance / total * 100.0, 0),
    };

    Some(ElevationMetrics {
        gain: gain.round() as i64,
        loss: loss.round() as i64,
        terrain_distribution: TerrainDistribution {
            uphill: segment(uphill),
            downhill: segment(downhill),
            flat: segment(flat),
        },
    })
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Mean of the positive values of a field; 0 when there are none
fn mean_positive(
    segment: &[TimeSeriesPoint],
    field: impl Fn(&TimeSeriesPoint) -> Option<f64>,
) -> f64 {
    let (sum, count) = segment
        .iter()
        .filter_map(|p| positive(field(p)))
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Percentage drop from `first` to `last`, one decimal; `None` when `first` is 0
fn percent_drop(first: f64, last: f64) -> Option<f64> {
    (first > 0.0).then(|| round_to((first - last) / first * 100.0, 1))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Seconds as `MM:SS`
pub fn format_mm_ss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
