//! Shared test fixtures: fake providers and sample submissions

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tphysio_ai::models::{
    AthleteProfile, FormData, JobInput, TimeSeriesPoint, TrainingContext, TrainingData,
    TrainingSummary,
};
use tphysio_ai::services::JobOrchestrator;
use tphysio_ai::types::{
    ElevationProvider, ProviderError, TextGenerator, WeatherProvider, WeatherReading,
    WeatherSource,
};
use tphysio_common::config::PipelineConfig;
use tphysio_common::events::EventBus;

/// Session start used by every sample series (2024-03-10T08:00:00Z)
pub const START_MS: i64 = 1_710_057_600_000;

// ============================================================================
// Weather
// ============================================================================

pub struct FakeWeather {
    result: Result<WeatherReading, ProviderError>,
    pub calls: Mutex<Vec<WeatherSource>>,
}

impl FakeWeather {
    pub fn sunny() -> Arc<Self> {
        Arc::new(Self {
            result: Ok(WeatherReading {
                temperature_c: 21.6,
                relative_humidity: 64.4,
                weather_code: 1,
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err(ProviderError::Transient("HTTP 503: unavailable".to_string())),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl WeatherProvider for FakeWeather {
    fn name(&self) -> &'static str {
        "fake-weather"
    }

    async fn fetch(
        &self,
        _latitude: f64,
        _longitude: f64,
        _at: DateTime<Utc>,
        source: WeatherSource,
    ) -> Result<WeatherReading, ProviderError> {
        self.calls.lock().unwrap().push(source);
        self.result.clone()
    }
}

// ============================================================================
// Elevation
// ============================================================================

/// Elevation fake: answers `latitude * 1000` per location
pub struct FakeElevation {
    /// Leading calls that fail with a transient error
    fail_first: usize,
    /// Return one value fewer than requested
    drop_one: bool,
    /// Simulated request latency
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl FakeElevation {
    fn with(fail_first: usize, drop_one: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            drop_one,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        })
    }

    pub fn accurate() -> Arc<Self> {
        Self::with(0, false, Duration::ZERO)
    }

    pub fn flaky(fail_first: usize) -> Arc<Self> {
        Self::with(fail_first, false, Duration::ZERO)
    }

    pub fn short_by_one() -> Arc<Self> {
        Self::with(0, true, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with(0, false, delay)
    }

    pub fn expected_altitude(latitude: f64) -> f64 {
        latitude * 1000.0
    }
}

#[async_trait::async_trait]
impl ElevationProvider for FakeElevation {
    fn name(&self) -> &'static str {
        "fake-elevation"
    }

    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(locations.len());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if call < self.fail_first {
            return Err(ProviderError::Transient("HTTP 429: slow down".to_string()));
        }

        let mut values: Vec<f64> = locations
            .iter()
            .map(|(lat, _)| Self::expected_altitude(*lat))
            .collect();
        if self.drop_one {
            values.pop();
        }
        Ok(values)
    }
}

/// Elevation fake whose earlier batches answer later: call `i` of `batches`
/// sleeps `(batches - i) * step`, so with every batch in flight they finish in
/// reverse order
pub struct ReversedElevation {
    batches: usize,
    step: Duration,
    calls: AtomicUsize,
    /// Call indices in the order their answers were returned
    pub finished: Mutex<Vec<usize>>,
}

impl ReversedElevation {
    pub fn new(batches: usize, step: Duration) -> Arc<Self> {
        Arc::new(Self {
            batches,
            step,
            calls: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl ElevationProvider for ReversedElevation {
    fn name(&self) -> &'static str {
        "reversed-elevation"
    }

    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.batches.saturating_sub(call) as u32;
        tokio::time::sleep(self.step * remaining).await;
        self.finished.lock().unwrap().push(call);

        Ok(locations
            .iter()
            .map(|(lat, _)| FakeElevation::expected_altitude(*lat))
            .collect())
    }
}

// ============================================================================
// Text generation
// ============================================================================

/// Generator that replays scripted outcomes per model; once a model's script
/// runs dry it answers with its standing reply, or fails permanently
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    standing: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
    panic_on_call: bool,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `text` for `model` on every call
    pub fn answering(model: &str, text: &str) -> Arc<Self> {
        let mut generator = Self::new();
        generator.standing.insert(model.to_string(), text.to_string());
        Arc::new(generator)
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic_on_call: true,
            ..Self::default()
        })
    }

    /// Queue outcomes for `model`
    pub fn then<I>(self, model: &str, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        self.script
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == model).count()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, model: &str, _prompt: &str) -> Result<String, ProviderError> {
        if self.panic_on_call {
            panic!("generator exploded");
        }
        self.calls.lock().unwrap().push(model.to_string());
        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| match self.standing.get(model) {
            Some(text) => Ok(text.clone()),
            None => Err(ProviderError::Permanent(format!("unknown model {}", model))),
        })
    }
}

pub fn transient() -> Result<String, ProviderError> {
    Err(ProviderError::Transient("The model is overloaded".to_string()))
}

// ============================================================================
// Fixtures
// ============================================================================

/// Pipeline settings with no backoff delay
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        backoff_base_secs: 0,
        model_tiers: vec!["tier-a".to_string(), "tier-b".to_string()],
        ..PipelineConfig::default()
    }
}

pub fn orchestrator(
    weather: Arc<FakeWeather>,
    elevation: Arc<dyn ElevationProvider>,
    generator: Arc<ScriptedGenerator>,
    config: &PipelineConfig,
) -> JobOrchestrator {
    JobOrchestrator::from_providers(weather, elevation, generator, config, EventBus::new(1000))
}

/// Steady 3 m/s run, one point per second, coordinates on every point
pub fn sample_series(points: usize, altitude: Option<f64>) -> Vec<TimeSeriesPoint> {
    (0..points)
        .map(|i| TimeSeriesPoint {
            timestamp: START_MS + i as i64 * 1000,
            latitude: Some(-23.55 + i as f64 * 1e-5),
            longitude: Some(-46.63),
            distance: Some(i as f64 * 3.0),
            heart_rate: Some(140.0 + (i % 10) as f64),
            speed: Some(3.0),
            cadence: None,
            altitude,
        })
        .collect()
}

pub fn sample_input(series: Vec<TimeSeriesPoint>) -> JobInput {
    let seconds = series.len() as f64;
    JobInput {
        form_data: FormData {
            profile: AthleteProfile {
                birth_date: Some("1991-07-02".to_string()),
                height: Some(175.0),
                hr_rest: Some(50.0),
                hr_max: Some(190.0),
                ..Default::default()
            },
            context: TrainingContext {
                training_objective: Some("long_slow".to_string()),
                ..Default::default()
            },
        },
        training_data: TrainingData {
            summary: TrainingSummary {
                total_time_seconds: seconds,
                total_distance_meters: seconds * 3.0,
                avg_heart_rate: Some(144.5),
                max_heart_rate: Some(149.0),
            },
            time_series: series,
        },
    }
}
