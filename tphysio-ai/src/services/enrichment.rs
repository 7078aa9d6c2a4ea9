//! Enrichment stage: weather snapshot + elevation backfill
//!
//! **Weather:** first point's coordinates and timestamp only. Failure is
//! logged and the job continues without weather.
//!
//! **Elevation:** only when the recording has no credible altitude (no
//! nonzero altitude, or fewer than 10% of points with one). Points with
//! coordinates are chunked into batches, looked up with a bounded number of
//! requests in flight, each batch retried with exponential backoff. Results
//! are merged back by timestamp, never by completion order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{stream, StreamExt, TryStreamExt};
use tphysio_common::config::PipelineConfig;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{TimeSeriesPoint, WeatherCondition, WeatherInfo};
use crate::services::job_store::JobHandle;
use crate::types::{ElevationProvider, ProviderError, WeatherProvider, WeatherSource};
use crate::utils::retry::{retry_with_backoff, RetryError, RetryPolicy};

/// Share of points that must carry a nonzero altitude for the recording's
/// own altitude to be trusted
const CREDIBLE_ALTITUDE_SHARE: f64 = 0.10;

/// Sessions older than this many days come from the archive
const FORECAST_WINDOW_DAYS: i64 = 7;

/// Progress reported when a job enters enrichment
pub(crate) const PROGRESS_ENRICHING: u8 = 10;
/// Progress reported once every elevation batch is merged
const PROGRESS_ELEVATION_DONE: u8 = 55;

/// Enriched series and the optional weather snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutput {
    pub time_series: Vec<TimeSeriesPoint>,
    pub weather: Option<WeatherInfo>,
}

pub struct EnrichmentStage {
    weather: Arc<dyn WeatherProvider>,
    elevation: Arc<dyn ElevationProvider>,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl EnrichmentStage {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        elevation: Arc<dyn ElevationProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            weather,
            elevation,
            batch_size: config.elevation_batch_size.max(1),
            concurrency: config.elevation_concurrency.max(1),
            retry: RetryPolicy::new(config.elevation_max_attempts, config.backoff_base_secs),
        }
    }

    /// Enrich `series`; output has the same length and order as the input
    pub async fn run(
        &self,
        series: Vec<TimeSeriesPoint>,
        handle: &JobHandle,
    ) -> Result<EnrichmentOutput, PipelineError> {
        let job_id = handle.job_id();

        let Some(first) = series.first() else {
            debug!(job_id = %job_id, "Empty series, nothing to enrich");
            return Ok(EnrichmentOutput {
                time_series: series,
                weather: None,
            });
        };

        handle.checkpoint()?;
        let weather = self.fetch_weather(first, handle).await;

        handle.checkpoint()?;
        let time_series = if needs_elevation(&series) {
            self.backfill_elevation(series, handle).await?
        } else {
            debug!(job_id = %job_id, "Recording carries altitude, skipping elevation lookup");
            series
        };

        Ok(EnrichmentOutput {
            time_series,
            weather,
        })
    }

    async fn fetch_weather(
        &self,
        first: &TimeSeriesPoint,
        handle: &JobHandle,
    ) -> Option<WeatherInfo> {
        let job_id = handle.job_id();

        let Some((latitude, longitude)) = first.coordinates() else {
            debug!(job_id = %job_id, "First point has no coordinates, skipping weather");
            return None;
        };
        let Some(at) = first.instant() else {
            warn!(
                job_id = %job_id,
                timestamp = first.timestamp,
                "First point timestamp out of range, skipping weather"
            );
            return None;
        };

        let source = select_weather_source(at.date_naive(), chrono::Utc::now().date_naive());
        handle.message("Fetching weather conditions...");

        match self.weather.fetch(latitude, longitude, at, source).await {
            Ok(reading) => {
                let info = WeatherInfo {
                    temperature: reading.temperature_c.round() as i32,
                    humidity: reading.relative_humidity.round() as i32,
                    condition: WeatherCondition::from_wmo_code(reading.weather_code),
                };
                info!(
                    job_id = %job_id,
                    provider = self.weather.name(),
                    ?source,
                    temperature = info.temperature,
                    condition = info.condition.label(),
                    "Weather attached"
                );
                Some(info)
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    provider = self.weather.name(),
                    ?source,
                    error = %e,
                    "Weather lookup failed, continuing without weather"
                );
                None
            }
        }
    }

    async fn backfill_elevation(
        &self,
        series: Vec<TimeSeriesPoint>,
        handle: &JobHandle,
    ) -> Result<Vec<TimeSeriesPoint>, PipelineError> {
        let job_id = handle.job_id();

        let requested: Vec<(i64, (f64, f64))> = series
            .iter()
            .filter_map(|p| p.coordinates().map(|c| (p.timestamp, c)))
            .collect();

        if requested.is_empty() {
            return Err(PipelineError::NoCoordinates);
        }

        let total_batches = requested.len().div_ceil(self.batch_size);
        info!(
            job_id = %job_id,
            provider = self.elevation.name(),
            points = requested.len(),
            batches = total_batches,
            concurrency = self.concurrency,
            "Starting elevation backfill"
        );
        handle.message(format!("Fetching elevation data (0/{} batches)...", total_batches));

        // Owned batches; borrowed chunks break the Send bound tokio::spawn needs
        let owned: Vec<Vec<(i64, (f64, f64))>> = requested
            .chunks(self.batch_size)
            .map(<[_]>::to_vec)
            .collect();

        let completed = AtomicUsize::new(0);
        let batches: Vec<Vec<(i64, f64)>> = stream::iter(owned.into_iter().enumerate())
            .map(|(index, batch)| {
                let completed = &completed;
                async move {
                    let merged = self.lookup_batch(index, total_batches, &batch, handle).await?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let span = (PROGRESS_ELEVATION_DONE - PROGRESS_ENRICHING) as usize;
                    handle.progress(
                        PROGRESS_ENRICHING + (span * done / total_batches) as u8,
                        format!("Fetching elevation data ({}/{} batches)...", done, total_batches),
                    );
                    Ok::<_, PipelineError>(merged)
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let received: usize = batches.iter().map(Vec::len).sum();
        if received != requested.len() {
            return Err(PipelineError::MergeInvariant {
                expected: requested.len(),
                actual: received,
            });
        }

        let by_timestamp: HashMap<i64, f64> = batches.into_iter().flatten().collect();
        info!(job_id = %job_id, points = received, "Elevation backfill complete");

        Ok(merge_elevations(series, &by_timestamp))
    }

    async fn lookup_batch(
        &self,
        index: usize,
        total_batches: usize,
        batch: &[(i64, (f64, f64))],
        handle: &JobHandle,
    ) -> Result<Vec<(i64, f64)>, PipelineError> {
        let locations: Vec<(f64, f64)> = batch.iter().map(|(_, c)| *c).collect();
        let operation = format!("elevation batch {}/{}", index + 1, total_batches);

        let elevations = retry_with_backoff(
            &operation,
            self.retry,
            handle.cancel_token(),
            |_: &ProviderError| true,
            |attempt| {
                let locations = &locations;
                async move {
                    debug!(
                        job_id = %handle.job_id(),
                        batch = index + 1,
                        attempt,
                        "Elevation request"
                    );
                    self.elevation.lookup(locations).await
                }
            },
        )
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => PipelineError::Cancelled,
            RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => {
                PipelineError::Provider {
                    stage: "Elevation lookup",
                    source: error,
                }
            }
        })?;

        if elevations.len() != batch.len() {
            warn!(
                job_id = %handle.job_id(),
                batch = index + 1,
                expected = batch.len(),
                actual = elevations.len(),
                "Elevation batch size mismatch"
            );
            return Err(PipelineError::MergeInvariant {
                expected: batch.len(),
                actual: elevations.len(),
            });
        }

        Ok(batch.iter().map(|(ts, _)| *ts).zip(elevations).collect())
    }
}

/// Pick the weather dataset for a session day
///
/// Future days (clock skew, wrong device time) use the forecast dataset.
pub fn select_weather_source(session_day: NaiveDate, today: NaiveDate) -> WeatherSource {
    let age_days = (today - session_day).num_days();
    if age_days == 0 {
        WeatherSource::Current
    } else if age_days <= FORECAST_WINDOW_DAYS {
        WeatherSource::Forecast
    } else {
        WeatherSource::Archive
    }
}

/// Whether the recording's own altitude is missing or not credible
pub fn needs_elevation(series: &[TimeSeriesPoint]) -> bool {
    if series.is_empty() {
        return false;
    }
    let nonzero = series
        .iter()
        .filter(|p| p.altitude.is_some_and(|a| a != 0.0))
        .count();
    nonzero == 0 || (nonzero as f64) < CREDIBLE_ALTITUDE_SHARE * series.len() as f64
}

/// Replace the altitude of every point whose timestamp has a looked-up
/// elevation; other points are returned untouched
pub fn merge_elevations(
    series: Vec<TimeSeriesPoint>,
    by_timestamp: &HashMap<i64, f64>,
) -> Vec<TimeSeriesPoint> {
    series
        .into_iter()
        .map(|mut point| {
            if let Some(elevation) = by_timestamp.get(&point.timestamp) {
                point.altitude = Some(*elevation);
            }
            point
        })
        .collect()
}
