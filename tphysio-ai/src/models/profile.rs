//! Athlete profile, session context and the submitted job input

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::training::TrainingData;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// Athlete profile as submitted with the recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteProfile {
    /// ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub sex: Option<Sex>,
    /// Height in centimetres
    #[serde(default)]
    pub height: Option<f64>,
    /// Weight in kilograms
    #[serde(default)]
    pub weight: Option<f64>,
    /// Resting heart rate (bpm), required
    #[serde(default)]
    pub hr_rest: Option<f64>,
    /// Maximum heart rate (bpm), required
    #[serde(default)]
    pub hr_max: Option<f64>,
}

impl AthleteProfile {
    /// Height in metres, when known and positive
    pub fn height_m(&self) -> Option<f64> {
        self.height.filter(|h| *h > 0.0).map(|h| h / 100.0)
    }

    /// Age in whole years on `today`
    pub fn age_on(&self, today: NaiveDate) -> Option<i32> {
        let birth = NaiveDate::parse_from_str(self.birth_date.as_deref()?, "%Y-%m-%d").ok()?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age)
    }
}

/// Self-reported session context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingContext {
    #[serde(default)]
    pub training_objective: Option<String>,
    #[serde(default)]
    pub fitness_level: Option<String>,
    /// Borg scale 1-10
    #[serde(default)]
    pub perceived_effort: Option<f64>,
    /// 1-5
    #[serde(default)]
    pub sleep_quality: Option<f64>,
    #[serde(default)]
    pub sleep_hours: Option<f64>,
    /// 1-5
    #[serde(default)]
    pub satisfaction: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormData {
    pub profile: AthleteProfile,
    #[serde(default)]
    pub context: TrainingContext,
}

/// Body of a job submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub form_data: FormData,
    pub training_data: TrainingData,
}

impl JobInput {
    /// Synchronous validation; a failing input never becomes a job
    pub fn validate(&self) -> Result<(), PipelineError> {
        let profile = &self.form_data.profile;

        let hr_max = match profile.hr_max {
            Some(v) if v > 0.0 => v,
            _ => {
                return Err(PipelineError::Validation(
                    "maximum heart rate is required".to_string(),
                ))
            }
        };
        let hr_rest = match profile.hr_rest {
            Some(v) if v > 0.0 => v,
            _ => {
                return Err(PipelineError::Validation(
                    "resting heart rate is required".to_string(),
                ))
            }
        };
        if hr_max <= hr_rest {
            return Err(PipelineError::Validation(format!(
                "maximum heart rate ({}) must exceed resting heart rate ({})",
                hr_max, hr_rest
            )));
        }
        if self.training_data.time_series.is_empty() {
            return Err(PipelineError::Validation("training time series is empty".to_string()));
        }
        Ok(())
    }
}
