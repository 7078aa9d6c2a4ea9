//! Analysis prompt construction
//!
//! Renders the athlete, session context, weather, summary and derived metrics
//! into a single prompt that asks for a Markdown report in four sections.
//! Fields the athlete did not provide are rendered as "not informed" so the
//! model can mention them instead of asking for them.

use chrono::NaiveDate;

use crate::models::{
    AthleteProfile, DerivedMetrics, FormData, QuintileTrend, Sex, TrainingContext,
    TrainingSummary, WeatherInfo,
};
use crate::services::metrics_engine::format_mm_ss;

const NOT_INFORMED: &str = "not informed";
const NOT_AVAILABLE: &str = "N/A";

/// Display label for the objective and fitness level codes sent by the form
fn friendly_label(code: &str) -> &str {
    match code {
        "long_slow" => "Long slow run",
        "tempo_run" => "Tempo run",
        "interval" => "Interval training",
        "race" => "Race",
        "recovery" => "Recovery",
        "tc6m" => "6-minute walk test",
        "cooper_test" => "12-minute run test (Cooper)",
        "beginner" => "Beginner",
        "intermediate" => "Intermediate",
        "advanced" => "Advanced",
        other => other,
    }
}

/// Builds the analysis prompt
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    today: NaiveDate,
}

impl PromptBuilder {
    /// `today` is the reference date for the athlete's age
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn build(
        &self,
        form: &FormData,
        summary: &TrainingSummary,
        weather: Option<&WeatherInfo>,
        metrics: &DerivedMetrics,
    ) -> String {
        let mut sections = vec![
            SYSTEM_INSTRUCTIONS.to_string(),
            self.athlete_section(&form.profile, &form.context),
            context_section(&form.context, weather),
            summary_section(summary),
            metrics_section(metrics),
            REPORT_STRUCTURE.to_string(),
        ];
        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }

    fn athlete_section(&self, profile: &AthleteProfile, context: &TrainingContext) -> String {
        let age = profile
            .age_on(self.today)
            .map(|a| format!("{} years", a))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let sex = match profile.sex {
            Some(Sex::Male) => "Male",
            Some(Sex::Female) => "Female",
            None => NOT_INFORMED,
        };

        [
            "**ATHLETE:**".to_string(),
            format!("- Age: {}", age),
            format!("- Sex: {}", sex),
            format!("- Declared level: {}", text_or_missing(context.fitness_level.as_deref())),
            format!("- Resting HR: {}", bpm(profile.hr_rest)),
            format!("- Maximum HR: {}", bpm(profile.hr_max)),
        ]
        .join("\n")
    }
}

fn context_section(context: &TrainingContext, weather: Option<&WeatherInfo>) -> String {
    let weather = weather
        .map(|w| format!("{}°C, {}% humidity, {}", w.temperature, w.humidity, w.condition.label()))
        .unwrap_or_else(|| NOT_INFORMED.to_string());

    [
        "**SESSION CONTEXT:**".to_string(),
        format!("- Training objective: {}", text_or_missing(context.training_objective.as_deref())),
        format!("- Perceived effort (Borg 1-10): {}", scale(context.perceived_effort, None)),
        format!("- Sleep quality: {}", scale(context.sleep_quality, Some(5))),
        format!(
            "- Sleep duration: {}",
            context
                .sleep_hours
                .map(|h| format!("{} hours", h))
                .unwrap_or_else(|| NOT_INFORMED.to_string())
        ),
        format!("- Satisfaction with the session: {}", scale(context.satisfaction, Some(5))),
        format!("- Weather at start (automatic): {}", weather),
    ]
    .join("\n")
}

fn summary_section(summary: &TrainingSummary) -> String {
    let km = summary.total_distance_meters / 1000.0;
    let pace = if km > 0.0 {
        format!("{} min/km", format_mm_ss((summary.total_time_seconds / km).max(0.0) as u64))
    } else {
        NOT_AVAILABLE.to_string()
    };

    [
        "**TRAINING SUMMARY:**".to_string(),
        format!("- Total duration: {}", format_mm_ss(summary.total_time_seconds.max(0.0) as u64)),
        format!("- Total distance: {:.2} km", km),
        format!("- Average pace: {}", pace),
        format!("- Average HR: {}", bpm(summary.avg_heart_rate)),
        format!("- Peak HR: {}", bpm(summary.max_heart_rate)),
    ]
    .join("\n")
}

fn metrics_section(metrics: &DerivedMetrics) -> String {
    if metrics.insufficient_data {
        return "**ADVANCED METRICS:**\n- Insufficient data for advanced metrics; analyse the summary only."
            .to_string();
    }

    let mut lines = vec![
        "**ADVANCED METRICS (CALCULATED):**".to_string(),
        format!("- Pacing strategy: {}", metrics.pacing_strategy.label()),
        format!(
            "- Cardiovascular decoupling: {}",
            metrics
                .decoupling
                .overall_drop_pct
                .map(|d| format!("{:.1}% efficiency drop first to last quintile", d))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        ),
        format!("- Cadence trend: {}", trend_text(&metrics.cadence, "spm")),
        format!("- Stride length trend: {}", trend_text(&metrics.stride_length, "m")),
    ];

    if metrics.is_cadence_estimated {
        lines.push(
            "- Note: cadence and stride were estimated from the athlete's height and speed, not measured by a sensor."
                .to_string(),
        );
    }

    if let Some(zones) = &metrics.zone_distribution {
        lines.push("- Heart-rate zone distribution:".to_string());
        for zone in zones {
            lines.push(format!(
                "  - {} ({}-{} bpm): {:.1}% ({})",
                zone.zone, zone.min_bpm, zone.max_bpm, zone.percentage, zone.time
            ));
        }
    }

    if let Some(elevation) = &metrics.elevation {
        let terrain = &elevation.terrain_distribution;
        lines.push(format!(
            "- Elevation: +{} m / -{} m; uphill {:.0}%, downhill {:.0}%, flat {:.0}%",
            elevation.gain,
            elevation.loss,
            terrain.uphill.percentage,
            terrain.downhill.percentage,
            terrain.flat.percentage
        ));
    }

    if let Some(load) = metrics.training_load {
        lines.push(format!("- Training load (zone-weighted minutes): {}", load));
    }

    lines.join("\n")
}

fn trend_text(trend: &QuintileTrend, unit: &str) -> String {
    if trend.trend.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    let values = trend
        .trend
        .iter()
        .map(|v| format!("{:.2}", v))
        .collect::<Vec<_>>()
        .join(" → ");

    let overall = match (trend.estimated, trend.overall_drop_pct) {
        (true, _) => "overall: estimated".to_string(),
        (false, Some(drop)) => format!("overall: {:.1}% drop", drop),
        (false, None) => format!("overall: {}", NOT_AVAILABLE),
    };
    format!("{} {} per quintile ({})", values, unit, overall)
}

fn text_or_missing(code: Option<&str>) -> String {
    match code.map(str::trim) {
        Some(code) if !code.is_empty() => friendly_label(code).to_string(),
        _ => NOT_INFORMED.to_string(),
    }
}

fn scale(value: Option<f64>, out_of: Option<u8>) -> String {
    match (value, out_of) {
        (Some(v), Some(max)) => format!("{} of {}", v, max),
        (Some(v), None) => v.to_string(),
        (None, _) => NOT_INFORMED.to_string(),
    }
}

fn bpm(value: Option<f64>) -> String {
    value
        .map(|v| format!("{} bpm", v.round()))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

const SYSTEM_INSTRUCTIONS: &str = "\
You are an exercise physiologist specialised in training assessment.
Write a technical yet easy to follow analysis of one training session.
Answer in Markdown. Analyse STRICTLY the data below and do not ask for information already given.
When a contextual field is \"not informed\", only mention that it would enrich the analysis.";

const REPORT_STRUCTURE: &str = "\
**YOUR ANALYSIS (follow this structure):**

### 1. Summary and pacing strategy
Was the pacing appropriate for the declared training objective?

### 2. Cardiovascular load and fatigue
Use the decoupling trend and the zone distribution to assess aerobic endurance.

### 3. Biomechanics and consistency
Use the cadence and stride trends to discuss muscular fatigue and running form.

### 4. Overall assessment and recommendations
Connect the context (sleep, perceived effort, weather, terrain) with the metrics and give one or two actionable recommendations.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WeatherCondition, ZoneBucket};

    fn form() -> FormData {
        FormData {
            profile: AthleteProfile {
                birth_date: Some("1990-01-10".to_string()),
                sex: Some(Sex::Female),
                hr_rest: Some(52.0),
                hr_max: Some(188.0),
                ..Default::default()
            },
            context: TrainingContext {
                training_objective: Some("long_slow".to_string()),
                sleep_quality: Some(4.0),
                ..Default::default()
            },
        }
    }

    fn summary() -> TrainingSummary {
        TrainingSummary {
            total_time_seconds: 3000.0,
            total_distance_meters: 10_000.0,
            avg_heart_rate: Some(148.0),
            max_heart_rate: None,
        }
    }

    #[test]
    fn test_prompt_renders_profile_and_placeholders() {
        let builder = PromptBuilder::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let prompt = builder.build(&form(), &summary(), None, &DerivedMetrics::insufficient());

        assert!(prompt.contains("Age: 34 years"));
        assert!(prompt.contains("Training objective: Long slow run"));
        assert!(prompt.contains("Sleep quality: 4 of 5"));
        assert!(prompt.contains("Declared level: not informed"));
        assert!(prompt.contains("Weather at start (automatic): not informed"));
        assert!(prompt.contains("Average pace: 05:00 min/km"));
        assert!(prompt.contains("Peak HR: N/A"));
        assert!(prompt.contains("Insufficient data"));
    }

    #[test]
    fn test_prompt_discloses_estimated_cadence_and_zones() {
        let mut metrics = DerivedMetrics::insufficient();
        metrics.insufficient_data = false;
        metrics.is_cadence_estimated = true;
        metrics.cadence = QuintileTrend {
            trend: vec![160.0, 161.0, 162.0, 160.5, 159.0],
            overall_drop_pct: None,
            estimated: true,
        };
        metrics.zone_distribution = Some(vec![ZoneBucket {
            zone: "Z2 (Moderate)".to_string(),
            min_bpm: 127,
            max_bpm: 140,
            percentage: 100.0,
            seconds: 600,
            time: "10:00".to_string(),
        }]);
        metrics.training_load = Some(20);

        let weather = WeatherInfo {
            temperature: 24,
            humidity: 70,
            condition: WeatherCondition::Rain,
        };
        let builder = PromptBuilder::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let prompt = builder.build(&form(), &summary(), Some(&weather), &metrics);

        assert!(prompt.contains("overall: estimated"));
        assert!(prompt.contains("estimated from the athlete's height"));
        assert!(prompt.contains("Z2 (Moderate) (127-140 bpm): 100.0% (10:00)"));
        assert!(prompt.contains("Training load (zone-weighted minutes): 20"));
        assert!(prompt.contains("24°C, 70% humidity, rain"));
    }
}
