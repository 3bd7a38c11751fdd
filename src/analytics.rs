//! History summary and chart data derived from stored predictions

use crate::types::prediction::{Diagnosis, PredictionRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of buckets in the probability histogram (10 points each)
pub const HISTOGRAM_BUCKETS: usize = 10;

/// Counts shown under the prediction history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub high_risk: usize,
    pub low_risk: usize,
}

impl HistorySummary {
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        let high_risk = records
            .iter()
            .filter(|r| r.diagnosis == Diagnosis::Diabetes)
            .count();
        Self {
            total: records.len(),
            high_risk,
            low_risk: records.len() - high_risk,
        }
    }
}

/// Share of one diagnosis among all predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskShare {
    pub diagnosis: Diagnosis,
    pub label: &'static str,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub at: DateTime<Utc>,
    pub probability: f64,
}

/// One scatter point: a health metric against the predicted probability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub value: f64,
    pub probability: f64,
    pub diagnosis: Diagnosis,
}

/// Data behind the analytics charts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub risk_distribution: Vec<RiskShare>,
    /// Only filled when there are at least two points to draw a line through
    pub probability_trend: Vec<TrendPoint>,
    pub glucose_vs_probability: Vec<MetricPoint>,
    pub bmi_vs_probability: Vec<MetricPoint>,
    pub age_vs_probability: Vec<MetricPoint>,
    pub probability_histogram: [u64; HISTOGRAM_BUCKETS],
}

impl ChartData {
    /// Build chart data from records in chronological order. Records stored
    /// without a probability only count towards the risk distribution.
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        let with_proba: Vec<(&PredictionRecord, f64)> = records
            .iter()
            .filter_map(|r| r.probability.map(|p| (r, p)))
            .collect();

        let probability_trend = if with_proba.len() > 1 {
            with_proba
                .iter()
                .map(|(r, p)| TrendPoint {
                    at: r.created_at,
                    probability: *p,
                })
                .collect()
        } else {
            Vec::new()
        };

        let scatter = |metric: fn(&PredictionRecord) -> f64| -> Vec<MetricPoint> {
            with_proba
                .iter()
                .map(|(r, p)| MetricPoint {
                    value: metric(r),
                    probability: *p,
                    diagnosis: r.diagnosis,
                })
                .collect()
        };

        let mut probability_histogram = [0; HISTOGRAM_BUCKETS];
        for (_, p) in &with_proba {
            probability_histogram[histogram_bucket(*p)] += 1;
        }

        Self {
            risk_distribution: risk_distribution(records),
            probability_trend,
            glucose_vs_probability: scatter(|r| r.features.glucose()),
            bmi_vs_probability: scatter(|r| r.features.bmi()),
            age_vs_probability: scatter(|r| r.features.age()),
            probability_histogram,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.risk_distribution.is_empty()
    }
}

/// Bucket index for a percentage; 100 lands in the last bucket
pub fn histogram_bucket(percent: f64) -> usize {
    ((percent.max(0.0) / 10.0) as usize).min(HISTOGRAM_BUCKETS - 1)
}

/// Diagnoses present in `records`, most frequent first
fn risk_distribution(records: &[PredictionRecord]) -> Vec<RiskShare> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let mut shares: Vec<RiskShare> = [Diagnosis::NoDiabetes, Diagnosis::Diabetes]
        .into_iter()
        .map(|diagnosis| {
            let count = records.iter().filter(|r| r.diagnosis == diagnosis).count();
            RiskShare {
                diagnosis,
                label: diagnosis.risk_label(),
                count,
                percent: count as f64 / total as f64 * 100.0,
            }
        })
        .filter(|share| share.count > 0)
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count));
    shares
}
