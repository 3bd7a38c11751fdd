//! Synthetic patients drawn from the distributions of the reference training
//! set, and the rule that labels them.

use crate::feature_extractor::{Feature, FeatureVector, FEATURE_COUNT};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use thiserror::Error;

/// Seed used for the reference training set
pub const DEFAULT_SEED: u64 = 42;

#[derive(Error, Debug)]
#[error("invalid {name} distribution: {reason}")]
pub struct DistributionError {
    name: &'static str,
    reason: String,
}

fn normal(name: &'static str, mean: f64, std_dev: f64) -> Result<Normal, DistributionError> {
    Normal::new(mean, std_dev).map_err(|e| DistributionError {
        name,
        reason: e.to_string(),
    })
}

/// Random patient generator
pub struct PatientGenerator {
    rng: StdRng,
    glucose: Normal,
    blood_pressure: Normal,
    skin_thickness: Normal,
    insulin: Normal,
    bmi: Normal,
    pedigree: Normal,
}

impl PatientGenerator {
    /// Seeded generator; `None` seeds from system entropy
    pub fn new(seed: Option<u64>) -> Result<Self, DistributionError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            glucose: normal("glucose", 120.0, 30.0)?,
            blood_pressure: normal("blood_pressure", 70.0, 20.0)?,
            skin_thickness: normal("skin_thickness", 20.0, 15.0)?,
            insulin: normal("insulin", 80.0, 100.0)?,
            bmi: normal("bmi", 25.0, 7.0)?,
            pedigree: normal("pedigree", 0.5, 0.3)?,
        })
    }

    /// One unclipped draw, as used for training data
    pub fn patient(&mut self) -> [f64; FEATURE_COUNT] {
        [
            self.rng.gen_range(0..17) as f64,
            self.glucose.sample(&mut self.rng),
            self.blood_pressure.sample(&mut self.rng),
            self.skin_thickness.sample(&mut self.rng),
            self.insulin.sample(&mut self.rng),
            self.bmi.sample(&mut self.rng),
            self.pedigree.sample(&mut self.rng),
            self.rng.gen_range(21..81) as f64,
        ]
    }

    /// A draw as it could be typed into the prediction form: clipped at zero
    /// and rounded to the form's precision
    pub fn form_entry(&mut self) -> [f64; FEATURE_COUNT] {
        let mut values = self.patient();
        for (i, value) in values.iter_mut().enumerate() {
            let clipped = value.max(0.0);
            *value = match Feature::ALL[i] {
                Feature::Bmi => (clipped * 10.0).round() / 10.0,
                Feature::DiabetesPedigreeFunction => (clipped * 1000.0).round() / 1000.0,
                _ => clipped.round(),
            };
        }
        values
    }

    /// One draw with its outcome label (0 or 1)
    pub fn labeled_patient(&mut self) -> ([f64; FEATURE_COUNT], usize) {
        let values = self.patient();
        let noise = self.rng.gen::<f64>() * 0.1;
        let label = usize::from(risk_score(&values) + noise > 0.5);
        (values, label)
    }

    pub fn labeled_dataset(&mut self, samples: usize) -> Vec<([f64; FEATURE_COUNT], usize)> {
        (0..samples).map(|_| self.labeled_patient()).collect()
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Deterministic part of the labeling rule
pub fn risk_score(values: &[f64; FEATURE_COUNT]) -> f64 {
    let weighted = [
        (Feature::Glucose, 140.0, 0.3),
        (Feature::Bmi, 30.0, 0.2),
        (Feature::Age, 50.0, 0.2),
        (Feature::BloodPressure, 90.0, 0.1),
        (Feature::Pregnancies, 5.0, 0.1),
    ];
    weighted
        .iter()
        .filter(|(feature, threshold, _)| values[feature.index()] > *threshold)
        .map(|(_, _, weight)| weight)
        .sum()
}

/// Whether the labeling rule calls this patient high risk. The label noise
/// is non-negative, so a score of exactly 0.5 already counts.
pub fn reference_risk(features: &FeatureVector) -> bool {
    risk_score(&features.to_array()) >= 0.5
}
