//! Patient metrics entered on the prediction form

use serde::{Deserialize, Serialize};

/// Raw metrics for one patient, as entered by the user.
///
/// Field aliases match the training data column names so records exported
/// from the training set deserialize directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientMetrics {
    /// Number of pregnancies
    #[serde(alias = "Pregnancies")]
    pub pregnancies: f64,

    /// Plasma glucose concentration (mg/dL)
    #[serde(alias = "Glucose")]
    pub glucose: f64,

    /// Diastolic blood pressure (mm Hg)
    #[serde(alias = "BloodPressure")]
    pub blood_pressure: f64,

    /// Triceps skin fold thickness (mm)
    #[serde(alias = "SkinThickness")]
    pub skin_thickness: f64,

    /// 2-hour serum insulin (mu U/ml)
    #[serde(alias = "Insulin")]
    pub insulin: f64,

    /// Body mass index
    #[serde(alias = "BMI")]
    pub bmi: f64,

    /// Diabetes pedigree function
    #[serde(alias = "DiabetesPedigreeFunction", alias = "dpf")]
    pub diabetes_pedigree_function: f64,

    /// Age in years
    #[serde(alias = "Age")]
    pub age: f64,
}

impl PatientMetrics {
    /// Host form rule: every entry must be a finite, non-negative number.
    ///
    /// Returns the name of the first offending field.
    pub fn first_invalid_field(&self) -> Option<&'static str> {
        [
            ("pregnancies", self.pregnancies),
            ("glucose", self.glucose),
            ("blood_pressure", self.blood_pressure),
            ("skin_thickness", self.skin_thickness),
            ("insulin", self.insulin),
            ("bmi", self.bmi),
            ("diabetes_pedigree_function", self.diabetes_pedigree_function),
            ("age", self.age),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite() || *v < 0.0)
        .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_column_aliases() {
        let json = r#"{
            "Pregnancies": 2, "Glucose": 150, "BloodPressure": 80,
            "SkinThickness": 25, "Insulin": 100, "BMI": 32.5,
            "DiabetesPedigreeFunction": 0.6, "Age": 45
        }"#;

        let metrics: PatientMetrics = serde_json::from_str(json).unwrap();

        assert_eq!(metrics.glucose, 150.0);
        assert_eq!(metrics.bmi, 32.5);
        assert_eq!(metrics.diabetes_pedigree_function, 0.6);
        assert_eq!(metrics.first_invalid_field(), None);
    }

    #[test]
    fn test_negative_entry_rejected_by_form_rule() {
        let metrics = PatientMetrics {
            insulin: -1.0,
            ..Default::default()
        };
        assert_eq!(metrics.first_invalid_field(), Some("insulin"));

        let metrics = PatientMetrics {
            bmi: f64::NAN,
            ..Default::default()
        };
        assert_eq!(metrics.first_invalid_field(), Some("bmi"));
    }
}
