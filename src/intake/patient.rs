use serde::{Deserialize, Serialize};
use std::fmt;

use super::photos::PhotoAttachment;
use super::BodyArea;
use crate::error::ValidationError;

pub const DEFAULT_SEVERITY: u8 = 5;
pub const MAX_SEVERITY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Prognosis {
    #[default]
    Stable,
    Improving,
    Worsening,
    Terminal,
    Unknown,
}

impl fmt::Display for Prognosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Prognosis::Stable => "Stable",
            Prognosis::Improving => "Improving",
            Prognosis::Worsening => "Worsening",
            Prognosis::Terminal => "Terminal",
            Prognosis::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// A diagnosed condition: the primary disease or one comorbidity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseRecord {
    pub name: String,
    pub diagnosed_years_ago: f64,
    pub prognosis: Prognosis,
}

impl DiseaseRecord {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.diagnosed_years_ago.is_finite() || self.diagnosed_years_ago < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "Years since diagnosis",
                expected: "zero or more",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientProfile {
    pub age: u32,
    pub gender: String,
    pub intersex_condition: Option<String>,
    pub ethnicity: Option<String>,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub bmi_category: String,
    pub severity: u8,
}

impl Default for PatientProfile {
    fn default() -> Self {
        Self {
            age: 0,
            gender: "Female".to_string(),
            intersex_condition: None,
            ethnicity: None,
            weight_kg: 0.0,
            height_cm: 0.0,
            bmi_category: "Healthy".to_string(),
            severity: DEFAULT_SEVERITY,
        }
    }
}

/// One profile field with its new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ProfileField {
    Age(u32),
    Gender(String),
    IntersexCondition(Option<String>),
    Ethnicity(Option<String>),
    WeightKg(f64),
    HeightCm(f64),
    BmiCategory(String),
}

fn positive(value: f64, field: &'static str) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: "greater than zero",
        })
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PatientProfile {
    pub fn apply(&mut self, field: ProfileField) -> Result<(), ValidationError> {
        match field {
            ProfileField::Age(age) => self.age = age,
            ProfileField::Gender(gender) => self.gender = gender.trim().to_string(),
            ProfileField::IntersexCondition(value) => self.intersex_condition = optional_text(value),
            ProfileField::Ethnicity(value) => self.ethnicity = optional_text(value),
            ProfileField::WeightKg(kg) => self.weight_kg = positive(kg, "Weight")?,
            ProfileField::HeightCm(cm) => self.height_cm = positive(cm, "Height")?,
            ProfileField::BmiCategory(category) => self.bmi_category = category.trim().to_string(),
        }
        Ok(())
    }
}

/// Selected symptoms in the order they were picked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymptomSet(Vec<String>);

impl SymptomSet {
    /// Adds the symptom, or removes it if already selected. Returns whether it is now selected.
    pub fn toggle(&mut self, symptom: &str) -> bool {
        if let Some(pos) = self.0.iter().position(|s| s == symptom) {
            self.0.remove(pos);
            false
        } else {
            self.0.push(symptom.to_string());
            true
        }
    }

    pub fn contains(&self, symptom: &str) -> bool {
        self.0.iter().any(|s| s == symptom)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Everything the patient has entered so far.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntakeForm {
    body_area: Option<BodyArea>,
    symptoms: SymptomSet,
    profile: PatientProfile,
    primary_disease: DiseaseRecord,
    comorbidities: Vec<DiseaseRecord>,
    description: Option<String>,
}

impl IntakeForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_area(&self) -> Option<BodyArea> {
        self.body_area
    }

    pub fn symptoms(&self) -> &SymptomSet {
        &self.symptoms
    }

    pub fn profile(&self) -> &PatientProfile {
        &self.profile
    }

    pub fn primary_disease(&self) -> &DiseaseRecord {
        &self.primary_disease
    }

    pub fn comorbidities(&self) -> &[DiseaseRecord] {
        &self.comorbidities
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Symptoms belong to an area, so switching areas drops the old selection.
    pub fn set_body_area(&mut self, area: BodyArea) {
        if self.body_area != Some(area) {
            self.symptoms.clear();
        }
        self.body_area = Some(area);
    }

    pub fn toggle_symptom(&mut self, symptom: &str) -> Result<bool, ValidationError> {
        let area = self.body_area.ok_or(ValidationError::BodyAreaRequired)?;
        if !area.offers(symptom) {
            return Err(ValidationError::UnknownSymptom {
                symptom: symptom.to_string(),
                area: area.display_name(),
            });
        }
        Ok(self.symptoms.toggle(symptom))
    }

    pub fn set_profile_field(&mut self, field: ProfileField) -> Result<(), ValidationError> {
        let mut updated = self.profile.clone();
        updated.apply(field)?;
        self.profile = updated;
        Ok(())
    }

    pub fn set_severity(&mut self, severity: u8) -> Result<(), ValidationError> {
        if severity > MAX_SEVERITY {
            return Err(ValidationError::OutOfRange {
                field: "Severity",
                expected: "between 0 and 10",
            });
        }
        self.profile.severity = severity;
        Ok(())
    }

    pub fn set_primary_disease(&mut self, disease: DiseaseRecord) -> Result<(), ValidationError> {
        disease.validate()?;
        self.primary_disease = disease;
        Ok(())
    }

    pub fn add_comorbidity(&mut self, record: DiseaseRecord) -> Result<usize, ValidationError> {
        record.validate()?;
        self.comorbidities.push(record);
        Ok(self.comorbidities.len() - 1)
    }

    pub fn remove_comorbidity(&mut self, index: usize) -> Result<DiseaseRecord, ValidationError> {
        if index >= self.comorbidities.len() {
            return Err(ValidationError::ComorbidityIndexOutOfRange {
                index,
                len: self.comorbidities.len(),
            });
        }
        Ok(self.comorbidities.remove(index))
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = optional_text(description);
    }

    /// Freezes the form into a request. Fails only when no body area was chosen.
    pub fn snapshot(&self, photos: &[PhotoAttachment]) -> Result<ConsultationRequest, ValidationError> {
        let body_area = self.body_area.ok_or(ValidationError::BodyAreaRequired)?;
        Ok(ConsultationRequest {
            body_area,
            symptoms: self.symptoms.clone(),
            profile: self.profile.clone(),
            primary_disease: self.primary_disease.clone(),
            comorbidities: self.comorbidities.clone(),
            severity: self.profile.severity,
            description: self.description.clone(),
            photos: photos.to_vec(),
        })
    }
}

/// Immutable intake snapshot the consultation is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationRequest {
    pub body_area: BodyArea,
    pub symptoms: SymptomSet,
    pub profile: PatientProfile,
    pub primary_disease: DiseaseRecord,
    pub comorbidities: Vec<DiseaseRecord>,
    pub severity: u8,
    pub description: Option<String>,
    pub photos: Vec<PhotoAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chest_form() -> IntakeForm {
        let mut form = IntakeForm::new();
        form.set_body_area(BodyArea::Chest);
        form
    }

    #[test]
    fn even_toggles_restore_symptom_set() {
        let mut form = chest_form();
        form.toggle_symptom("Cough").unwrap();
        let before = form.symptoms().clone();

        for _ in 0..4 {
            form.toggle_symptom("Wheezing").unwrap();
        }
        assert_eq!(form.symptoms(), &before);

        assert!(!form.toggle_symptom("Cough").unwrap());
        assert!(form.symptoms().is_empty());
    }

    #[test]
    fn toggle_keeps_selection_order() {
        let mut form = chest_form();
        form.toggle_symptom("Tight chest").unwrap();
        form.toggle_symptom("Cough").unwrap();
        assert_eq!(form.symptoms().as_slice(), ["Tight chest", "Cough"]);
    }

    #[test]
    fn symptom_outside_vocabulary_is_rejected() {
        let mut form = chest_form();
        let err = form.toggle_symptom("Leg pain").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownSymptom { .. }));
        assert!(form.symptoms().is_empty());
    }

    #[test]
    fn toggle_without_area_is_rejected() {
        let mut form = IntakeForm::new();
        assert_eq!(
            form.toggle_symptom("Cough"),
            Err(ValidationError::BodyAreaRequired)
        );
    }

    #[test]
    fn changing_area_clears_symptoms() {
        let mut form = chest_form();
        form.toggle_symptom("Cough").unwrap();
        form.set_body_area(BodyArea::Chest);
        assert_eq!(form.symptoms().len(), 1);
        form.set_body_area(BodyArea::Head);
        assert!(form.symptoms().is_empty());
    }

    #[test]
    fn failed_profile_update_changes_nothing() {
        let mut form = chest_form();
        form.set_profile_field(ProfileField::WeightKg(72.5)).unwrap();
        let before = form.profile().clone();

        let err = form.set_profile_field(ProfileField::WeightKg(-3.0)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "Weight", .. }));
        assert_eq!(form.profile(), &before);
    }

    #[test]
    fn severity_is_bounded() {
        let mut form = chest_form();
        assert_eq!(form.profile().severity, DEFAULT_SEVERITY);
        form.set_severity(10).unwrap();
        assert!(form.set_severity(11).is_err());
        assert_eq!(form.profile().severity, 10);
    }

    #[test]
    fn blank_optional_text_is_none() {
        let mut form = chest_form();
        form.set_profile_field(ProfileField::Ethnicity(Some("  ".to_string())))
            .unwrap();
        assert_eq!(form.profile().ethnicity, None);
    }

    #[test]
    fn comorbidities_add_and_remove() {
        let mut form = chest_form();
        let asthma = DiseaseRecord {
            name: "Asthma".to_string(),
            diagnosed_years_ago: 12.0,
            prognosis: Prognosis::Stable,
        };
        let gout = DiseaseRecord {
            name: "Gout".to_string(),
            diagnosed_years_ago: 2.0,
            prognosis: Prognosis::Improving,
        };
        form.add_comorbidity(asthma.clone()).unwrap();
        form.add_comorbidity(gout.clone()).unwrap();

        assert_eq!(form.remove_comorbidity(0).unwrap(), asthma);
        assert_eq!(form.comorbidities(), &[gout]);
        assert!(form.remove_comorbidity(5).is_err());

        let negative = DiseaseRecord {
            diagnosed_years_ago: -1.0,
            ..DiseaseRecord::default()
        };
        assert!(form.add_comorbidity(negative).is_err());
        assert_eq!(form.comorbidities().len(), 1);
    }

    #[test]
    fn profile_field_deserializes_tagged() {
        let field: ProfileField = serde_json::from_str(r#"{"field":"age","value":40}"#).unwrap();
        assert_eq!(field, ProfileField::Age(40));
    }

    #[test]
    fn snapshot_requires_body_area() {
        let form = IntakeForm::new();
        assert_eq!(form.snapshot(&[]), Err(ValidationError::BodyAreaRequired));

        let request = chest_form().snapshot(&[]).unwrap();
        assert_eq!(request.body_area, BodyArea::Chest);
        assert_eq!(request.severity, DEFAULT_SEVERITY);
    }
}
