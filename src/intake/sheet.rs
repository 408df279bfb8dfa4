use serde::{Deserialize, Serialize};
use std::path::Path;

use super::patient::{DiseaseRecord, PatientProfile, ProfileField};
use super::BodyArea;
use crate::error::ConsultError;
use crate::session::manager::Session;

/// A whole intake form written down as JSON, for non-interactive use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSheet {
    pub body_area: BodyArea,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub profile: PatientProfile,
    #[serde(default)]
    pub primary_disease: DiseaseRecord,
    #[serde(default)]
    pub comorbidities: Vec<DiseaseRecord>,
    pub severity: Option<u8>,
    pub description: Option<String>,
}

impl IntakeSheet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Fills the session from body selection through to the symptom page.
    /// All or nothing: a rejected field leaves the session untouched.
    pub fn apply(&self, session: &mut Session) -> Result<(), ConsultError> {
        let mut draft = session.clone();
        self.fill(&mut draft)?;
        *session = draft;
        Ok(())
    }

    fn fill(&self, session: &mut Session) -> Result<(), ConsultError> {
        session.select_body_area(self.body_area)?;
        session.show_symptoms()?;

        for symptom in &self.symptoms {
            if !session.intake().symptoms().contains(symptom) {
                session.toggle_symptom(symptom)?;
            }
        }

        let profile = &self.profile;
        let mut fields = vec![
            ProfileField::Age(profile.age),
            ProfileField::Gender(profile.gender.clone()),
            ProfileField::IntersexCondition(profile.intersex_condition.clone()),
            ProfileField::Ethnicity(profile.ethnicity.clone()),
            ProfileField::BmiCategory(profile.bmi_category.clone()),
        ];
        // Zero means "not entered" for the measurements.
        if profile.weight_kg > 0.0 {
            fields.push(ProfileField::WeightKg(profile.weight_kg));
        }
        if profile.height_cm > 0.0 {
            fields.push(ProfileField::HeightCm(profile.height_cm));
        }
        for field in fields {
            session.set_profile_field(field)?;
        }

        session.set_severity(self.severity.unwrap_or(profile.severity))?;
        session.set_primary_disease(self.primary_disease.clone())?;
        for record in &self.comorbidities {
            session.add_comorbidity(record.clone())?;
        }
        session.set_description(self.description.clone())?;
        Ok(())
    }
}
