//! Turns a frozen intake into model prompts.
//!
//! Everything here is pure: the same request and enrichment outcome always
//! produce byte-identical text.

use crate::intake::patient::{ConsultationRequest, DiseaseRecord};

pub const SYSTEM_PROMPT: &str = "You are a professional medical AI assistant. \
Provide helpful, accurate medical guidance while emphasizing the importance of consulting with healthcare professionals. \
Be empathetic, clear, and ask relevant follow-up questions to better understand symptoms. \
Always remind users that your advice is not a substitute for professional medical care. \
Ensure all responses are medically appropriate and safe. \
If images are provided, analyze them carefully and provide relevant medical observations while maintaining appropriate medical boundaries. \
Format your responses with clear sections using **bold headers** for main topics like \"Possible conditions or causes:\", \
\"Immediate care recommendations:\", \"When to seek emergency care:\", and \"Follow-up questions:\". \
Use bullet points (-) for lists and emphasize important information with **bold text**.";

/// Shown before the first reply arrives.
pub const GREETING: &str = "Hello! I'm your AI medical assistant. I've reviewed your symptoms and I'm here to help provide guidance. Let me analyze your condition...";

/// Sent in place of an empty message that only carries a photo.
pub const PHOTO_ONLY_PROMPT: &str = "Please analyze this image and provide medical guidance.";

pub const ENRICHMENT_PLACEHOLDER: &str = "Unavailable";

/// Result of the optional treatment-plan lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreatmentReference {
    Available(String),
    Unavailable,
}

impl TreatmentReference {
    pub fn as_str(&self) -> &str {
        match self {
            TreatmentReference::Available(plan) => plan,
            TreatmentReference::Unavailable => ENRICHMENT_PLACEHOLDER,
        }
    }
}

/// Collapses whitespace and control characters so a field stays on its own line.
fn one_line(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn or_default(value: Option<&str>, fallback: &str) -> String {
    match value.map(one_line) {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn name_or(value: &str, fallback: &str) -> String {
    or_default(Some(value), fallback)
}

fn years(value: f64) -> String {
    if value > 0.0 {
        value.to_string()
    } else {
        "N/A".to_string()
    }
}

fn comorbidity_line(record: &DiseaseRecord) -> String {
    format!(
        "- Name: {}, Diagnosed: {} years ago, Prognosis: {}",
        name_or(&record.name, "N/A"),
        years(record.diagnosed_years_ago),
        record.prognosis
    )
}

/// Builds the first user turn of a consultation.
pub fn build_consultation_prompt(
    request: &ConsultationRequest,
    reference: &TreatmentReference,
) -> String {
    let profile = &request.profile;
    let disease = &request.primary_disease;
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "I am an AI medical assistant. A patient is experiencing symptoms in their {}.\n\n",
        request.body_area.display_name()
    ));

    prompt.push_str("Patient Information:\n");
    prompt.push_str(&format!("- Age: {}\n", profile.age));
    prompt.push_str(&format!("- Gender: {}\n", name_or(&profile.gender, "Not specified")));
    prompt.push_str(&format!(
        "- Intersex Condition: {}\n",
        or_default(profile.intersex_condition.as_deref(), "None")
    ));
    prompt.push_str(&format!(
        "- Ethnicity: {}\n",
        or_default(profile.ethnicity.as_deref(), "Not specified")
    ));
    prompt.push_str(&format!("- Weight: {} kg\n", profile.weight_kg));
    prompt.push_str(&format!("- Height: {} cm\n", profile.height_cm));
    prompt.push_str(&format!(
        "- BMI Category: {}\n\n",
        name_or(&profile.bmi_category, "Not specified")
    ));

    prompt.push_str("Primary Disease:\n");
    prompt.push_str(&format!("- Name: {}\n", name_or(&disease.name, "None")));
    prompt.push_str(&format!(
        "- Diagnosed: {} years ago\n",
        years(disease.diagnosed_years_ago)
    ));
    prompt.push_str(&format!("- Prognosis: {}\n", disease.prognosis));

    if !request.comorbidities.is_empty() {
        prompt.push_str("\nComorbidities:\n");
        for record in &request.comorbidities {
            prompt.push_str(&comorbidity_line(record));
            prompt.push('\n');
        }
    }

    let symptoms = if request.symptoms.is_empty() {
        "No specific symptoms selected".to_string()
    } else {
        request
            .symptoms
            .as_slice()
            .iter()
            .map(|s| one_line(s))
            .collect::<Vec<_>>()
            .join(", ")
    };
    prompt.push_str(&format!("\nSymptoms: {}\n", symptoms));
    prompt.push_str(&format!(
        "Additional description: {}\n",
        or_default(request.description.as_deref(), "No additional description provided")
    ));
    prompt.push_str(&format!("Pain/discomfort level: {}/10\n", request.severity));

    let photo_count = request.photos.len();
    if photo_count > 0 {
        prompt.push_str(&format!(
            "Photos provided: {} image(s) for visual analysis\n",
            photo_count
        ));
    } else {
        prompt.push_str("No photos provided\n");
    }

    prompt.push_str(&format!(
        "Reference treatment plan: {}\n",
        one_line(reference.as_str())
    ));

    prompt.push_str(
        "\nPlease provide:\n\
         1. Possible conditions or causes\n\
         2. Immediate care recommendations\n\
         3. When to seek emergency care\n\
         4. Follow-up questions to better understand the condition\n\n\
         Remember to:\n\
         - Be empathetic and professional\n\
         - Emphasize that this is not a substitute for professional medical care\n\
         - Suggest consulting a healthcare provider for proper diagnosis\n\
         - Ask relevant follow-up questions\n\
         - Provide practical advice for symptom management\n\
         - Ensure all medical advice is safe and appropriate\n",
    );
    if photo_count > 0 {
        prompt.push_str("- Analyze any provided photos for visual symptoms or conditions\n");
    }
    prompt.push_str(
        "\nPlease keep the response concise but comprehensive and ensure it passes content safety checks.",
    );

    prompt
}

/// One-paragraph patient summary for the treatment-plan service.
pub fn build_enrichment_summary(request: &ConsultationRequest) -> String {
    let profile = &request.profile;
    let disease = &request.primary_disease;
    let comorbidities = if request.comorbidities.is_empty() {
        "None".to_string()
    } else {
        request
            .comorbidities
            .iter()
            .map(|c| name_or(&c.name, "N/A"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Patient is {} years old. gender: {}. intersex condition: {}. weight: {} kg. height: {} cm. \
         BMI category: {}. ethnicity: {}. primary disease: {}. diagnosed {} years ago. prognosis: {}. \
         Comorbidities: {}. \
         Generate a treatment plan in JSON format. Use the exact format: \
         Treatment: <treatment_name>, Dosage: <float> mg/day, Percent week administered: <float>%, \
         Indication: <[Primary, Comorbidity, Other]>.",
        profile.age,
        name_or(&profile.gender, "Not specified"),
        or_default(profile.intersex_condition.as_deref(), "None"),
        profile.weight_kg,
        profile.height_cm,
        name_or(&profile.bmi_category, "Not specified"),
        or_default(profile.ethnicity.as_deref(), "Not specified"),
        name_or(&disease.name, "None"),
        years(disease.diagnosed_years_ago),
        disease.prognosis,
        comorbidities,
    )
}
