//! Optional treatment-plan lookup from an external model service.
//!
//! Best effort only: every failure degrades to [`TreatmentReference::Unavailable`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::prompt::{build_enrichment_summary, TreatmentReference};
use crate::config::AppConfig;
use crate::intake::patient::ConsultationRequest;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("no enrichment service configured")]
    NotConfigured,

    #[error("enrichment request failed: {0}")]
    Request(String),

    #[error("enrichment service answered {0}")]
    Status(u16),

    #[error("enrichment response unreadable: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize)]
struct TreatmentRequest<'a> {
    patient: &'a str,
}

#[derive(Debug, Deserialize)]
struct TreatmentResponse {
    treatment_plan: Option<String>,
}

/// Source of a reference treatment plan for a patient summary.
pub trait TreatmentAdvisor {
    fn treatment_plan(
        &self,
        patient_summary: &str,
    ) -> impl Future<Output = Result<String, EnrichmentError>> + Send;
}

/// Advisor that never has anything to say.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl TreatmentAdvisor for NoEnrichment {
    async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
        Err(EnrichmentError::NotConfigured)
    }
}

/// HTTP client for the `generate-treatment` service.
#[derive(Debug, Clone)]
pub struct TreatmentPlanClient {
    client: Client,
    url: Option<String>,
}

impl TreatmentPlanClient {
    pub fn new(config: &AppConfig) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(config.enrichment_timeout())
            .build()
            .map_err(|e| EnrichmentError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: config.enrichment_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }
}

impl TreatmentAdvisor for TreatmentPlanClient {
    async fn treatment_plan(&self, patient_summary: &str) -> Result<String, EnrichmentError> {
        let url = self.url.as_deref().ok_or(EnrichmentError::NotConfigured)?;

        let response = self
            .client
            .post(url)
            .json(&TreatmentRequest {
                patient: patient_summary,
            })
            .send()
            .await
            .map_err(|e| EnrichmentError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        let body: TreatmentResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))?;

        body.treatment_plan
            .map(|plan| strip_output_marker(&plan))
            .filter(|plan| !plan.is_empty())
            .ok_or_else(|| EnrichmentError::Parse("missing treatment_plan".to_string()))
    }
}

/// Keeps only what follows the first `Output:` marker, if any.
pub fn strip_output_marker(plan: &str) -> String {
    match plan.split_once("Output:") {
        Some((_, rest)) => rest.trim().to_string(),
        None => plan.trim().to_string(),
    }
}

/// Asks the advisor for a plan, bounded by `timeout`. Never fails.
pub async fn enrich<A: TreatmentAdvisor>(
    advisor: &A,
    request: &ConsultationRequest,
    timeout: Duration,
) -> TreatmentReference {
    let summary = build_enrichment_summary(request);
    match tokio::time::timeout(timeout, advisor.treatment_plan(&summary)).await {
        Ok(Ok(plan)) => {
            log::info!("Treatment reference received ({} characters)", plan.len());
            TreatmentReference::Available(plan)
        }
        Ok(Err(EnrichmentError::NotConfigured)) => {
            log::debug!("Treatment enrichment skipped: not configured");
            TreatmentReference::Unavailable
        }
        Ok(Err(e)) => {
            log::warn!("Treatment enrichment unavailable: {}", e);
            TreatmentReference::Unavailable
        }
        Err(_) => {
            log::warn!(
                "Treatment enrichment timed out after {} seconds",
                timeout.as_secs()
            );
            TreatmentReference::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::patient::IntakeForm;
    use crate::intake::BodyArea;

    struct FixedAdvisor(&'static str);

    impl TreatmentAdvisor for FixedAdvisor {
        async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingAdvisor;

    impl TreatmentAdvisor for FailingAdvisor {
        async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
            Err(EnrichmentError::Status(502))
        }
    }

    struct StalledAdvisor;

    impl TreatmentAdvisor for StalledAdvisor {
        async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    fn request() -> ConsultationRequest {
        let mut form = IntakeForm::new();
        form.set_body_area(BodyArea::Head);
        form.snapshot(&[]).unwrap()
    }

    #[test]
    fn keeps_text_after_output_marker() {
        assert_eq!(
            strip_output_marker("Input: ... Output:  Treatment: Rest, Dosage: 0 mg/day "),
            "Treatment: Rest, Dosage: 0 mg/day"
        );
        assert_eq!(strip_output_marker(" plain plan "), "plain plan");
    }

    #[tokio::test]
    async fn successful_plan_is_used() {
        let reference = enrich(&FixedAdvisor("Ibuprofen"), &request(), Duration::from_secs(1)).await;
        assert_eq!(reference, TreatmentReference::Available("Ibuprofen".to_string()));
    }

    #[tokio::test]
    async fn failure_degrades_to_placeholder() {
        let reference = enrich(&FailingAdvisor, &request(), Duration::from_secs(1)).await;
        assert_eq!(reference, TreatmentReference::Unavailable);
        assert_eq!(reference.as_str(), "Unavailable");

        let reference = enrich(&NoEnrichment, &request(), Duration::from_secs(1)).await;
        assert_eq!(reference, TreatmentReference::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_service_times_out() {
        let reference = enrich(&StalledAdvisor, &request(), Duration::from_secs(5)).await;
        assert_eq!(reference, TreatmentReference::Unavailable);
    }

    #[tokio::test]
    async fn unconfigured_client_is_not_configured() {
        let client = TreatmentPlanClient::new(&AppConfig::default()).unwrap();
        let result = client.treatment_plan("summary").await;
        assert!(matches!(result, Err(EnrichmentError::NotConfigured)));
    }
}
