use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::history::{ConversationHistory, ConversationTurn, PendingTurn};
use super::state::SessionPhase;
use crate::ai::enrichment::{self, TreatmentAdvisor};
use crate::ai::format::format_reply;
use crate::ai::prompt::{build_consultation_prompt, TreatmentReference, PHOTO_ONLY_PROMPT, SYSTEM_PROMPT};
use crate::ai::{AIMessage, AIResponse, ChatGateway};
use crate::config::AppConfig;
use crate::error::{ConsultError, ValidationError};
use crate::intake::patient::{ConsultationRequest, DiseaseRecord, IntakeForm, ProfileField};
use crate::intake::photos::{PhotoAttachment, PhotoStore};
use crate::intake::BodyArea;

/// One patient's pass through intake and consultation. Owns all of its state.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    phase: SessionPhase,
    intake: IntakeForm,
    photos: PhotoStore,
    request: Option<ConsultationRequest>,
    history: ConversationHistory,
    /// Snapshot taken when the intake is submitted; the form is read-only from then on.
    submitted: Option<ConsultationRequest>,
    /// Initial prompt still waiting for a successful delivery.
    opening: Option<PendingTurn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: SessionPhase::Welcome,
            intake: IntakeForm::new(),
            photos: PhotoStore::new(),
            request: None,
            history: ConversationHistory::new(),
            submitted: None,
            opening: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn intake(&self) -> &IntakeForm {
        &self.intake
    }

    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    pub fn request(&self) -> Option<&ConsultationRequest> {
        self.request.as_ref()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn opening(&self) -> Option<&PendingTurn> {
        self.opening.as_ref()
    }

    // ─── Transitions ─────────────────────────────────────────────────────

    pub fn begin_intake(&mut self, config: &AppConfig) -> Result<(), ConsultError> {
        let next = self.phase.transition(SessionPhase::BodySelection)?;
        if !config.has_api_key() {
            return Err(ConsultError::CredentialMissing);
        }
        self.phase = next;
        Ok(())
    }

    pub fn show_symptoms(&mut self) -> Result<(), ConsultError> {
        let next = self.phase.transition(SessionPhase::SymptomSelection)?;
        if self.intake.body_area().is_none() {
            return Err(ValidationError::BodyAreaRequired.into());
        }
        self.phase = next;
        Ok(())
    }

    /// Freezes the intake, clears the conversation and builds the opening turn.
    /// Uses the submitted snapshot when there is one.
    pub fn enter_consultation(&mut self, reference: &TreatmentReference) -> Result<PendingTurn, ConsultError> {
        let next = self.phase.transition(SessionPhase::Consultation)?;
        let request = match self.submitted.take() {
            Some(request) => request,
            None => self.intake.snapshot(self.photos.symptom_photos())?,
        };

        let prompt = build_consultation_prompt(&request, reference);
        let opening = PendingTurn::new(prompt, request.photos.clone());

        log::info!(
            "Session {} entering consultation ({}, {} symptom(s), {} photo(s))",
            self.id,
            request.body_area,
            request.symptoms.len(),
            request.photos.len()
        );

        self.history.clear();
        self.request = Some(request);
        self.opening = Some(opening.clone());
        self.phase = next;
        Ok(opening)
    }

    /// Drops everything and returns to the welcome page under a new id.
    pub fn restart(&mut self) -> Result<(), ConsultError> {
        self.phase.transition(SessionPhase::Welcome)?;
        let previous = self.id;
        *self = Session::new();
        log::info!("Session {} restarted as {}", previous, self.id);
        Ok(())
    }

    // ─── Intake ──────────────────────────────────────────────────────────

    pub fn select_body_area(&mut self, area: BodyArea) -> Result<(), ConsultError> {
        self.phase.require(SessionPhase::BodySelection, "select body area")?;
        self.intake.set_body_area(area);
        Ok(())
    }

    pub fn toggle_symptom(&mut self, symptom: &str) -> Result<bool, ConsultError> {
        self.editable("toggle symptom")?;
        Ok(self.intake.toggle_symptom(symptom)?)
    }

    pub fn set_profile_field(&mut self, field: ProfileField) -> Result<(), ConsultError> {
        self.editable("edit patient details")?;
        Ok(self.intake.set_profile_field(field)?)
    }

    pub fn set_severity(&mut self, severity: u8) -> Result<(), ConsultError> {
        self.editable("set severity")?;
        Ok(self.intake.set_severity(severity)?)
    }

    pub fn set_primary_disease(&mut self, disease: DiseaseRecord) -> Result<(), ConsultError> {
        self.editable("set primary disease")?;
        Ok(self.intake.set_primary_disease(disease)?)
    }

    pub fn add_comorbidity(&mut self, record: DiseaseRecord) -> Result<usize, ConsultError> {
        self.editable("add comorbidity")?;
        Ok(self.intake.add_comorbidity(record)?)
    }

    pub fn remove_comorbidity(&mut self, index: usize) -> Result<DiseaseRecord, ConsultError> {
        self.editable("remove comorbidity")?;
        Ok(self.intake.remove_comorbidity(index)?)
    }

    pub fn set_description(&mut self, description: Option<String>) -> Result<(), ConsultError> {
        self.editable("describe symptoms")?;
        self.intake.set_description(description);
        Ok(())
    }

    pub fn add_symptom_photo(&mut self, photo: PhotoAttachment) -> Result<usize, ConsultError> {
        self.editable("add symptom photo")?;
        Ok(self.photos.add_symptom_photo(photo))
    }

    pub fn remove_symptom_photo(&mut self, index: usize) -> Result<PhotoAttachment, ConsultError> {
        self.editable("remove symptom photo")?;
        Ok(self.photos.remove_symptom_photo(index)?)
    }

    fn editable(&self, operation: &'static str) -> Result<(), ConsultError> {
        self.phase.require(SessionPhase::SymptomSelection, operation)?;
        if self.submitted.is_some() {
            return Err(ValidationError::IntakeSubmitted.into());
        }
        Ok(())
    }

    /// Takes the snapshot the consultation will be built from and locks the form.
    /// Submitting again returns the same snapshot.
    pub fn submit_intake(&mut self) -> Result<ConsultationRequest, ConsultError> {
        self.phase.require(SessionPhase::SymptomSelection, "start consultation")?;
        if let Some(request) = &self.submitted {
            return Ok(request.clone());
        }
        let request = self.intake.snapshot(self.photos.symptom_photos())?;
        self.submitted = Some(request.clone());
        Ok(request)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    /// What the consultation would be built from if it started now.
    pub fn preview_request(&self) -> Result<ConsultationRequest, ConsultError> {
        self.phase.require(SessionPhase::SymptomSelection, "preview consultation")?;
        Ok(self.intake.snapshot(self.photos.symptom_photos())?)
    }

    // ─── Conversation ────────────────────────────────────────────────────

    pub fn attach_photo(&mut self, photo: PhotoAttachment) -> Result<(), ConsultError> {
        self.phase.require(SessionPhase::Consultation, "attach photo")?;
        self.photos.set_current(photo);
        Ok(())
    }

    pub fn remove_photo(&mut self) -> Result<(), ConsultError> {
        self.phase.require(SessionPhase::Consultation, "remove photo")?;
        self.photos.clear_current();
        Ok(())
    }

    /// Turns typed text plus the attached photo into the next user turn.
    pub fn compose_message(&self, text: &str) -> Result<PendingTurn, ConsultError> {
        self.phase.require(SessionPhase::Consultation, "send message")?;
        if self.opening.is_some() {
            return Err(ValidationError::OpeningPending.into());
        }
        let text = text.trim();
        let images: Vec<PhotoAttachment> = self.photos.current().cloned().into_iter().collect();

        if text.is_empty() && images.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let content = if text.is_empty() { PHOTO_ONLY_PROMPT } else { text };
        Ok(PendingTurn::new(content, images))
    }

    pub fn outbound(&self, pending: &PendingTurn) -> Vec<AIMessage> {
        self.history.assemble(SYSTEM_PROMPT, pending)
    }

    /// Appends a delivered turn and its reply, in that order.
    pub fn record_exchange(&mut self, pending: PendingTurn, response: AIResponse) -> &ConversationTurn {
        if self.opening.as_ref() == Some(&pending) {
            self.opening = None;
        }
        let sent_current = self
            .photos
            .current()
            .is_some_and(|photo| pending.images.contains(photo));
        if sent_current {
            self.photos.clear_current();
        }

        let rendered = format_reply(&response.content);
        self.history.append_user(pending);
        self.history.append_assistant(response.content, rendered)
    }
}

/// Releases the busy flag however the request ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shareable handle to a session that allows one outbound request at a time.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    session: Arc<Mutex<Session>>,
    in_flight: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access for intake operations. Never hold this across an await.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<InFlightGuard, ConsultError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(self.in_flight.clone()))
            .map_err(|_| ConsultError::Busy)
    }

    /// Enrichment, then the phase change, then the opening request.
    pub async fn start_consultation<G, A>(
        &self,
        gateway: &G,
        advisor: &A,
        enrichment_timeout: Duration,
    ) -> Result<ConversationTurn, ConsultError>
    where
        G: ChatGateway,
        A: TreatmentAdvisor,
    {
        let _guard = self.acquire()?;

        let request = self.session.lock().submit_intake()?;
        let reference = enrichment::enrich(advisor, &request, enrichment_timeout).await;

        let (generation, opening, messages) = {
            let mut session = self.session.lock();
            let opening = session.enter_consultation(&reference)?;
            let messages = session.outbound(&opening);
            (session.id(), opening, messages)
        };

        self.deliver(gateway, generation, opening, messages).await
    }

    /// Sends the opening turn again after a failed first attempt.
    pub async fn retry_opening<G: ChatGateway>(&self, gateway: &G) -> Result<ConversationTurn, ConsultError> {
        let _guard = self.acquire()?;

        let (generation, opening, messages) = {
            let session = self.session.lock();
            session
                .phase()
                .require(SessionPhase::Consultation, "retry consultation")?;
            let opening = session
                .opening()
                .cloned()
                .ok_or(ValidationError::NoPendingOpening)?;
            let messages = session.outbound(&opening);
            (session.id(), opening, messages)
        };

        self.deliver(gateway, generation, opening, messages).await
    }

    pub async fn send_message<G: ChatGateway>(&self, gateway: &G, text: &str) -> Result<ConversationTurn, ConsultError> {
        let _guard = self.acquire()?;

        let (generation, pending, messages) = {
            let session = self.session.lock();
            let pending = session.compose_message(text)?;
            let messages = session.outbound(&pending);
            (session.id(), pending, messages)
        };

        self.deliver(gateway, generation, pending, messages).await
    }

    async fn deliver<G: ChatGateway>(
        &self,
        gateway: &G,
        generation: Uuid,
        pending: PendingTurn,
        messages: Vec<AIMessage>,
    ) -> Result<ConversationTurn, ConsultError> {
        let response = gateway.complete(&messages).await.map_err(|e| {
            log::error!("Consultation request failed: {}", e);
            ConsultError::from(e)
        })?;

        let mut session = self.session.lock();
        if session.id() != generation {
            log::warn!("Dropping reply for session {} after restart", generation);
            return Err(ConsultError::Stale);
        }
        Ok(session.record_exchange(pending, response).clone())
    }
}
