use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use aegis_doctor_lib::ai::enrichment::{EnrichmentError, NoEnrichment, TreatmentAdvisor};
use aegis_doctor_lib::ai::prompt::SYSTEM_PROMPT;
use aegis_doctor_lib::ai::{AIMessage, AIResponse, ChatGateway, Role};
use aegis_doctor_lib::config::AppConfig;
use aegis_doctor_lib::error::{ConsultError, GatewayError, ValidationError};
use aegis_doctor_lib::intake::photos::PhotoAttachment;
use aegis_doctor_lib::intake::BodyArea;
use aegis_doctor_lib::session::history::Speaker;
use aegis_doctor_lib::session::manager::SessionManager;
use aegis_doctor_lib::session::state::SessionPhase;
use parking_lot::Mutex;
use tokio::sync::Notify;

fn reply(text: &str) -> AIResponse {
    AIResponse {
        content: text.to_string(),
        model: "test-model".to_string(),
        timestamp: String::new(),
    }
}

fn photo() -> PhotoAttachment {
    PhotoAttachment::new("image/png", b"\x89PNG fake").unwrap()
}

/// Answers from a queue, then "ok" forever. Records every request.
#[derive(Clone, Default)]
struct ScriptedGateway {
    replies: Arc<Mutex<VecDeque<Result<AIResponse, GatewayError>>>>,
    calls: Arc<Mutex<Vec<Vec<AIMessage>>>>,
}

impl ScriptedGateway {
    fn queue(&self, outcome: Result<AIResponse, GatewayError>) {
        self.replies.lock().push_back(outcome);
    }

    fn calls(&self) -> Vec<Vec<AIMessage>> {
        self.calls.lock().clone()
    }

    fn last_call(&self) -> Vec<AIMessage> {
        self.calls.lock().last().cloned().unwrap()
    }
}

impl ChatGateway for ScriptedGateway {
    async fn complete(&self, messages: &[AIMessage]) -> Result<AIResponse, GatewayError> {
        self.calls.lock().push(messages.to_vec());
        self.replies.lock().pop_front().unwrap_or_else(|| Ok(reply("ok")))
    }
}

/// Holds every request until released.
#[derive(Clone, Default)]
struct GatedGateway {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl ChatGateway for GatedGateway {
    async fn complete(&self, _messages: &[AIMessage]) -> Result<AIResponse, GatewayError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(reply("late reply"))
    }
}

struct FixedAdvisor(&'static str);

impl TreatmentAdvisor for FixedAdvisor {
    async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
        Ok(self.0.to_string())
    }
}

/// Tries to edit the intake while the plan is being looked up.
struct EditingAdvisor {
    manager: SessionManager,
    edits: Mutex<Vec<bool>>,
}

impl TreatmentAdvisor for EditingAdvisor {
    async fn treatment_plan(&self, _patient_summary: &str) -> Result<String, EnrichmentError> {
        let accepted = {
            let mut session = self.manager.lock();
            [
                session.toggle_symptom("Wheezing").is_ok(),
                session.set_severity(1).is_ok(),
            ]
        };
        self.edits.lock().extend(accepted);
        Ok("Inhaler as needed".to_string())
    }
}

fn config() -> AppConfig {
    AppConfig {
        api_key: "gsk_test".to_string(),
        ..AppConfig::default()
    }
}

fn fill_intake(manager: &SessionManager) {
    let mut session = manager.lock();
    session.begin_intake(&config()).unwrap();
    session.select_body_area(BodyArea::Chest).unwrap();
    session.show_symptoms().unwrap();
    session.toggle_symptom("Cough").unwrap();
    session.set_severity(7).unwrap();
}

async fn consulting(gateway: &ScriptedGateway) -> SessionManager {
    let manager = SessionManager::new();
    fill_intake(&manager);
    manager
        .start_consultation(gateway, &NoEnrichment, Duration::from_secs(1))
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn opening_request_carries_system_prompt_and_intake() {
    let gateway = ScriptedGateway::default();
    gateway.queue(Ok(reply("**Possible conditions or causes:**\n- Bronchitis")));
    let manager = SessionManager::new();
    fill_intake(&manager);

    let turn = manager
        .start_consultation(&gateway, &FixedAdvisor("Rest and fluids"), Duration::from_secs(1))
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    assert_eq!(calls[0][0].role, Role::System);
    assert_eq!(calls[0][0].text_content(), SYSTEM_PROMPT);
    assert_eq!(calls[0][1].role, Role::User);
    let prompt = calls[0][1].text_content();
    assert!(prompt.contains("Symptoms: Cough"));
    assert!(prompt.contains("Reference treatment plan: Rest and fluids"));

    assert_eq!(turn.seq, 2);
    assert_eq!(turn.speaker, Speaker::Assistant);
    let html = turn.rendered.as_ref().unwrap().to_html();
    assert!(html.contains("<li>Bronchitis</li>"));

    let session = manager.lock();
    assert_eq!(session.phase(), SessionPhase::Consultation);
    assert_eq!(session.history().len(), 2);
    assert!(session.opening().is_none());
}

#[tokio::test]
async fn missing_enrichment_is_marked_unavailable() {
    let gateway = ScriptedGateway::default();
    consulting(&gateway).await;
    let prompt = gateway.calls()[0][1].text_content();
    assert!(prompt.contains("Reference treatment plan: Unavailable"));
}

#[tokio::test]
async fn symptom_photos_travel_with_the_opening() {
    let gateway = ScriptedGateway::default();
    let manager = SessionManager::new();
    fill_intake(&manager);
    manager.lock().add_symptom_photo(photo()).unwrap();

    manager
        .start_consultation(&gateway, &NoEnrichment, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(gateway.calls()[0][1].has_images());
}

#[tokio::test]
async fn failed_opening_can_be_retried_once() {
    let gateway = ScriptedGateway::default();
    gateway.queue(Err(GatewayError::Unreachable("connection refused".to_string())));
    let manager = SessionManager::new();
    fill_intake(&manager);

    let err = manager
        .start_consultation(&gateway, &NoEnrichment, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsultError::Gateway(GatewayError::Unreachable(_))));
    {
        let session = manager.lock();
        assert_eq!(session.phase(), SessionPhase::Consultation);
        assert!(session.history().is_empty());
        assert!(session.opening().is_some());
    }

    let turn = manager.retry_opening(&gateway).await.unwrap();
    assert_eq!(turn.seq, 2);
    assert_eq!(gateway.calls()[0], gateway.calls()[1]);
    assert_eq!(
        manager.retry_opening(&gateway).await.unwrap_err(),
        ConsultError::Validation(ValidationError::NoPendingOpening)
    );
}

#[tokio::test]
async fn intake_is_frozen_before_enrichment() {
    let gateway = ScriptedGateway::default();
    let manager = SessionManager::new();
    fill_intake(&manager);
    let advisor = EditingAdvisor {
        manager: manager.clone(),
        edits: Mutex::new(Vec::new()),
    };

    manager
        .start_consultation(&gateway, &advisor, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(*advisor.edits.lock(), vec![false, false]);
    let session = manager.lock();
    let request = session.request().unwrap();
    assert_eq!(request.symptoms.as_slice(), ["Cough"]);
    assert_eq!(request.severity, 7);
    let prompt = gateway.calls()[0][1].text_content();
    assert!(prompt.contains("Reference treatment plan: Inhaler as needed"));
    assert!(!prompt.contains("Wheezing"));
}

#[tokio::test]
async fn follow_up_waits_until_the_opening_is_delivered() {
    let gateway = ScriptedGateway::default();
    gateway.queue(Err(GatewayError::Unreachable("connection refused".to_string())));
    let manager = SessionManager::new();
    fill_intake(&manager);
    assert!(manager
        .start_consultation(&gateway, &NoEnrichment, Duration::from_secs(1))
        .await
        .is_err());

    let err = manager.send_message(&gateway, "is this serious?").await.unwrap_err();
    assert_eq!(err, ConsultError::Validation(ValidationError::OpeningPending));
    assert_eq!(gateway.calls().len(), 1);
    assert!(manager.lock().history().is_empty());

    manager.retry_opening(&gateway).await.unwrap();
    manager.send_message(&gateway, "is this serious?").await.unwrap();

    let session = manager.lock();
    let turns = session.history().turns();
    assert_eq!(turns.len(), 4);
    assert!(turns[0].content.contains("Symptoms: Cough"));
    assert_eq!(turns[2].content, "is this serious?");
}

#[tokio::test]
async fn failed_send_leaves_history_and_photo_alone() {
    let gateway = ScriptedGateway::default();
    let manager = consulting(&gateway).await;
    manager.lock().attach_photo(photo()).unwrap();

    gateway.queue(Err(GatewayError::RateLimited));
    let err = manager.send_message(&gateway, "What is this rash?").await.unwrap_err();
    assert_eq!(err, ConsultError::Gateway(GatewayError::RateLimited));
    assert!(err.to_string().contains("Rate limit exceeded"));
    assert!(!manager.is_busy());
    {
        let session = manager.lock();
        assert_eq!(session.history().len(), 2);
        assert!(session.photos().current().is_some());
    }

    manager.send_message(&gateway, "What is this rash?").await.unwrap();
    let session = manager.lock();
    assert_eq!(session.history().len(), 4);
    assert!(session.photos().current().is_none());
}

#[tokio::test]
async fn photo_goes_only_with_the_message_it_was_attached_to() {
    let gateway = ScriptedGateway::default();
    let manager = consulting(&gateway).await;

    manager.lock().attach_photo(photo()).unwrap();
    manager.send_message(&gateway, "look at this").await.unwrap();
    assert!(gateway.last_call().last().unwrap().has_images());

    manager.send_message(&gateway, "and now?").await.unwrap();
    let call = gateway.last_call();
    assert!(!call.last().unwrap().has_images());
    // The earlier turn keeps its image inside the window.
    assert_eq!(call[3].text_content(), "look at this");
    assert!(call[3].has_images());
}

#[tokio::test]
async fn only_the_last_ten_turns_are_resent() {
    let gateway = ScriptedGateway::default();
    let manager = consulting(&gateway).await;
    for i in 1..=6 {
        manager
            .send_message(&gateway, &format!("message {}", i))
            .await
            .unwrap();
    }
    assert_eq!(manager.lock().history().len(), 14);

    manager.send_message(&gateway, "message 7").await.unwrap();
    let call = gateway.last_call();
    assert_eq!(call.len(), 12);
    assert_eq!(call[0].role, Role::System);
    assert_eq!(call[1].text_content(), "message 2");
    assert_eq!(call[11].text_content(), "message 7");
}

#[tokio::test]
async fn second_request_while_waiting_is_busy() {
    let scripted = ScriptedGateway::default();
    let manager = consulting(&scripted).await;
    let gate = GatedGateway::default();

    let first = manager.send_message(&gate, "first");
    let second = async {
        gate.entered.notified().await;
        assert!(manager.is_busy());
        let result = manager.send_message(&gate, "second").await;
        gate.release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().content, "late reply");
    assert_eq!(second.unwrap_err(), ConsultError::Busy);
    assert!(!manager.is_busy());
    assert_eq!(manager.lock().history().len(), 4);
}

#[tokio::test]
async fn reply_after_restart_is_dropped() {
    let scripted = ScriptedGateway::default();
    let manager = consulting(&scripted).await;
    let gate = GatedGateway::default();

    let pending = manager.send_message(&gate, "hello?");
    let restart = async {
        gate.entered.notified().await;
        manager.lock().restart().unwrap();
        gate.release.notify_one();
    };
    let (outcome, ()) = tokio::join!(pending, restart);

    assert_eq!(outcome.unwrap_err(), ConsultError::Stale);
    assert!(!manager.is_busy());
    let session = manager.lock();
    assert_eq!(session.phase(), SessionPhase::Welcome);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn restart_allows_a_fresh_intake() {
    let gateway = ScriptedGateway::default();
    let manager = consulting(&gateway).await;
    manager.send_message(&gateway, "thanks").await.unwrap();
    let old_id = manager.lock().id();

    manager.lock().restart().unwrap();
    fill_intake(&manager);
    manager
        .start_consultation(&gateway, &NoEnrichment, Duration::from_secs(1))
        .await
        .unwrap();

    let session = manager.lock();
    assert_ne!(session.id(), old_id);
    assert_eq!(session.history().len(), 2);
    assert_eq!(gateway.last_call().len(), 2);
}
