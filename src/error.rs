use thiserror::Error;

use crate::session::state::SessionPhase;

/// Local input problems. Reported to the user; never change state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please select an image file (got {content_type}).")]
    NotAnImage { content_type: String },

    #[error("Image size must be less than 5MB ({size_bytes} bytes given).")]
    PhotoTooLarge { size_bytes: u64 },

    #[error("Could not read the photo: {0}")]
    PhotoUnreadable(String),

    #[error("There is no photo at position {index} (only {len} attached).")]
    PhotoIndexOutOfRange { index: usize, len: usize },

    #[error("Cannot move from {from} to {to}.")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error("'{operation}' is not available during {phase}.")]
    WrongPhase {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("Please select a body area first.")]
    BodyAreaRequired,

    #[error("'{symptom}' is not a symptom of the {area}.")]
    UnknownSymptom { symptom: String, area: String },

    #[error("{field} must be {expected}.")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
    },

    #[error("There is no comorbidity at position {index} (only {len} recorded).")]
    ComorbidityIndexOutOfRange { index: usize, len: usize },

    #[error("Type a message or attach a photo first.")]
    EmptyMessage,

    #[error("The consultation is already under way; send a message instead.")]
    NoPendingOpening,

    #[error("The consultation has not reached the assistant yet. Retry it before asking anything else.")]
    OpeningPending,

    #[error("The intake was already submitted and can no longer be changed.")]
    IntakeSubmitted,
}

/// Failures of a single chat-completion call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Please configure your API key to continue the conversation.")]
    CredentialMissing,

    #[error("Sorry, I encountered an error while processing your request. Please check your API key.")]
    Unauthorized,

    #[error("Sorry, I encountered an error while processing your request. Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("Sorry, I encountered an error while processing your request. Please try again later. ({0})")]
    Unreachable(String),

    #[error("Sorry, the assistant sent a reply I could not read. Please try again. ({0})")]
    MalformedResponse(String),
}

/// Everything a session operation can report to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Please configure your API key first.")]
    CredentialMissing,

    #[error("A request is already in progress. Please wait for the reply.")]
    Busy,

    #[error("The session was restarted before the reply arrived.")]
    Stale,

    #[error(transparent)]
    Gateway(GatewayError),
}

impl From<GatewayError> for ConsultError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::CredentialMissing => ConsultError::CredentialMissing,
            other => ConsultError::Gateway(other),
        }
    }
}
