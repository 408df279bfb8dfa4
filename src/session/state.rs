use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Which page of the intake the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Welcome,
    BodySelection,
    SymptomSelection,
    Consultation,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Welcome => "welcome",
            SessionPhase::BodySelection => "body selection",
            SessionPhase::SymptomSelection => "symptom selection",
            SessionPhase::Consultation => "consultation",
        };
        f.write_str(label)
    }
}

impl SessionPhase {
    /// The single forward step from this phase; `Consultation` loops back to `Welcome` on restart.
    pub fn successor(self) -> SessionPhase {
        match self {
            SessionPhase::Welcome => SessionPhase::BodySelection,
            SessionPhase::BodySelection => SessionPhase::SymptomSelection,
            SessionPhase::SymptomSelection => SessionPhase::Consultation,
            SessionPhase::Consultation => SessionPhase::Welcome,
        }
    }

    /// Checks the edge only. Preconditions (credential, body area) are the session's job.
    pub fn transition(self, to: SessionPhase) -> Result<SessionPhase, ValidationError> {
        if self.successor() == to {
            Ok(to)
        } else {
            Err(ValidationError::InvalidTransition { from: self, to })
        }
    }

    /// Rejects an operation that belongs to another phase.
    pub fn require(self, expected: SessionPhase, operation: &'static str) -> Result<(), ValidationError> {
        if self == expected {
            Ok(())
        } else {
            Err(ValidationError::WrongPhase {
                operation,
                phase: self,
            })
        }
    }
}
