use shared::Factor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfaError {
    #[error("Factor {0} is not required by this session")]
    FactorNotRequired(Factor),

    #[error("Factor {factor} cannot start until {gate} completes")]
    FactorNotReady { factor: Factor, gate: Factor },

    #[error("Illegal status transition for {factor}: {from} -> {to}")]
    InvalidTransition {
        factor: Factor,
        from: &'static str,
        to: &'static str,
    },

    #[error("Not every required factor has completed")]
    NotAllFactorsComplete,

    #[error("Verifier rejected the session: {0}")]
    VerifierRejected(String),

    #[error("Verifier transport error: {0}")]
    Transport(String),

    #[error("Session already reached a terminal outcome")]
    SessionFinished,
}

pub type Result<T> = std::result::Result<T, MfaError>;
