pub mod config;
pub mod error;
pub mod logging;
pub mod models;

pub use config::MfaConfig;
pub use error::{Error, Result};
pub use models::{Factor, FactorProof, FactorStatus, SessionOutcome};
