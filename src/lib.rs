pub mod config;
pub mod gateway; // Patient data access + concurrent gathering
pub mod models;
pub mod verification; // Rule registry, orchestration, scoring, recommendations

use tracing_subscriber::EnvFilter;

pub use gateway::{GatheredData, GatewayError, InMemoryGateway, PatientDataGateway};
pub use verification::{SafetyVerifier, VerificationEngine, VerificationReport};

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} safety engine v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
