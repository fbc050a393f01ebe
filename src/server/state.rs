//! # Application State
//!
//! Shared state passed to all HTTP handlers: configuration, the provider
//! registry, the signing oracle, and the backend HTTP client. Everything
//! here is read-only after startup and cheap to clone per request.

use crate::{
    config::Config,
    core::http_client::HttpClientBuilder,
    error::GatewayError,
    registry::ProviderRegistry,
    signing::{HmacSigner, Signer, UnconfiguredSigner},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<ProviderRegistry>,
    signer: Arc<dyn Signer>,
    http_client: reqwest::Client,
}

impl AppState {
    /// Create application state from configuration. Fails fast on registry
    /// or client construction problems so misconfiguration never reaches
    /// request handling.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        let registry = ProviderRegistry::from_config(&config)?;

        // The oracle is only exercised by signed-header providers; other
        // schemes get a signer that fails loudly if ever invoked.
        let signer: Arc<dyn Signer> = if config.auth_scheme == "signed" {
            let secret = config.backend_credential.as_deref().ok_or_else(|| {
                GatewayError::Configuration(
                    "signed auth scheme requires a signing secret".to_string(),
                )
            })?;
            Arc::new(HmacSigner::new(secret)?)
        } else {
            Arc::new(UnconfiguredSigner)
        };

        let http_client = HttpClientBuilder::from_config(&config)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            signer,
            http_client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn signer(&self) -> Arc<dyn Signer> {
        self.signer.clone()
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_creation() {
        let state = AppState::new(Config::for_test()).unwrap();
        assert_eq!(state.registry().provider_names(), vec!["primary"]);
    }

    #[test]
    fn test_signed_scheme_without_secret_fails() {
        let mut config = Config::for_test();
        config.auth_scheme = "signed".to_string();
        assert!(AppState::new(config).is_err());
    }

    #[test]
    fn test_signed_scheme_with_secret_builds_signer() {
        let mut config = Config::for_test();
        config.auth_scheme = "signed".to_string();
        config.backend_credential = Some("topsecret".to_string());
        let state = AppState::new(config).unwrap();
        assert!(state.signer().sign("n", 0, "d", "c").is_ok());
    }
}
