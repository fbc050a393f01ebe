//! # Provider Registry
//!
//! Static registry mapping a composite `"provider/generic-name"` model
//! identifier to a provider descriptor. Loaded once at startup from
//! configuration and shared read-only across all request pipelines; there
//! is no runtime mutation after the server starts.

use crate::{config::Config, error::GatewayError};
use std::collections::HashMap;
use std::sync::Arc;

/// Authentication scheme a provider requires on outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <credential>`
    Bearer,
    /// Signed custom header set (nonce/timestamp/sign/device-id/os-type/sid)
    SignedHeaders,
    /// No authentication
    None,
}

impl AuthScheme {
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "bearer" => Ok(AuthScheme::Bearer),
            "signed" => Ok(AuthScheme::SignedHeaders),
            "none" => Ok(AuthScheme::None),
            other => Err(GatewayError::Configuration(format!(
                "unknown auth scheme '{}' (expected bearer, signed, or none)",
                other
            ))),
        }
    }
}

/// # Provider Descriptor
///
/// Identity, endpoint, auth scheme, and model mapping for one backend.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Registry key, the prefix of composite model names
    pub name: String,
    /// Base endpoint URL for chat requests
    pub base_url: String,
    pub auth: AuthScheme,
    /// Bearer token or signing secret, depending on the scheme
    pub credential: Option<String>,
    /// Device identity sent with signed requests
    pub device_id: String,
    pub os_type: String,
    pub session_id: Option<String>,
    /// Unsigned request decoration for signed-body providers
    pub search_mode: String,
    pub expert: bool,
    pub plugins: Vec<String>,
    pub language: String,
    /// Fallback backend model when the generic name has no mapping
    pub default_model: String,
    /// Generic model name -> provider-specific model identifier
    pub model_map: HashMap<String, String>,
}

impl ProviderDescriptor {
    /// Translate a generic model name to this provider's identifier.
    /// Unmapped names pass through unchanged; an empty generic name falls
    /// back to the provider default.
    pub fn resolve_model(&self, generic: &str) -> String {
        if generic.is_empty() {
            return self.default_model.clone();
        }
        self.model_map
            .get(generic)
            .cloned()
            .unwrap_or_else(|| generic.to_string())
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.base_url.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "provider '{}' has no base URL",
                self.name
            )));
        }
        match self.auth {
            AuthScheme::Bearer if self.credential.is_none() => {
                Err(GatewayError::Configuration(format!(
                    "provider '{}' uses bearer auth but no credential is configured",
                    self.name
                )))
            }
            AuthScheme::SignedHeaders if self.credential.is_none() => {
                Err(GatewayError::Configuration(format!(
                    "provider '{}' uses signed-header auth but no signing secret is configured",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// # Provider Registry
///
/// Read-only lookup from provider name to descriptor. Descriptors are held
/// behind `Arc` so concurrent pipelines share one copy.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderDescriptor>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from startup configuration. The configured
    /// backend becomes both a named provider and the default for model
    /// identifiers without a provider prefix.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let descriptor = ProviderDescriptor {
            name: config.provider_name.clone(),
            base_url: config.backend_url.clone(),
            auth: AuthScheme::parse(&config.auth_scheme)?,
            credential: config.backend_credential.clone(),
            device_id: config.device_id.clone(),
            os_type: config.os_type.clone(),
            session_id: config.session_id.clone(),
            search_mode: config.search_mode.clone(),
            expert: config.expert_mode,
            plugins: config
                .plugins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            language: config.language.clone(),
            default_model: config.model_id.clone(),
            model_map: HashMap::new(),
        };

        let mut registry = Self::new();
        registry.register(descriptor)?;
        Ok(registry)
    }

    /// Register a provider. The first registered provider becomes the
    /// default for unprefixed model names.
    pub fn register(&mut self, descriptor: ProviderDescriptor) -> Result<(), GatewayError> {
        descriptor.validate()?;
        if self.default_provider.is_none() {
            self.default_provider = Some(descriptor.name.clone());
        }
        self.providers
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Resolve a composite `"provider/generic-name"` identifier into a
    /// descriptor plus the provider-specific model name. An identifier
    /// without a slash resolves against the default provider.
    pub fn resolve(
        &self,
        composite: &str,
    ) -> Result<(Arc<ProviderDescriptor>, String), GatewayError> {
        let (provider_name, generic) = match composite.split_once('/') {
            Some((p, m)) => (p.to_string(), m.to_string()),
            None => {
                let default = self.default_provider.clone().ok_or_else(|| {
                    GatewayError::Configuration("no providers registered".to_string())
                })?;
                (default, composite.to_string())
            }
        };

        let descriptor = self.providers.get(&provider_name).cloned().ok_or_else(|| {
            GatewayError::Configuration(format!("unknown provider '{}'", provider_name))
        })?;

        let model = descriptor.resolve_model(&generic);
        Ok((descriptor, model))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
