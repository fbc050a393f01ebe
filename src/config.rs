#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::env;

/// # ChatConduit Configuration
///
/// Configuration system supporting command-line arguments, environment
/// variables, and .env file loading. Initialized once at startup and
/// consumed read-only thereafter.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "chatconduit"))]
#[cfg_attr(feature = "cli", command(about = "A gateway that adapts heterogeneous backend chat APIs to one canonical chat-completions protocol"))]
#[cfg_attr(feature = "cli", command(version))]
pub struct Config {
    // =============================================================================
    // CORE SERVER CONFIGURATION
    // =============================================================================

    /// Server port to listen on
    #[cfg_attr(feature = "cli", arg(short, long, env = "PORT", default_value = "8080"))]
    pub port: u16,

    /// Server host to bind to
    #[cfg_attr(feature = "cli", arg(long, env = "HOST", default_value = "0.0.0.0"))]
    pub host: String,

    // =============================================================================
    // BACKEND PROVIDER CONFIGURATION
    // =============================================================================

    /// Backend chat endpoint URL
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_BACKEND_URL", default_value = "http://localhost:8000/api/chat"))]
    pub backend_url: String,

    /// Registry name for the configured backend (prefix of composite model names)
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_PROVIDER", default_value = "primary"))]
    pub provider_name: String,

    /// Backend auth scheme (bearer, signed, none)
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_AUTH_SCHEME", default_value = "none"))]
    pub auth_scheme: String,

    /// Backend credential: bearer token, or signing secret for signed-header auth
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_CREDENTIAL"))]
    pub backend_credential: Option<String>,

    /// Default backend model identifier
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_MODEL", default_value = "standard"))]
    pub model_id: String,

    // =============================================================================
    // SIGNED-REQUEST IDENTITY
    // =============================================================================

    /// Device identifier sent with signed requests
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_DEVICE_ID", default_value = "chatconduit-device"))]
    pub device_id: String,

    /// OS type header value for signed requests
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_OS_TYPE", default_value = "linux"))]
    pub os_type: String,

    /// Optional session identifier for signed requests
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_SESSION_ID"))]
    pub session_id: Option<String>,

    /// Search mode sent in the unsigned request decoration
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_SEARCH_MODE", default_value = "all"))]
    pub search_mode: String,

    /// Request expert-level answers from the backend
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_EXPERT_MODE", default_value = "false"))]
    pub expert_mode: bool,

    /// Comma-separated plugin identifiers forwarded to the backend
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_PLUGINS", default_value = ""))]
    pub plugins: String,

    /// Answer language hint forwarded to the backend
    #[cfg_attr(feature = "cli", arg(long, env = "CONDUIT_LANGUAGE", default_value = "All"))]
    pub language: String,

    // =============================================================================
    // PERFORMANCE AND STREAMING
    // =============================================================================

    /// HTTP client timeout in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "HTTP_CLIENT_TIMEOUT", default_value = "300"))]
    pub http_client_timeout: u64,

    /// Maximum connections per host
    #[cfg_attr(feature = "cli", arg(long, env = "HTTP_CLIENT_MAX_CONNECTIONS_PER_HOST", default_value = "10"))]
    pub http_client_max_connections_per_host: usize,

    /// Reasoning buffer flush threshold in bytes
    #[cfg_attr(feature = "cli", arg(long, env = "REASONING_FLUSH_BYTES", default_value = "64"))]
    pub reasoning_flush_bytes: usize,

    /// Reasoning buffer flush interval in milliseconds
    #[cfg_attr(feature = "cli", arg(long, env = "REASONING_FLUSH_INTERVAL_MS", default_value = "250"))]
    pub reasoning_flush_interval_ms: u64,

    /// Streaming keep-alive interval in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "STREAMING_KEEP_ALIVE_INTERVAL", default_value = "15"))]
    pub streaming_keep_alive_interval: u64,

    // =============================================================================
    // LOGGING AND MONITORING
    // =============================================================================

    /// Log level (error, warn, info, debug, trace)
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_LOG", default_value = "info"))]
    pub log_level: String,

    /// Enable backtrace on panic
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_BACKTRACE"))]
    pub rust_backtrace: Option<String>,

    /// Environment (development, staging, production)
    #[cfg_attr(feature = "cli", arg(long, env = "ENVIRONMENT", default_value = "development"))]
    pub environment: String,
}

impl Config {
    /// Parse configuration from command line arguments and environment
    /// variables.
    ///
    /// This method:
    /// 1. Loads environment variables from .env file if it exists
    /// 2. Parses command line arguments
    /// 3. Sets up logging
    /// 4. Validates configuration
    #[cfg(feature = "cli")]
    pub fn parse_args() -> Self {
        // Load .env file if it exists (ignore errors if file doesn't exist)
        let _ = dotenv::dotenv();

        let config = Self::parse();

        config.setup_logging();

        if let Err(err) = config.validate() {
            eprintln!("Configuration validation failed: {}", err);
            std::process::exit(1);
        }

        config
    }

    /// Create a test configuration with minimal required fields.
    pub fn for_test() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            backend_url: "http://localhost:8000/api/chat".to_string(),
            provider_name: "primary".to_string(),
            auth_scheme: "none".to_string(),
            backend_credential: None,
            model_id: "standard".to_string(),
            device_id: "test-device".to_string(),
            os_type: "linux".to_string(),
            session_id: None,
            search_mode: "all".to_string(),
            expert_mode: false,
            plugins: String::new(),
            language: "All".to_string(),
            http_client_timeout: 30,
            http_client_max_connections_per_host: 10,
            reasoning_flush_bytes: 64,
            reasoning_flush_interval_ms: 250,
            streaming_keep_alive_interval: 15,
            log_level: "info".to_string(),
            rust_backtrace: None,
            environment: "development".to_string(),
        }
    }

    /// Set up logging based on the configured level.
    #[cfg(feature = "cli")]
    fn setup_logging(&self) {
        if let Some(backtrace) = &self.rust_backtrace {
            env::set_var("RUST_BACKTRACE", backtrace);
        }

        let _ = tracing_subscriber::fmt()
            .with_env_filter(&self.log_level)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init();
    }

    /// Validate configuration values and provide helpful error messages.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0. Please specify a valid port number (1-65535).".to_string());
        }

        if self.host.is_empty() {
            return Err("Host cannot be empty.".to_string());
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err(format!(
                "Backend URL must start with http:// or https:// (got '{}')",
                self.backend_url
            ));
        }

        match self.auth_scheme.as_str() {
            "bearer" | "signed" => {
                if self.backend_credential.is_none() {
                    return Err(format!(
                        "Auth scheme '{}' requires a credential (CONDUIT_CREDENTIAL).",
                        self.auth_scheme
                    ));
                }
            }
            "none" => {}
            other => {
                return Err(format!(
                    "Unknown auth scheme '{}' (expected bearer, signed, or none).",
                    other
                ));
            }
        }

        if self.reasoning_flush_bytes == 0 {
            return Err("Reasoning flush threshold must be at least 1 byte.".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_test()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_test_config_is_valid() {
        let config = Config::for_test();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bearer_requires_credential() {
        let mut config = Config::for_test();
        config.auth_scheme = "bearer".to_string();
        assert!(config.validate().is_err());

        config.backend_credential = Some("token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_backend_url_rejected() {
        let mut config = Config::for_test();
        config.backend_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_auth_scheme_rejected() {
        let mut config = Config::for_test();
        config.auth_scheme = "kerberos".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_flush_threshold_rejected() {
        let mut config = Config::for_test();
        config.reasoning_flush_bytes = 0;
        assert!(config.validate().is_err());
    }
}
