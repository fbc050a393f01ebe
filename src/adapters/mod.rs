//! # Backend Request Builder
//!
//! Assembles the authenticated outbound request for a provider: URL,
//! headers per the provider's auth scheme, and the request body. Signed
//! providers get a fresh nonce, a second-granularity timestamp, and a
//! signature from the signing oracle on every call; the nonce is never
//! reused, which is what the backend's replay protection depends on.
//!
//! Streaming is ALWAYS requested from the backend here. Whether the client
//! receives a stream or an aggregate is the orchestrator's decision.

use crate::{
    error::GatewayError,
    registry::{AuthScheme, ProviderDescriptor},
    schemas::ChatCompletionRequest,
    signing::Signer,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

/// The outbound header/body pair for one backend call. Built once per call
/// and never reused across requests.
#[derive(Debug)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    /// Nonce baked into the signed header set, when the provider signs
    pub nonce: Option<String>,
}

/// Build the outbound request for one backend call.
///
/// The content to sign is the most recent user-authored message; an absent
/// user message falls back to the empty string with a warning, never an
/// error. Oracle failures are fatal for this request only.
pub fn build_backend_request(
    req: &ChatCompletionRequest,
    provider: &ProviderDescriptor,
    signer: &dyn Signer,
    backend_model: &str,
) -> Result<OutboundRequest, GatewayError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    match provider.auth {
        AuthScheme::SignedHeaders => {
            let content = match req.latest_user_content() {
                Some(content) => content.to_string(),
                None => {
                    warn!(provider = %provider.name, "no user message found; signing empty content");
                    String::new()
                }
            };

            let nonce = Uuid::new_v4().to_string();
            let timestamp = unix_timestamp();
            let signature = signer.sign(&nonce, timestamp, &provider.device_id, &content)?;
            debug!(provider = %provider.name, nonce = %nonce, "signed backend request");

            insert_header(&mut headers, "nonce", &nonce)?;
            insert_header(&mut headers, "timestamp", &timestamp.to_string())?;
            insert_header(&mut headers, "sign", &signature)?;
            insert_header(&mut headers, "device-id", &provider.device_id)?;
            insert_header(&mut headers, "os-type", &provider.os_type)?;
            if let Some(sid) = &provider.session_id {
                insert_header(&mut headers, "sid", sid)?;
            }

            let mut body = json!({
                "content": content,
                "extra": {
                    "searchMode": provider.search_mode,
                    "model": backend_model,
                    "expert": provider.expert,
                    "plugins": provider.plugins,
                    "language": provider.language,
                },
            });
            if let Some(thread_id) = &req.thread_id {
                body["threadId"] = json!(thread_id);
            }

            Ok(OutboundRequest {
                url: provider.base_url.clone(),
                headers,
                body,
                nonce: Some(nonce),
            })
        }
        AuthScheme::Bearer | AuthScheme::None => {
            if provider.auth == AuthScheme::Bearer {
                // Registry validation guarantees the credential exists.
                let token = provider.credential.as_deref().ok_or_else(|| {
                    GatewayError::Configuration(format!(
                        "provider '{}' has no bearer credential",
                        provider.name
                    ))
                })?;
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| GatewayError::Internal(format!("invalid bearer token: {}", e)))?;
                headers.insert(AUTHORIZATION, value);
            }

            Ok(OutboundRequest {
                url: provider.base_url.clone(),
                headers,
                body: openai_style_body(req, backend_model),
                nonce: None,
            })
        }
    }
}

/// OpenAI-compatible body for bearer/unauthenticated providers. `stream` is
/// unconditionally true; absent generation parameters are omitted rather
/// than defaulted so the backend applies its own defaults.
fn openai_style_body(req: &ChatCompletionRequest, backend_model: &str) -> Value {
    let mut body = json!({
        "model": backend_model,
        "messages": req.messages,
        "stream": true,
    });

    if let Some(max_tokens) = req.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = req.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = req.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(stop) = &req.stop {
        body["stop"] = json!(stop);
    }
    if let Some(presence_penalty) = req.presence_penalty {
        body["presence_penalty"] = json!(presence_penalty);
    }
    if let Some(frequency_penalty) = req.frequency_penalty {
        body["frequency_penalty"] = json!(frequency_penalty);
    }
    if let Some(user) = &req.user {
        body["user"] = json!(user);
    }

    body
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), GatewayError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| GatewayError::Internal(format!("invalid header value for {}: {}", name, e)))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Message;
    use crate::signing::{HmacSigner, Signer, SigningError};
    use std::collections::HashMap;

    fn provider(auth: AuthScheme) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "acme".to_string(),
            base_url: "https://backend.example.com/api/chat".to_string(),
            auth,
            credential: Some("secret".to_string()),
            device_id: "device-1".to_string(),
            os_type: "linux".to_string(),
            session_id: Some("sess-9".to_string()),
            search_mode: "all".to_string(),
            expert: true,
            plugins: vec!["code".to_string()],
            language: "All".to_string(),
            default_model: "standard".to_string(),
            model_map: HashMap::new(),
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![Message::system("be brief"), Message::user("What is SSE?")],
            model: Some("acme/standard".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_signed_headers_present() {
        let signer = HmacSigner::new("secret").unwrap();
        let outbound =
            build_backend_request(&request(), &provider(AuthScheme::SignedHeaders), &signer, "standard")
                .unwrap();

        for name in ["nonce", "timestamp", "sign", "device-id", "os-type", "sid"] {
            assert!(outbound.headers.contains_key(name), "missing header {}", name);
        }
        assert_eq!(
            outbound.headers.get("device-id").unwrap(),
            &HeaderValue::from_static("device-1")
        );
        assert_eq!(outbound.headers.get(ACCEPT).unwrap(), "text/event-stream");
        assert!(outbound.nonce.is_some());
    }

    #[test]
    fn test_signature_covers_latest_user_message() {
        let signer = HmacSigner::new("secret").unwrap();
        let outbound =
            build_backend_request(&request(), &provider(AuthScheme::SignedHeaders), &signer, "standard")
                .unwrap();

        let nonce = outbound.nonce.as_deref().unwrap();
        let timestamp: u64 = outbound
            .headers
            .get("timestamp")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let expected = signer
            .sign(nonce, timestamp, "device-1", "What is SSE?")
            .unwrap();
        assert_eq!(outbound.headers.get("sign").unwrap().to_str().unwrap(), expected);
    }

    #[test]
    fn test_signed_body_shape() {
        let signer = HmacSigner::new("secret").unwrap();
        let mut req = request();
        req.thread_id = Some("th_42".to_string());
        let outbound =
            build_backend_request(&req, &provider(AuthScheme::SignedHeaders), &signer, "standard")
                .unwrap();

        assert_eq!(outbound.body["content"], "What is SSE?");
        assert_eq!(outbound.body["extra"]["model"], "standard");
        assert_eq!(outbound.body["extra"]["expert"], true);
        assert_eq!(outbound.body["extra"]["language"], "All");
        assert_eq!(outbound.body["extra"]["plugins"][0], "code");
        assert_eq!(outbound.body["threadId"], "th_42");
    }

    #[test]
    fn test_missing_user_message_signs_empty_content() {
        let signer = HmacSigner::new("secret").unwrap();
        let req = ChatCompletionRequest {
            messages: vec![Message::system("no user turn")],
            ..Default::default()
        };
        let outbound =
            build_backend_request(&req, &provider(AuthScheme::SignedHeaders), &signer, "standard")
                .unwrap();
        assert_eq!(outbound.body["content"], "");
    }

    #[test]
    fn test_nonce_unique_per_call() {
        let signer = HmacSigner::new("secret").unwrap();
        let p = provider(AuthScheme::SignedHeaders);
        let a = build_backend_request(&request(), &p, &signer, "standard").unwrap();
        let b = build_backend_request(&request(), &p, &signer, "standard").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_bearer_auth_and_streaming_body() {
        let signer = HmacSigner::new("unused").unwrap();
        let mut req = request();
        req.stream = Some(false);
        req.temperature = Some(0.5);
        let outbound =
            build_backend_request(&req, &provider(AuthScheme::Bearer), &signer, "gpt-x").unwrap();

        assert_eq!(
            outbound.headers.get(AUTHORIZATION).unwrap(),
            &HeaderValue::from_static("Bearer secret")
        );
        // Backend streaming is requested regardless of the client flag.
        assert_eq!(outbound.body["stream"], true);
        assert_eq!(outbound.body["model"], "gpt-x");
        assert_eq!(outbound.body["temperature"], 0.5);
        assert!(outbound.body.get("max_tokens").is_none());
    }

    #[test]
    fn test_no_auth_scheme_has_no_auth_header() {
        let signer = HmacSigner::new("unused").unwrap();
        let outbound =
            build_backend_request(&request(), &provider(AuthScheme::None), &signer, "m").unwrap();
        assert!(outbound.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_oracle_failure_is_signing_error() {
        struct FailingSigner;
        impl Signer for FailingSigner {
            fn sign(&self, _: &str, _: u64, _: &str, _: &str) -> Result<String, SigningError> {
                Err(SigningError::Failed("oracle offline".to_string()))
            }
        }

        let err = build_backend_request(
            &request(),
            &provider(AuthScheme::SignedHeaders),
            &FailingSigner,
            "standard",
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Signing(_)));
    }
}
