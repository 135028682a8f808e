//! The authorization-code flow with PKCE.
//!
//! ID tokens are decoded structurally, not signature-verified: the
//! token arrives over the direct TLS channel to the token endpoint, so
//! possession of the channel stands in for JWKS verification. The nonce
//! and audience checks still run against the decoded claims.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use trellis_core::{AttributeResolver, FederatedIdentity, FederatedTokens};
use trellis_db::{Protocol, ProviderConfig};

use crate::claims::OidcClaimsResolver;
use crate::error::{OidcError, OidcResult};
use crate::session::{FlowSession, SessionStore};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single JWT segment, to reject pathological tokens
/// before base64 decoding.
const MAX_JWT_SEGMENT_BYTES: usize = 64 * 1024;

/// Redirect URL plus the opaque key under which the pending session is
/// stored. The key goes into the browser cookie; the secrets stay
/// server-side.
#[derive(Debug)]
pub struct LoginRedirect {
    pub url: String,
    pub session_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// OIDC authorization-code flow handler.
#[derive(Clone)]
pub struct AuthFlowService {
    client: reqwest::Client,
    sessions: Arc<dyn SessionStore>,
    redirect_url: String,
}

impl AuthFlowService {
    /// `redirect_url` is this deployment's callback endpoint, registered
    /// with every provider.
    pub fn new(sessions: Arc<dyn SessionStore>, redirect_url: String) -> OidcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| OidcError::Upstream {
                provider: "client".to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            sessions,
            redirect_url,
        })
    }

    fn check_protocol(config: &ProviderConfig) -> OidcResult<()> {
        match config.get_protocol() {
            Ok(Protocol::Oidc) => Ok(()),
            _ => Err(OidcError::WrongProtocol(config.protocol.clone())),
        }
    }

    /// Start a login: mint state, nonce, and PKCE verifier, stash them
    /// in the session store, and build the authorization URL.
    pub async fn initiate_login(&self, config: &ProviderConfig) -> OidcResult<LoginRedirect> {
        Self::check_protocol(config)?;
        let client_id = config
            .client_id
            .as_deref()
            .ok_or(OidcError::MissingConfig("client_id"))?;

        let session_key = random_token(32);
        let state = random_token(32);
        let nonce = random_token(32);
        let pkce_verifier = random_token(48);
        let code_challenge = pkce_challenge(&pkce_verifier);

        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&nonce={}&code_challenge={}&code_challenge_method=S256",
            config.sso_url,
            urlencode(client_id),
            urlencode(&self.redirect_url),
            urlencode("openid email profile"),
            urlencode(&state),
            urlencode(&nonce),
            urlencode(&code_challenge),
        );

        self.sessions
            .put(
                session_key.clone(),
                FlowSession {
                    provider_id: config.id,
                    state,
                    nonce,
                    pkce_verifier,
                    created_at: Utc::now(),
                },
            )
            .await;

        tracing::debug!(
            tenant_id = %config.tenant_id,
            provider = %config.provider_name,
            "OIDC login initiated"
        );
        Ok(LoginRedirect { url, session_key })
    }

    /// Handle the authorization callback: validate state against the
    /// pending session, exchange the code, check the ID token, and
    /// resolve the claims into an identity.
    ///
    /// The session is consumed before any validation, so a failed
    /// callback cannot be retried with the same session.
    pub async fn handle_callback(
        &self,
        session_key: &str,
        state: &str,
        code: &str,
        config: &ProviderConfig,
    ) -> OidcResult<FederatedIdentity> {
        Self::check_protocol(config)?;
        let session = self
            .sessions
            .take(session_key)
            .await
            .ok_or(OidcError::SessionNotFound)?;

        if !constant_time_eq(state, &session.state) {
            tracing::warn!(
                tenant_id = %config.tenant_id,
                provider = %config.provider_name,
                "OIDC callback rejected: state mismatch"
            );
            return Err(OidcError::StateMismatch);
        }

        let token_response = self.exchange_code(code, &session.pkce_verifier, config).await?;
        let access_token = token_response
            .access_token
            .ok_or(OidcError::MissingAccessToken)?;

        let mut claims = match &token_response.id_token {
            Some(id_token) => {
                let claims = decode_id_token_payload(id_token)?;
                check_nonce(&claims, &session.nonce)?;
                check_audience(&claims, config)?;
                claims
            }
            None => HashMap::new(),
        };

        if let Some(userinfo_url) = config.userinfo_url.as_deref() {
            let userinfo = self.fetch_userinfo(userinfo_url, &access_token, config).await?;
            // Userinfo is the fresher source; it wins over ID-token claims.
            claims.extend(userinfo);
        }

        let resolver = OidcClaimsResolver::new(Some(FederatedTokens {
            access_token,
            refresh_token: token_response.refresh_token,
            id_token: token_response.id_token,
        }));
        let identity = resolver.resolve(&claims, &config.attribute_mapping_map());

        tracing::info!(
            tenant_id = %config.tenant_id,
            provider = %config.provider_name,
            "OIDC callback validated"
        );
        Ok(identity)
    }

    /// Exchange a refresh token for fresh tokens.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        config: &ProviderConfig,
    ) -> OidcResult<FederatedTokens> {
        Self::check_protocol(config)?;
        let (token_url, client_id, client_secret) = token_endpoint(config)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response: TokenResponse = self
            .post_form(token_url, &params, config)
            .await?;

        let access_token = response.access_token.ok_or(OidcError::MissingAccessToken)?;
        Ok(FederatedTokens {
            access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
        config: &ProviderConfig,
    ) -> OidcResult<TokenResponse> {
        let (token_url, client_id, client_secret) = token_endpoint(config)?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", &self.redirect_url),
            ("code_verifier", pkce_verifier),
        ];
        self.post_form(token_url, &params, config).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        config: &ProviderConfig,
    ) -> OidcResult<T> {
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| upstream(config, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(config, format!("token endpoint returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| upstream(config, format!("invalid token response: {e}")))
    }

    async fn fetch_userinfo(
        &self,
        url: &str,
        access_token: &str,
        config: &ProviderConfig,
    ) -> OidcResult<HashMap<String, serde_json::Value>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| upstream(config, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(config, format!("userinfo endpoint returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| upstream(config, format!("invalid userinfo response: {e}")))
    }
}

fn token_endpoint(config: &ProviderConfig) -> OidcResult<(&str, &str, &str)> {
    let token_url = config
        .token_url
        .as_deref()
        .ok_or(OidcError::MissingConfig("token_url"))?;
    let client_id = config
        .client_id
        .as_deref()
        .ok_or(OidcError::MissingConfig("client_id"))?;
    let client_secret = config
        .client_secret
        .as_deref()
        .ok_or(OidcError::MissingConfig("client_secret"))?;
    Ok((token_url, client_id, client_secret))
}

fn upstream(config: &ProviderConfig, detail: String) -> OidcError {
    OidcError::Upstream {
        provider: config.provider_name.clone(),
        detail,
    }
}

/// Decode the claims segment of a JWT without verifying the signature.
pub fn decode_id_token_payload(id_token: &str) -> OidcResult<HashMap<String, serde_json::Value>> {
    let mut parts = id_token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(OidcError::InvalidToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    if payload.len() > MAX_JWT_SEGMENT_BYTES {
        return Err(OidcError::InvalidToken("payload segment too large".to_string()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| OidcError::InvalidToken(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OidcError::InvalidToken(format!("payload is not a JSON object: {e}")))
}

fn check_nonce(claims: &HashMap<String, serde_json::Value>, expected: &str) -> OidcResult<()> {
    let nonce = claims
        .get("nonce")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if constant_time_eq(nonce, expected) {
        Ok(())
    } else {
        Err(OidcError::NonceMismatch)
    }
}

fn check_audience(
    claims: &HashMap<String, serde_json::Value>,
    config: &ProviderConfig,
) -> OidcResult<()> {
    let client_id = config
        .client_id
        .as_deref()
        .ok_or(OidcError::MissingConfig("client_id"))?;

    let matches = match claims.get("aud") {
        Some(serde_json::Value::String(aud)) => aud == client_id,
        Some(serde_json::Value::Array(auds)) => auds
            .iter()
            .any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(OidcError::AudienceMismatch {
            client_id: client_id.to_string(),
        })
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn urlencode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    fn service() -> (AuthFlowService, Arc<InMemorySessionStore>) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let service = AuthFlowService::new(
            sessions.clone(),
            "https://sp.example.com/callback".to_string(),
        )
        .unwrap();
        (service, sessions)
    }

    fn config_for(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig::default_for_test_oidc();
        config.sso_url = format!("{}/authorize", server.uri());
        config.token_url = Some(format!("{}/token", server.uri()));
        config.userinfo_url = Some(format!("{}/userinfo", server.uri()));
        config
    }

    #[tokio::test]
    async fn test_initiate_login_builds_authorize_url() {
        let (service, _) = service();
        let config = ProviderConfig::default_for_test_oidc();

        let redirect = service.initiate_login(&config).await.unwrap();
        assert!(redirect.url.starts_with("https://idp.example.com/authorize?response_type=code"));
        assert!(redirect.url.contains("client_id=test%2Dclient"));
        assert!(redirect.url.contains("code_challenge_method=S256"));
        assert!(redirect.url.contains("scope=openid%20email%20profile"));
        assert!(!redirect.session_key.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_login_rejects_saml_config() {
        let (service, _) = service();
        let config = ProviderConfig::default_for_test_saml();

        assert!(matches!(
            service.initiate_login(&config).await,
            Err(OidcError::WrongProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_happy_path_merges_userinfo() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        let redirect = service.initiate_login(&config).await.unwrap();
        let state = extract_query_param(&redirect.url, "state");
        let nonce = extract_query_param(&redirect.url, "nonce");

        let id_token = make_jwt(json!({
            "sub": "idp-user-42",
            "aud": "test-client",
            "nonce": nonce,
            "email": "stale@example.com",
        }));
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-abc",
                "refresh_token": "refresh-def",
                "id_token": id_token,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer access-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": "fresh@example.com",
                "given_name": "Jane",
                "family_name": "Doe",
                "groups": ["eng"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let identity = service
            .handle_callback(&redirect.session_key, &state, "auth-code", &config)
            .await
            .unwrap();

        assert_eq!(identity.email, "fresh@example.com");
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
        assert_eq!(identity.external_id.as_deref(), Some("idp-user-42"));
        assert_eq!(identity.groups, vec!["eng"]);
        let tokens = identity.tokens.unwrap();
        assert_eq!(tokens.access_token, "access-abc");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-def"));
    }

    #[tokio::test]
    async fn test_state_mismatch_skips_token_exchange() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let redirect = service.initiate_login(&config).await.unwrap();
        let result = service
            .handle_callback(&redirect.session_key, "forged-state", "code", &config)
            .await;
        assert!(matches!(result, Err(OidcError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_callback_session_is_single_use() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        let redirect = service.initiate_login(&config).await.unwrap();
        let _ = service
            .handle_callback(&redirect.session_key, "forged-state", "code", &config)
            .await;
        // The failed attempt consumed the session.
        let result = service
            .handle_callback(&redirect.session_key, "forged-state", "code", &config)
            .await;
        assert!(matches!(result, Err(OidcError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_nonce_mismatch_rejected() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        let redirect = service.initiate_login(&config).await.unwrap();
        let state = extract_query_param(&redirect.url, "state");

        let id_token = make_jwt(json!({
            "sub": "s",
            "aud": "test-client",
            "nonce": "replayed-nonce",
        }));
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-abc",
                "id_token": id_token,
            })))
            .mount(&server)
            .await;

        let result = service
            .handle_callback(&redirect.session_key, &state, "code", &config)
            .await;
        assert!(matches!(result, Err(OidcError::NonceMismatch)));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        let redirect = service.initiate_login(&config).await.unwrap();
        let state = extract_query_param(&redirect.url, "state");
        let nonce = extract_query_param(&redirect.url, "nonce");

        let id_token = make_jwt(json!({
            "sub": "s",
            "aud": "some-other-client",
            "nonce": nonce,
        }));
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-abc",
                "id_token": id_token,
            })))
            .mount(&server)
            .await;

        let result = service
            .handle_callback(&redirect.session_key, &state, "code", &config)
            .await;
        assert!(matches!(result, Err(OidcError::AudienceMismatch { .. })));
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces_provider() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        let redirect = service.initiate_login(&config).await.unwrap();
        let state = extract_query_param(&redirect.url, "state");

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = service
            .handle_callback(&redirect.session_key, &state, "code", &config)
            .await;
        match result {
            Err(OidcError::Upstream { provider, .. }) => {
                assert_eq!(provider, "Test OIDC IdP");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_grant() {
        let server = MockServer::start().await;
        let (service, _) = service();
        let config = config_for(&server);

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = service.refresh("old-refresh", &config).await.unwrap();
        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode_id_token_payload("only-one-part").is_err());
        assert!(decode_id_token_payload("a.b").is_err());
        assert!(decode_id_token_payload("a.b.c.d").is_err());
        assert!(decode_id_token_payload("a.!!!not-base64!!!.c").is_err());
    }

    #[test]
    fn test_pkce_challenge_is_deterministic() {
        // RFC 7636 appendix B test vector.
        let challenge = pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    fn extract_query_param(url: &str, name: &str) -> String {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k == name {
                    return percent_encoding::percent_decode_str(v)
                        .decode_utf8_lossy()
                        .to_string();
                }
            }
        }
        String::new()
    }
}
