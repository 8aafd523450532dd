//! Google sign-in credential provider
//!
//! Exchanges OAuth2 authorization codes and refresh tokens at the Google
//! token endpoint. Uses synchronous HTTP (ureq) to be executor-agnostic.
//! The platform shell runs the interactive part of the flow (opening the
//! consent page, capturing the redirect); this provider only talks to the
//! token endpoint.

use std::sync::Mutex;
use std::time::Duration;

use base64::prelude::*;
use chrono::Utc;
use log::debug;
use serde::Deserialize;
use ureq::Agent;

use crate::credentials::GoogleCredentials;
use crate::error::AuthError;
use crate::models::Session;
use crate::provider::{Credential, CredentialProvider};

/// Token response from the Google token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    id_token: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// ID-token payload fields we care about
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
}

/// Credential provider backed by Google OAuth2.
///
/// Holds the refresh token internally between calls, the same way the
/// native SDKs do; the [`Session`] handed to the coordinator carries only
/// the short-lived access token.
pub struct GoogleCredentialProvider {
    credentials: GoogleCredentials,
    agent: Agent,
    token_url: String,
    refresh_token: Mutex<Option<String>>,
}

impl GoogleCredentialProvider {
    /// Google OAuth2 endpoints
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Scopes: identity plus document-store access
    const SCOPE: &'static str = "openid email https://www.googleapis.com/auth/datastore";

    /// Token lifetime Google assumes when `expires_in` is omitted
    const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

    /// Create a provider with the given request timeout.
    pub fn new(credentials: GoogleCredentials, timeout: Duration) -> Self {
        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(timeout))
                .build(),
        );
        Self {
            credentials,
            agent,
            token_url: Self::TOKEN_URL.to_string(),
            refresh_token: Mutex::new(None),
        }
    }

    /// Override the token endpoint (tests against a local server).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Build the consent-page URL the shell should open.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(Self::SCOPE),
            urlencoding::encode(state),
        )
    }

    /// Extract a credential from the OAuth redirect the shell captured.
    ///
    /// Returns `CredentialRejected` if the redirect carries an `error`
    /// parameter or no authorization code.
    pub fn parse_redirect(redirect_url: &str) -> Result<Credential, AuthError> {
        let parsed = url::Url::parse(redirect_url).map_err(|e| AuthError::CredentialRejected {
            reason: format!("malformed redirect URL: {}", e),
        })?;

        let mut code = None;
        let mut error = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            return Err(AuthError::CredentialRejected {
                reason: format!("sign-in was denied: {}", err),
            });
        }

        let code = code.ok_or_else(|| AuthError::CredentialRejected {
            reason: "redirect carried no authorization code".to_string(),
        })?;

        // The redirect URI registered with the grant is the callback URL
        // minus its query string.
        let mut redirect_uri = parsed.clone();
        redirect_uri.set_query(None);
        redirect_uri.set_fragment(None);

        Ok(Credential::AuthorizationCode {
            code,
            redirect_uri: redirect_uri.to_string(),
        })
    }

    fn request_token(
        &self,
        form: &[(&str, &str)],
        on_rejection: fn(String) -> AuthError,
    ) -> Result<TokenResponse, AuthError> {
        let mut response = self
            .agent
            .post(&self.token_url)
            .send_form(form.iter().copied())
            .map_err(|e| map_transport_error(e, &self.token_url, on_rejection))?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| on_rejection(format!("unreadable token response: {}", e)))
    }

    fn session_from_response(
        &self,
        user_id: String,
        response: TokenResponse,
    ) -> Result<Session, AuthError> {
        // Hold on to the refresh token for later refresh() calls; Google
        // omits it on refresh grants, in which case the previous one stays.
        if let Some(refresh) = &response.refresh_token {
            *self.refresh_token.lock().unwrap() = Some(refresh.clone());
        }

        let now = Utc::now();
        let ttl = response.expires_in.unwrap_or(Self::DEFAULT_TOKEN_TTL_SECS);
        Session::new(
            user_id,
            response.access_token,
            now,
            now + chrono::Duration::seconds(ttl as i64),
        )
    }
}

impl CredentialProvider for GoogleCredentialProvider {
    fn exchange(&self, credential: &Credential) -> Result<Session, AuthError> {
        let response = match credential {
            Credential::AuthorizationCode { code, redirect_uri } => {
                debug!("Exchanging authorization code at {}", self.token_url);
                self.request_token(
                    &[
                        ("client_id", self.credentials.client_id.as_str()),
                        ("client_secret", self.credentials.client_secret.as_str()),
                        ("code", code.as_str()),
                        ("grant_type", "authorization_code"),
                        ("redirect_uri", redirect_uri.as_str()),
                    ],
                    |reason| AuthError::CredentialRejected { reason },
                )?
            }
            Credential::RefreshToken { token } => {
                debug!("Exchanging refresh token at {}", self.token_url);
                *self.refresh_token.lock().unwrap() = Some(token.clone());
                self.request_token(
                    &[
                        ("client_id", self.credentials.client_id.as_str()),
                        ("client_secret", self.credentials.client_secret.as_str()),
                        ("refresh_token", token.as_str()),
                        ("grant_type", "refresh_token"),
                    ],
                    |reason| AuthError::CredentialRejected { reason },
                )?
            }
        };

        // The identity comes from the ID token's subject claim.
        let id_token = response
            .id_token
            .clone()
            .ok_or_else(|| AuthError::CredentialRejected {
                reason: "token response carried no id_token".to_string(),
            })?;
        let user_id = decode_subject(&id_token)?;

        self.session_from_response(user_id, response)
    }

    fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let refresh_token = self
            .refresh_token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::RefreshFailed {
                reason: "no refresh token held for this session".to_string(),
            })?;

        debug!("Refreshing access token for {}", session.user_id);
        let response = self.request_token(
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
            |reason| AuthError::RefreshFailed { reason },
        )?;

        // Refresh responses usually omit the id_token; the identity is
        // unchanged, so carry it over from the old session.
        self.session_from_response(session.user_id.clone(), response)
    }
}

/// Decode the subject claim from an unverified ID token.
///
/// The token arrives over TLS directly from the issuer, so signature
/// verification is delegated to the backend; the client only needs the
/// stable user identifier.
fn decode_subject(id_token: &str) -> Result<String, AuthError> {
    let rejected = |reason: String| AuthError::CredentialRejected { reason };

    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| rejected("id_token is not a JWT".to_string()))?;

    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| rejected(format!("id_token payload is not base64url: {}", e)))?;

    let claims: IdTokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| rejected(format!("id_token payload is not valid JSON: {}", e)))?;

    Ok(claims.sub)
}

/// Map a ureq transport error onto the auth taxonomy.
///
/// Timeouts become `NetworkTimeout` so callers can retry with backoff;
/// HTTP rejections from the token endpoint become the supplied rejection
/// kind (`CredentialRejected` for grants, `RefreshFailed` for refreshes).
fn map_transport_error(
    err: ureq::Error,
    endpoint: &str,
    on_rejection: fn(String) -> AuthError,
) -> AuthError {
    match err {
        ureq::Error::Timeout(_) => AuthError::NetworkTimeout {
            endpoint: endpoint.to_string(),
        },
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            AuthError::NetworkTimeout {
                endpoint: endpoint.to_string(),
            }
        }
        ureq::Error::StatusCode(code) => {
            on_rejection(format!("token endpoint returned HTTP {}", code))
        }
        other => AuthError::NetworkTimeout {
            endpoint: format!("{} ({})", endpoint, other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> GoogleCredentialProvider {
        let credentials = GoogleCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        };
        GoogleCredentialProvider::new(credentials, Duration::from_secs(5))
    }

    fn make_id_token(sub: &str) -> String {
        let header = BASE64_URL_SAFE_NO_PAD.encode(b"{}");
        let payload =
            BASE64_URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}","aud":"client-id"}}"#, sub));
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_decode_subject() {
        let token = make_id_token("google-user-42");
        assert_eq!(decode_subject(&token).unwrap(), "google-user-42");
    }

    #[test]
    fn test_decode_subject_rejects_garbage() {
        assert!(decode_subject("not-a-jwt").is_err());
        assert!(decode_subject("a.%%%.c").is_err());
    }

    #[test]
    fn test_authorization_url_contains_client_and_scope() {
        let provider = make_provider();
        let url = provider.authorization_url("http://localhost:8080", "xyzzy");

        assert!(url.starts_with(GoogleCredentialProvider::AUTH_URL));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=xyzzy"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_parse_redirect_extracts_code() {
        let credential = GoogleCredentialProvider::parse_redirect(
            "http://localhost:8080/?code=abc123&scope=openid",
        )
        .unwrap();

        assert_eq!(
            credential,
            Credential::AuthorizationCode {
                code: "abc123".to_string(),
                redirect_uri: "http://localhost:8080/".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_redirect_propagates_denial() {
        let err =
            GoogleCredentialProvider::parse_redirect("http://localhost:8080/?error=access_denied")
                .unwrap_err();
        assert!(matches!(err, AuthError::CredentialRejected { .. }));
    }

    #[test]
    fn test_parse_redirect_requires_code() {
        let err = GoogleCredentialProvider::parse_redirect("http://localhost:8080/").unwrap_err();
        assert!(matches!(err, AuthError::CredentialRejected { .. }));
    }

    #[test]
    fn test_session_from_response_stores_refresh_token() {
        let provider = make_provider();
        let response = TokenResponse {
            access_token: "at-1".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_in: Some(300),
            id_token: None,
            token_type: None,
        };

        let session = provider
            .session_from_response("user-1".to_string(), response)
            .unwrap();
        assert_eq!(session.token, "at-1");
        assert_eq!(provider.refresh_token.lock().unwrap().as_deref(), Some("rt-1"));

        // A later response without a refresh token keeps the stored one
        let response = TokenResponse {
            access_token: "at-2".to_string(),
            refresh_token: None,
            expires_in: None,
            id_token: None,
            token_type: None,
        };
        provider
            .session_from_response("user-1".to_string(), response)
            .unwrap();
        assert_eq!(provider.refresh_token.lock().unwrap().as_deref(), Some("rt-1"));
    }
}
