//! JWT session tokens.

use axum::http::{header::AUTHORIZATION, request::Parts};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, Authenticator, Principal};
use crate::config::WebConfig;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "filedrop_session";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user identifier).
    pub sub: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
    /// JWT ID (unique identifier).
    pub jti: String,
}

/// Verifies and issues HS256 session tokens.
///
/// Tokens are looked up in the `Authorization: Bearer` header, then the
/// session cookie, then a `token` query parameter (for plain download
/// links).
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry_secs: u64,
}

impl JwtAuthenticator {
    /// Create an authenticator from a shared secret.
    pub fn new(secret: &str, expiry_secs: u64) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry_secs,
        }
    }

    /// Create an authenticator from the `[web]` config section.
    pub fn from_config(config: &WebConfig) -> Self {
        Self::new(&config.jwt_secret, config.session_expiry_secs)
    }

    /// Issue a session token for `subject`.
    pub fn issue_token(&self, subject: &str) -> Result<String, AuthError> {
        if subject.trim().is_empty() {
            return Err(AuthError::EmptySubject);
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = JwtClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.expiry_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Decode and validate a token.
    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    fn token_from_parts(parts: &Parts) -> Option<String> {
        if let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        {
            return Some(token.trim().to_string());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            return Some(cookie.value().to_string());
        }

        parts.uri.query().and_then(|query| {
            query.split('&').find_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                if name == "token" {
                    urlencoding::decode(value).ok().map(|s| s.into_owned())
                } else {
                    None
                }
            })
        })
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, parts: &Parts) -> Option<Principal> {
        let token = Self::token_from_parts(parts)?;
        match self.verify(&token) {
            Ok(claims) => Some(Principal {
                subject: claims.sub,
            }),
            Err(e) => {
                tracing::debug!("JWT validation failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_issue_and_verify() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        let token = auth.issue_token("alice").unwrap();

        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_empty_subject() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        assert!(matches!(
            auth.issue_token("  "),
            Err(AuthError::EmptySubject)
        ));
    }

    #[test]
    fn test_expired_token() {
        let secret = "test-secret";
        let claims = JwtClaims {
            sub: "alice".to_string(),
            iat: (chrono::Utc::now().timestamp() - 7200) as u64,
            exp: (chrono::Utc::now().timestamp() - 3600) as u64,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let auth = JwtAuthenticator::new(secret, 3600);
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn test_invalid_secret() {
        let token = JwtAuthenticator::new("secret1", 3600)
            .issue_token("alice")
            .unwrap();
        assert!(JwtAuthenticator::new("secret2", 3600).verify(&token).is_err());
    }

    #[test]
    fn test_authenticate_bearer_header() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        let token = auth.issue_token("alice").unwrap();
        let bearer = format!("Bearer {}", token);

        let principal = auth
            .authenticate(&parts("/api/objects", &[("authorization", &bearer)]))
            .unwrap();
        assert_eq!(principal.subject, "alice");
    }

    #[test]
    fn test_authenticate_cookie() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        let token = auth.issue_token("bob").unwrap();
        let cookie = format!("theme=dark; {}={}", SESSION_COOKIE, token);

        let principal = auth
            .authenticate(&parts("/api/objects", &[("cookie", &cookie)]))
            .unwrap();
        assert_eq!(principal.subject, "bob");
    }

    #[test]
    fn test_authenticate_query() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        let token = auth.issue_token("carol").unwrap();
        let uri = format!("/api/objects/a.txt?download=1&token={}", token);

        assert!(auth.is_authenticated(&parts(&uri, &[])));
    }

    #[test]
    fn test_authenticate_missing_or_bad() {
        let auth = JwtAuthenticator::new("test-secret", 3600);
        assert!(!auth.is_authenticated(&parts("/api/objects", &[])));
        assert!(!auth.is_authenticated(&parts(
            "/api/objects",
            &[("authorization", "Bearer not-a-jwt")]
        )));
        assert!(!auth.is_authenticated(&parts(
            "/api/objects",
            &[("authorization", "Basic dXNlcjpwYXNz")]
        )));
    }
}
