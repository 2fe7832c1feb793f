//! Bearer token verification backends.
//!
//! - [`RemoteIdentityVerifier`]: asks the auth service who owns the token
//! - [`JwtVerifier`]: checks HS256 tokens locally against the project secret

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

/// Identity resolution failures. All of them surface as 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Missing Authorization header")]
    MissingCredential,

    #[error("Authorization header is not a bearer token")]
    MalformedCredential,

    #[error("Token rejected: {0}")]
    Rejected(String),

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::MissingCredential => "MISSING_CREDENTIAL",
            IdentityError::MalformedCredential => "MALFORMED_CREDENTIAL",
            IdentityError::Rejected(_) => "TOKEN_REJECTED",
            IdentityError::Unavailable(_) => "IDENTITY_UNAVAILABLE",
        }
    }
}

/// Exchanges a bearer token for the user id it was issued to
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, IdentityError>;
}

// ============================================================================
// Local HS256 verification
// ============================================================================

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// `audience: None` skips the `aud` check. Expiry is always enforced.
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::Rejected(e.to_string()))?;
        if data.claims.sub.is_empty() {
            return Err(IdentityError::Rejected("token has no subject".into()));
        }
        Ok(data.claims.sub)
    }
}

// ============================================================================
// Remote verification via the auth service
// ============================================================================

#[derive(Debug, Deserialize)]
struct RemoteUser {
    #[serde(default)]
    id: String,
}

pub struct RemoteIdentityVerifier {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl RemoteIdentityVerifier {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            user_url: Self::user_url(base_url),
            anon_key: anon_key.to_string(),
        })
    }

    fn user_url(base_url: &str) -> String {
        format!("{}/auth/v1/user", base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Rejected(format!(
                "auth service answered {}",
                status
            )));
        }

        let user: RemoteUser = response
            .json()
            .await
            .map_err(|e| IdentityError::Rejected(format!("unreadable user payload: {}", e)))?;
        if user.id.is_empty() {
            return Err(IdentityError::Rejected("no user for token".into()));
        }
        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        aud: &'a str,
        exp: i64,
    }

    fn token(sub: &str, aud: &str, exp_offset_secs: i64, secret: &str) -> String {
        let claims = TestClaims {
            sub,
            aud,
            exp: Utc::now().timestamp() + exp_offset_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_jwt_valid_token() {
        let verifier = JwtVerifier::new(SECRET, Some("authenticated"));
        let t = token("user-1", "authenticated", 3600, SECRET);
        assert_eq!(verifier.verify(&t).await, Ok("user-1".to_string()));
    }

    #[tokio::test]
    async fn test_jwt_expired_token() {
        let verifier = JwtVerifier::new(SECRET, Some("authenticated"));
        let t = token("user-1", "authenticated", -3600, SECRET);
        assert!(matches!(
            verifier.verify(&t).await,
            Err(IdentityError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_jwt_wrong_secret() {
        let verifier = JwtVerifier::new(SECRET, Some("authenticated"));
        let t = token("user-1", "authenticated", 3600, "another-secret-of-sufficient-length!!");
        assert!(verifier.verify(&t).await.is_err());
    }

    #[tokio::test]
    async fn test_jwt_audience() {
        let t = token("user-1", "anon", 3600, SECRET);

        let strict = JwtVerifier::new(SECRET, Some("authenticated"));
        assert!(strict.verify(&t).await.is_err());

        let lax = JwtVerifier::new(SECRET, None);
        assert_eq!(lax.verify(&t).await, Ok("user-1".to_string()));
    }

    #[tokio::test]
    async fn test_jwt_empty_subject() {
        let verifier = JwtVerifier::new(SECRET, None);
        let t = token("", "authenticated", 3600, SECRET);
        assert!(matches!(
            verifier.verify(&t).await,
            Err(IdentityError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_jwt_garbage() {
        let verifier = JwtVerifier::new(SECRET, None);
        assert!(verifier.verify("not.a.jwt").await.is_err());
    }

    #[test]
    fn test_remote_user_url() {
        assert_eq!(
            RemoteIdentityVerifier::user_url("https://abc.supabase.co/"),
            "https://abc.supabase.co/auth/v1/user"
        );
        assert_eq!(
            RemoteIdentityVerifier::user_url("http://localhost:54321"),
            "http://localhost:54321/auth/v1/user"
        );
    }

    #[tokio::test]
    async fn test_remote_unreachable_is_unavailable() {
        let verifier =
            RemoteIdentityVerifier::new("http://127.0.0.1:1", "anon", Duration::from_millis(500))
                .unwrap();
        assert!(matches!(
            verifier.verify("token").await,
            Err(IdentityError::Unavailable(_))
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(IdentityError::MissingCredential.code(), "MISSING_CREDENTIAL");
        assert_eq!(
            IdentityError::Rejected("x".into()).code(),
            "TOKEN_REJECTED"
        );
    }
}
