//! Session tokens - HS256 JWTs carrying the user's identity and role
//!
//! There is no revocation list; a token stays valid until it expires.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mockable::Clock;
use serde::{Deserialize, Serialize};

use crate::config::{TokenSettings, MAX_PERIOD_MINUTES};
use crate::domain::result::{Error, Result};
use crate::domain::User;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub full_name: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(settings: TokenSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        if settings.secret.is_empty() {
            return Err(Error::Config("token secret is not configured".to_string()));
        }
        if !(1..=MAX_PERIOD_MINUTES).contains(&settings.expiry_minutes) {
            return Err(Error::Config(format!(
                "token expiry must be between 1 and {} minutes",
                MAX_PERIOD_MINUTES
            )));
        }
        let encoding = EncodingKey::from_secret(settings.secret.as_bytes());
        let decoding = DecodingKey::from_secret(settings.secret.as_bytes());
        Ok(Self {
            settings,
            clock,
            encoding,
            decoding,
        })
    }

    pub fn issue(&self, user: &User) -> Result<IssuedToken> {
        let now = self.clock.utc();
        let expires_at = now + Duration::minutes(self.settings.expiry_minutes);
        let claims = SessionClaims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            full_name: user.full_name.clone(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Other(format!("failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            // Second precision, matching what the token itself carries
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Check signature, issuer, audience and expiry
    ///
    /// Expiry is judged against the service clock, not the system time.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_audience(&[self.settings.audience.as_str()]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| Error::InvalidToken(e.to_string()))?
            .claims;

        if claims.exp <= self.clock.utc().timestamp() {
            return Err(Error::InvalidToken("token has expired".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use mockable::DefaultClock;

    fn settings(secret: &str) -> TokenSettings {
        TokenSettings {
            secret: secret.to_string(),
            ..TokenSettings::default()
        }
    }

    fn user() -> User {
        User::new(
            "alice",
            "hash",
            "alice@example.com",
            "Alice Example",
            Role::Teller,
            Utc::now(),
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new(settings(&"k".repeat(32)), Arc::new(DefaultClock)).unwrap();
        let user = user();

        let issued = service.issue(&user).unwrap();
        let claims = service.verify(&issued.token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.role, "Teller");
        assert_eq!(claims.iss, "TellerBank");
        assert_eq!(claims.expires_at(), Some(issued.expires_at));
        assert!(issued.expires_at > Utc::now());
    }

    #[test]
    fn test_tampered_and_foreign_tokens_rejected() {
        let service = TokenService::new(settings(&"k".repeat(32)), Arc::new(DefaultClock)).unwrap();
        let other = TokenService::new(settings(&"x".repeat(32)), Arc::new(DefaultClock)).unwrap();
        let issued = service.issue(&user()).unwrap();

        let mut tampered = issued.token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        assert!(matches!(
            service.verify(&tampered).unwrap_err(),
            Error::InvalidToken(_)
        ));
        assert!(matches!(
            other.verify(&issued.token).unwrap_err(),
            Error::InvalidToken(_)
        ));
        assert!(service.verify("not-a-token").is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let service = TokenService::new(settings(&"k".repeat(32)), Arc::new(DefaultClock)).unwrap();
        let mut foreign_settings = settings(&"k".repeat(32));
        foreign_settings.audience = "SomeoneElse".to_string();
        let foreign = TokenService::new(foreign_settings, Arc::new(DefaultClock)).unwrap();

        let token = foreign.issue(&user()).unwrap().token;
        assert!(service.verify(&token).is_err());
    }

    #[test]
    fn test_out_of_range_expiry_is_config_error() {
        for minutes in [0, -5, MAX_PERIOD_MINUTES + 1, i64::MAX] {
            let mut settings = settings(&"k".repeat(32));
            settings.expiry_minutes = minutes;
            assert!(
                matches!(
                    TokenService::new(settings, Arc::new(DefaultClock)),
                    Err(Error::Config(_))
                ),
                "{} accepted",
                minutes
            );
        }
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        assert!(matches!(
            TokenService::new(settings(""), Arc::new(DefaultClock)),
            Err(Error::Config(_))
        ));
    }
}
