//! Bearer token decoding and signature verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Turns a raw bearer token into verified claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 shared-secret validator.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time window is carried in our own claim names and checked by `validate_claims`.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                TokenValidationError::Malformed(e.to_string())
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};

    use crate::{PrincipalId, Role};

    fn mint(secret: &[u8], claims: &JwtClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![Role::new(Role::ADMIN)],
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn accepts_token_signed_with_same_secret() {
        let now = Utc::now();
        let c = claims(now);
        let token = mint(b"secret", &c);

        let decoded = Hs256JwtValidator::new(b"secret".to_vec())
            .validate(&token, now)
            .unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let now = Utc::now();
        let token = mint(b"other", &claims(now));

        let err = Hs256JwtValidator::new(b"secret".to_vec())
            .validate(&token, now)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let token = mint(b"secret", &claims(now));

        let err = Hs256JwtValidator::new(b"secret".to_vec())
            .validate(&token, now + Duration::minutes(11))
            .unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }
}
