use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::Config;
use crate::error::Result;
use crate::models::Claims;

/// Bearer token validation. Tokens are issued by the account service that
/// shares `jwt.secret` with us.
pub struct AuthService;

impl AuthService {
    /// Validate access token and extract claims
    pub fn validate_token(token: &str, config: &Config) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let decode_with = |secret: &str| {
            decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            )
        };

        // Fall back to rotated-out secrets until one of them verifies
        let mut decoded = decode_with(config.jwt.secret.as_str());
        for secret in &config.jwt.previous_secrets {
            if decoded.is_ok() {
                break;
            }
            decoded = decode_with(secret.as_str());
        }

        Ok(decoded?.claims)
    }

    #[cfg(test)]
    pub fn issue_token(owner_id: &str, secret: &str, ttl: chrono::Duration) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now();
        let claims = Claims {
            sub: owner_id.to_string(),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}
