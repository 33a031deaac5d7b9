use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::common::error::{ClientError, Result};
use crate::common::models::UserId;

/// The subset of SimpleJWT access-token claims the client reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|e| Utc.timestamp_opt(e, 0).single())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp <= now).unwrap_or(false)
    }
}

/// Reads the payload segment of a JWT. The signature is not checked: the
/// server does that, this is only for display and expiry hints.
pub fn decode_claims(token: &str) -> Result<AccessClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ClientError::Decode("token is not a JWT".to_string()))?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::Decode(format!("bad token payload: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
pub(crate) fn make_token(user_id: UserId, exp: i64) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"token_type":"access","user_id":{},"exp":{}}}"#, user_id, exp));
    format!("{}.{}.sig", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_user_and_expiry() {
        let token = make_token(42, 1_900_000_000);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.user_id, Some(42));
        assert!(!claims.is_expired_at(Utc.timestamp_opt(1_800_000_000, 0).unwrap()));
        assert!(claims.is_expired_at(Utc.timestamp_opt(1_900_000_001, 0).unwrap()));
    }

    #[test]
    fn rejects_non_jwt() {
        assert!(decode_claims("opaque-token").is_err());
        assert!(decode_claims("a.%%%.c").is_err());
    }
}
