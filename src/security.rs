// Password hashing and signed session tokens
//
// Token layout: hex(payload) "." hex(mac)
//   payload = "<purpose>|<expires_unix>|<email>"
//   mac     = HMAC-SHA256(secret, payload)

use crate::config::SecurityConfig;
use crate::period::Clock;
use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// bcrypt only looks at the first 72 bytes
const MAX_PASSWORD_BYTES: usize = 72;

// ============================================================================
// PASSWORDS
// ============================================================================

fn significant_bytes(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(MAX_PASSWORD_BYTES)]
}

/// bcrypt hash with a fresh salt, at the given work factor
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(significant_bytes(password), cost).context("Failed to hash password")
}

/// False for a wrong password and for anything that is not a bcrypt hash
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(significant_bytes(password), stored).unwrap_or(false)
}

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Access,
    Verification,
}

impl TokenPurpose {
    pub fn name(&self) -> &str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Verification => "verification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No token was presented
    Unauthenticated,
    /// Token is malformed, forged, expired, or for another purpose
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "Not authenticated"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Maps a bearer token to the email of the user it was issued to
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: Option<&str>) -> Result<String, AuthError>;
}

pub struct TokenService {
    mac: HmacSha256,
    access_ttl_secs: i64,
    verification_ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: &SecurityConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(config.secret_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid token signing key: {}", e))?;

        Ok(TokenService {
            mac,
            access_ttl_secs: config.access_token_minutes * 60,
            verification_ttl_secs: config.verification_token_hours * 3600,
            clock,
        })
    }

    pub fn issue_access(&self, email: &str) -> String {
        self.issue(email, TokenPurpose::Access)
    }

    pub fn issue_verification(&self, email: &str) -> String {
        self.issue(email, TokenPurpose::Verification)
    }

    pub fn issue(&self, email: &str, purpose: TokenPurpose) -> String {
        let ttl = match purpose {
            TokenPurpose::Access => self.access_ttl_secs,
            TokenPurpose::Verification => self.verification_ttl_secs,
        };
        let expires = self.clock.now_unix() + ttl;
        let payload = format!("{}|{}|{}", purpose.name(), expires, email);

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        format!(
            "{}.{}",
            hex::encode(payload.as_bytes()),
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Check signature, purpose and expiry; return the subject email.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<String, AuthError> {
        let (payload_hex, mac_hex) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let payload = hex::decode(payload_hex).map_err(|_| AuthError::InvalidToken)?;
        let signature = hex::decode(mac_hex).map_err(|_| AuthError::InvalidToken)?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| AuthError::InvalidToken)?;

        let payload = String::from_utf8(payload).map_err(|_| AuthError::InvalidToken)?;
        let mut fields = payload.splitn(3, '|');
        let (Some(kind), Some(expires), Some(email)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let expires: i64 = expires.parse().map_err(|_| AuthError::InvalidToken)?;
        if kind != purpose.name() || email.is_empty() || self.clock.now_unix() >= expires {
            return Err(AuthError::InvalidToken);
        }

        Ok(email.to_string())
    }
}

impl IdentityResolver for TokenService {
    fn resolve(&self, token: Option<&str>) -> Result<String, AuthError> {
        match token {
            Some(token) if !token.trim().is_empty() => self.verify(token.trim(), TokenPurpose::Access),
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FixedClock;
    use chrono::NaiveDate;
    use sha2::Digest;

    const TEST_COST: u32 = 4;

    fn service_on(day: u32) -> TokenService {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 6, day).unwrap());
        TokenService::new(&SecurityConfig::default(), Arc::new(clock)).unwrap()
    }

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("hunter22", TEST_COST).unwrap();

        assert!(stored.starts_with("$2"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "plaintext"));
    }

    #[test]
    fn test_fast_digest_hashes_are_not_accepted() {
        let digest = format!("{:x}", Sha256::digest(b"salt:hunter22"));
        assert!(!verify_password("hunter22", &format!("sha256$salt${}", digest)));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        assert_ne!(
            hash_password("same", TEST_COST).unwrap(),
            hash_password("same", TEST_COST).unwrap()
        );
    }

    #[test]
    fn test_password_truncated_at_72_bytes() {
        let long = "a".repeat(72);
        let stored = hash_password(&long, TEST_COST).unwrap();
        assert!(verify_password(&format!("{}ignored", long), &stored));
    }

    #[test]
    fn test_access_token_resolves_email() {
        let tokens = service_on(1);
        let token = tokens.issue_access("ana@example.com");

        assert_eq!(tokens.resolve(Some(&token)).unwrap(), "ana@example.com");
    }

    #[test]
    fn test_signature_is_hmac_of_payload() {
        let tokens = service_on(1);
        let token = tokens.issue_access("ana@example.com");
        let (payload_hex, mac_hex) = token.split_once('.').unwrap();
        let payload = hex::decode(payload_hex).unwrap();

        let mut mac = HmacSha256::new_from_slice(SecurityConfig::default().secret_key.as_bytes()).unwrap();
        mac.update(&payload);
        assert_eq!(mac_hex, hex::encode(mac.finalize().into_bytes()));

        // A plain secret-prefixed digest over the same payload does not verify
        let mut prefixed = Sha256::new();
        prefixed.update(SecurityConfig::default().secret_key.as_bytes());
        prefixed.update(b":");
        prefixed.update(&payload);
        let forged = format!("{}.{:x}", payload_hex, prefixed.finalize());
        assert_eq!(tokens.resolve(Some(&forged)), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_missing_token_is_unauthenticated() {
        let tokens = service_on(1);
        assert_eq!(tokens.resolve(None), Err(AuthError::Unauthenticated));
        assert_eq!(tokens.resolve(Some("  ")), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let tokens = service_on(1);
        let token = tokens.issue_access("ana@example.com");
        let forged_payload = hex::encode(b"access|99999999999|eve@example.com");
        let (_, mac) = token.split_once('.').unwrap();

        assert_eq!(
            tokens.resolve(Some(&format!("{}.{}", forged_payload, mac))),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(tokens.resolve(Some("not-a-token")), Err(AuthError::InvalidToken));
        assert_eq!(tokens.resolve(Some("zz.zz")), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = service_on(1).issue_access("ana@example.com");

        let mut config = SecurityConfig::default();
        config.secret_key = "rotated".to_string();
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let other = TokenService::new(&config, Arc::new(clock)).unwrap();

        assert_eq!(other.resolve(Some(&token)), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = service_on(1).issue_access("ana@example.com");

        assert!(service_on(1).resolve(Some(&token)).is_ok());
        assert_eq!(service_on(2).resolve(Some(&token)), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_purposes_are_not_interchangeable() {
        let tokens = service_on(1);
        let verification = tokens.issue_verification("ana@example.com");
        let access = tokens.issue_access("ana@example.com");

        assert_eq!(tokens.resolve(Some(&verification)), Err(AuthError::InvalidToken));
        assert_eq!(
            tokens.verify(&access, TokenPurpose::Verification),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            tokens.verify(&verification, TokenPurpose::Verification).unwrap(),
            "ana@example.com"
        );
    }
}
