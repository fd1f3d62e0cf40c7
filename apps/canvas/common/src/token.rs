use crate::ServiceError;
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

/// Token alphabet. 0, O and 1 are left out so codes survive being read aloud.
pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNPQRSTUVWXYZ23456789";
pub const TOKEN_LENGTH: usize = 8;
pub const MAX_GENERATION_ATTEMPTS: usize = 100;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Host,
    User,
}

impl TokenKind {
    pub fn from_is_host(is_host: bool) -> Self {
        if is_host { TokenKind::Host } else { TokenKind::User }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Host => "host",
            TokenKind::User => "user",
        }
    }
}

pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TOKEN_LENGTH)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Cheap shape check run before any lookup. Legacy links carry 9-character tokens.
pub fn is_well_formed(token: &str) -> bool {
    (TOKEN_LENGTH..=TOKEN_LENGTH + 1).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Base64 HMAC-SHA256 of the host GUID, keyed with the application secret.
pub fn hash_host_guid(secret: &str, guid: &str) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Crypto(e.to_string()))?;
    mac.update(guid.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Checks `guid` against a hash produced by [`hash_host_guid`] in constant time.
pub fn verify_host_guid(secret: &str, guid: &str, expected_hash: &str) -> Result<bool, ServiceError> {
    let Ok(expected) = STANDARD.decode(expected_hash.trim()) else {
        return Ok(false);
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Crypto(e.to_string()))?;
    mac.update(guid.as_bytes());
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Opaque bearer token for an admin session, safe to pass in a query string.
pub fn generate_admin_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn host_url(base_url: &str, host_token: &str) -> String {
    format!("{}/host/{}", base_url, host_token)
}

pub fn participant_url(base_url: &str, user_token: &str) -> String {
    format!("{}/user/landing/{}", base_url, user_token)
}

pub fn waiting_room_path(user_token: &str) -> String {
    format!("/session/waiting/{}", user_token)
}
