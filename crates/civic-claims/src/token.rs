use chrono::{DateTime, Duration, Utc};
use civic_types::{Identity, QrToken};
use rand::RngCore;

/// Drop-off window length for a declaration token.
pub const TOKEN_VALIDITY_HOURS: i64 = 3;

/// Mint a fresh single-use QR token bound to `identity`.
///
/// The hash commits to the token id, the identity and the issue time, so a
/// presented code can be checked against the stored claim without trusting
/// the bearer.
pub fn issue_token(identity: &Identity, now: DateTime<Utc>) -> QrToken {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let token_id = hex::encode(nonce);

    let mut hasher = blake3::Hasher::new();
    hasher.update(token_id.as_bytes());
    hasher.update(b":");
    hasher.update(identity.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(now.timestamp().to_be_bytes().as_slice());
    let hash = hex::encode(hasher.finalize().as_bytes());

    QrToken {
        token_id,
        hash,
        issued_at: now,
        expires_at: now + Duration::hours(TOKEN_VALIDITY_HOURS),
        used: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_window_is_three_hours() {
        let identity = Identity::parse("0x00000000000000000000000000000000000000aa").unwrap();
        let now = Utc::now();
        let token = issue_token(&identity, now);
        assert_eq!(token.expires_at - token.issued_at, Duration::hours(3));
        assert!(!token.used);
    }

    #[test]
    fn test_tokens_are_unique() {
        let identity = Identity::parse("0x00000000000000000000000000000000000000aa").unwrap();
        let now = Utc::now();
        let a = issue_token(&identity, now);
        let b = issue_token(&identity, now);
        assert_ne!(a.token_id, b.token_id);
        assert_ne!(a.hash, b.hash);
    }
}
