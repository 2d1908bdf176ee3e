use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! content_id {
    ($name:ident, $debug:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Derive an id from entity contents.
            pub fn new(data: &[u8]) -> Self {
                let mut hasher = Hasher::new();
                hasher.update(data);
                Self(hasher.finalize().into())
            }

            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 32 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($debug, "({}...)"), &self.to_hex()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

content_id!(ClaimId, "ClaimId");
content_id!(AppealId, "AppealId");
content_id!(InspectionId, "InspectionId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_id_roundtrip() {
        let id = ClaimId::new(b"declaration contents");
        let hex = id.to_hex();
        assert_eq!(ClaimId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_ids_are_deterministic() {
        assert_eq!(AppealId::new(b"x"), AppealId::new(b"x"));
        assert_ne!(AppealId::new(b"x"), AppealId::new(b"y"));
    }

    #[test]
    fn test_from_hex_rejects_bad_length() {
        assert!(InspectionId::from_hex("abcd").is_err());
    }
}
