//! Zeroizing containers for secrets that cross the bridge.
//!
//! Passwords travel inside JSON messages. Holding them in a [`SecretString`]
//! wipes this copy when the message is dropped. Copies made by the JSON and
//! HTTP layers on the way in or out are not covered.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that is zeroized when dropped and redacted in debug output.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Borrow the secret. Avoid cloning the returned slice into plain strings.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the secret in place, leaving an empty string behind.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Zeroize a byte buffer in place.
pub fn zeroize_bytes(data: &mut [u8]) {
    data.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let rendered = format!("{:?}", secret);

        assert!(!rendered.contains("hunter2"));
        assert_eq!(rendered, "SecretString(***)");
    }

    #[test]
    fn test_secret_serializes_as_plain_string() {
        let secret = SecretString::from("s3cret");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"s3cret\"");

        let back: SecretString = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "s3cret");
    }

    #[test]
    fn test_wipe_clears_value() {
        let mut secret = SecretString::from("secret");
        secret.wipe();

        assert!(secret.is_empty());
    }

    #[test]
    fn test_zeroize_bytes() {
        let mut data = vec![1, 2, 3, 4, 5];
        zeroize_bytes(&mut data);

        assert_eq!(data, vec![0, 0, 0, 0, 0]);
    }
}
