//! Normalized device identifiers.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::VelolockError;
use crate::topics::normalize_mac;

/// A device's normalized hardware address: uppercase hex, nothing else.
///
/// Constructed only through [`DeviceId::parse`], so every value is non-empty
/// and already in topic form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Normalizes a raw identifier such as `aa:bb:cc:dd:ee:ff`.
    ///
    /// # Errors
    ///
    /// Returns [`VelolockError::InvalidDeviceIdentifier`] when the input
    /// contains no hex digits.
    pub fn parse(raw: &str) -> Result<Self, VelolockError> {
        normalize_mac(raw)
            .map(Self)
            .ok_or_else(|| VelolockError::InvalidDeviceIdentifier(raw.to_string()))
    }

    /// Returns the normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes() {
        let id = DeviceId::parse("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(id.as_str(), "AABBCCDDEEFF");
        assert_eq!(id, DeviceId::parse("AA-BB-CC-DD-EE-FF").unwrap());
    }

    #[test]
    fn test_parse_rejects_no_hex() {
        let err = DeviceId::parse("zz:zz").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DEVICE_IDENTIFIER");
        assert!(DeviceId::parse("").is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = DeviceId::parse("aabbcc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"AABBCC\"");
    }
}
