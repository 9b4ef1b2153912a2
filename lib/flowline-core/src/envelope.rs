//! Versioned envelope for serialized data.
//!
//! Every record this engine persists or publishes — run repository rows,
//! sync-plane task payloads — is wrapped in this envelope so a future format
//! change is detected at load time instead of silently misreading old rows.

use serde::{Deserialize, Serialize};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned envelope wrapping a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps `payload` with the current envelope version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns a reference to the payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Returns true if this envelope uses the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Deserializes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails, or if the decoded
    /// version does not match [`CURRENT_VERSION`].
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EnvelopeDecodeError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)?;
        raw.deserialize_payload()
    }
}

/// A versioned envelope whose payload hasn't been deserialized yet — lets a
/// reader check `version` before committing to a concrete payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// The version of the envelope format.
    pub version: u32,
    /// The raw payload, not yet deserialized.
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    /// Attempts to deserialize the payload into `T`, rejecting unknown
    /// versions so schema drift fails loudly instead of misreading data.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is unrecognized or the payload
    /// doesn't match `T`.
    pub fn deserialize_payload<T: for<'de> Deserialize<'de>>(
        self,
    ) -> Result<Envelope<T>, EnvelopeDecodeError> {
        if self.version != CURRENT_VERSION {
            return Err(EnvelopeDecodeError::UnsupportedVersion { found: self.version });
        }
        let payload: T = serde_json::from_value(self.payload)?;
        Ok(Envelope {
            version: self.version,
            payload,
        })
    }

    /// Returns the version of this envelope.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Deserializes from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes aren't valid envelope JSON.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Failure modes when decoding an [`Envelope`].
#[derive(Debug)]
pub enum EnvelopeDecodeError {
    /// The envelope's `version` field doesn't match [`CURRENT_VERSION`].
    UnsupportedVersion { found: u32 },
    /// The payload failed to deserialize into the expected type.
    Json(serde_json::Error),
}

impl std::fmt::Display for EnvelopeDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported envelope version {found} (expected {CURRENT_VERSION})")
            }
            Self::Json(e) => write!(f, "envelope payload decode failed: {e}"),
        }
    }
}

impl std::error::Error for EnvelopeDecodeError {}

impl From<serde_json::Error> for EnvelopeDecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct TestPayload {
        message: String,
        count: u32,
    }

    #[test]
    fn envelope_creation() {
        let payload = TestPayload {
            message: "hello".to_string(),
            count: 42,
        };
        let envelope = Envelope::new(payload.clone());

        assert_eq!(envelope.version, CURRENT_VERSION);
        assert_eq!(envelope.payload(), &payload);
        assert!(envelope.is_current_version());
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let payload = TestPayload {
            message: "test".to_string(),
            count: 100,
        };
        let envelope = Envelope::new(payload);

        let bytes = envelope.to_json_bytes().expect("serialize");
        let parsed: Envelope<TestPayload> = Envelope::from_json_bytes(&bytes).expect("deserialize");

        assert_eq!(envelope, parsed);
    }

    #[test]
    fn rejects_future_version() {
        let raw = RawEnvelope {
            version: CURRENT_VERSION + 1,
            payload: serde_json::json!({"message": "x", "count": 1}),
        };
        let bytes = serde_json::to_vec(&raw).unwrap();
        let err = Envelope::<TestPayload>::from_json_bytes(&bytes).unwrap_err();
        assert!(matches!(err, EnvelopeDecodeError::UnsupportedVersion { found } if found == CURRENT_VERSION + 1));
    }

    #[test]
    fn raw_envelope_lazy_deserialization() {
        let payload = TestPayload {
            message: "lazy".to_string(),
            count: 7,
        };
        let envelope = Envelope::new(payload.clone());
        let bytes = envelope.to_json_bytes().expect("serialize");

        let raw: RawEnvelope = RawEnvelope::from_json_bytes(&bytes).expect("deserialize raw");
        assert_eq!(raw.version(), CURRENT_VERSION);

        let typed: Envelope<TestPayload> = raw.deserialize_payload().expect("deserialize payload");
        assert_eq!(typed.payload, payload);
    }
}
