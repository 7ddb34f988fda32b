//! Session management payload types.

use serde::{Deserialize, Serialize};

/// Client handshake.
///
/// Carries the user id issued by the external auth service plus the bearer
/// credential it was issued with. The server trusts the attached user id -
/// token verification happens at the auth boundary, not in the protocol
/// core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub version: u16,

    /// Stable user identifier (nonzero), assigned at auth time.
    pub user_id: u64,

    /// Externally-issued bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Server handshake response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned session id for this connection.
    pub session_id: u64,
}

/// Graceful disconnect notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason for disconnecting.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let original = Hello {
            version: 1,
            user_id: 42,
            auth_token: Some("bearer-token".to_string()),
        };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();
        let decoded: Hello = ciborium::de::from_reader(&encoded[..]).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn hello_token_omitted_when_absent() {
        let hello = Hello { version: 1, user_id: 7, auth_token: None };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&hello, &mut encoded).unwrap();
        let decoded: Hello = ciborium::de::from_reader(&encoded[..]).unwrap();

        assert_eq!(decoded.auth_token, None);
    }
}
