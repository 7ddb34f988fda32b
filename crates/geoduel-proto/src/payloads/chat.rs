//! In-room chat payload types.

use serde::{Deserialize, Serialize};

/// Participant sends a chat message to the other room participant.
///
/// The room id travels in the frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Message text.
    pub text: String,
}

/// Server relays a chat message to the other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Participant the message came from.
    pub sender_id: u64,
    /// Message text.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trip() {
        let original = Message { sender_id: 42, text: "good luck!".to_string() };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();
        let decoded: Message = ciborium::de::from_reader(&encoded[..]).unwrap();

        assert_eq!(original, decoded);
    }
}
