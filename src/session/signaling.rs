use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::registry::Participant;

/// Messages a connected client may send over the signaling socket.
///
/// `offer`, `answer` and `ice-candidate` carry opaque negotiation payloads
/// (SDP bodies, candidate lines); the relay never inspects them, it only
/// routes on the `room` field, so everything besides `room` is captured by
/// a flattened map and re-serialized verbatim on fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join {
        room: Option<String>,
        username: String,
        role: String,
    },
    Leave {
        room: Option<String>,
        username: Option<String>,
    },
    Offer {
        room: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    Answer {
        room: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    IceCandidate {
        room: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    ChatMessage {
        room: Option<String>,
        username: Option<String>,
        message: Option<String>,
        ts: Option<u64>,
    },
    ParticipantsRequest {
        room: Option<String>,
    },
}

/// Messages the relay delivers to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    PeerJoined {
        username: String,
    },
    PeerLeft {
        username: String,
    },
    ChatMessage {
        username: Option<String>,
        message: String,
        ts: u64,
    },
    Participants {
        list: Vec<Participant>,
    },
    MeetingEnded {
        code: String,
    },
    MeetingError {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_wire_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "join",
            "room": "AB2CD3",
            "username": "bob",
            "role": "candidate"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::Join { .. }));

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "ice-candidate",
            "room": "AB2CD3",
            "candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 52724 typ host"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::IceCandidate { .. }));
    }

    #[test]
    fn test_offer_payload_round_trips_verbatim() {
        let raw = json!({
            "type": "offer",
            "room": "AB2CD3",
            "sdp": "v=0...",
            "extra": {"nested": true}
        });
        let msg: ClientMessage = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_outbound_wire_tags() {
        let out = serde_json::to_value(ServerMessage::PeerLeft {
            username: "bob".into(),
        })
        .unwrap();
        assert_eq!(out["type"], "peer-left");

        let out = serde_json::to_value(ServerMessage::MeetingError {
            error: "invalid_or_inactive".into(),
        })
        .unwrap();
        assert_eq!(out["type"], "meeting-error");
        assert_eq!(out["error"], "invalid_or_inactive");
    }
}
