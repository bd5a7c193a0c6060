//! Wire envelope definitions
//!
//! An envelope is the signed, addressed unit that travels over the shared
//! players channel. Its `data` field is `<payload json>@<send timestamp>`
//! and the signature covers exactly that string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire marker for "every peer except the sender"
pub const BROADCAST: &str = "*";
/// Wire marker for "every peer including the sender"
pub const BROADCAST_WITH_SELF: &str = "*,ME";

/// Who an envelope is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Destination {
    /// A single peer id
    Peer(String),
    /// All peers, the sender excluded
    All,
    /// All peers, the sender included
    AllWithSelf,
}

impl Destination {
    /// Whether a peer with `local_id` should process an envelope sent by `sender_id`
    pub fn accepts(&self, sender_id: &str, local_id: &str) -> bool {
        match self {
            Destination::AllWithSelf => true,
            Destination::All => sender_id != local_id,
            Destination::Peer(id) => id == local_id,
        }
    }
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        match s.as_str() {
            BROADCAST => Destination::All,
            BROADCAST_WITH_SELF => Destination::AllWithSelf,
            _ => Destination::Peer(s),
        }
    }
}

impl From<Destination> for String {
    fn from(d: Destination) -> Self {
        match d {
            Destination::All => BROADCAST.to_string(),
            Destination::AllWithSelf => BROADCAST_WITH_SELF.to_string(),
            Destination::Peer(id) => id,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::All => f.write_str(BROADCAST),
            Destination::AllWithSelf => f.write_str(BROADCAST_WITH_SELF),
            Destination::Peer(id) => f.write_str(id),
        }
    }
}

/// Action tag carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Join,
    Sync,
    Move,
    Put,
    Attack,
    Push,
    Kill,
    Ban,
    Score,
    Exit,
    Ack,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Action::Join => "JOIN",
            Action::Sync => "SYNC",
            Action::Move => "MOVE",
            Action::Put => "PUT",
            Action::Attack => "ATTACK",
            Action::Push => "PUSH",
            Action::Kill => "KILL",
            Action::Ban => "BAN",
            Action::Score => "SCORE",
            Action::Exit => "EXIT",
            Action::Ack => "ACK",
        };
        f.write_str(tag)
    }
}

/// Signed, addressed unit of wire data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sender_id: String,
    pub dest_id: Destination,
    pub action: Action,
    /// `<payload json>@<timestamp>`
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Encode for the transport
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode from transport bytes
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Split `data` into the payload json and the embedded timestamp
    pub fn split_data(&self) -> Option<(&str, i64)> {
        let at = self.data.rfind('@')?;
        let stamp = self.data[at + 1..].parse().ok()?;
        Some((&self.data[..at], stamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_wire_form() {
        assert_eq!(Destination::from("*".to_string()), Destination::All);
        assert_eq!(Destination::from("*,ME".to_string()), Destination::AllWithSelf);
        assert_eq!(
            Destination::from("peer-1".to_string()),
            Destination::Peer("peer-1".to_string())
        );
        assert_eq!(String::from(Destination::AllWithSelf), "*,ME");
    }

    #[test]
    fn test_destination_filter() {
        assert!(Destination::AllWithSelf.accepts("me", "me"));
        assert!(!Destination::All.accepts("me", "me"));
        assert!(Destination::All.accepts("other", "me"));
        assert!(Destination::Peer("me".into()).accepts("other", "me"));
        assert!(!Destination::Peer("third".into()).accepts("other", "me"));
    }

    #[test]
    fn test_envelope_json_shape() {
        let env = Envelope {
            sender_id: "a".into(),
            dest_id: Destination::All,
            action: Action::Ack,
            data: "{}@12".into(),
            signature: Some("00".into()),
        };
        let json = String::from_utf8(env.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"senderId\":\"a\""));
        assert!(json.contains("\"destId\":\"*\""));
        assert!(json.contains("\"action\":\"ACK\""));
        assert_eq!(Envelope::from_bytes(json.as_bytes()).unwrap(), env);
    }

    #[test]
    fn test_split_data_uses_last_marker() {
        let env = Envelope {
            sender_id: "a".into(),
            dest_id: Destination::All,
            action: Action::Join,
            data: "{\"name\":\"x@y\"}@1700".into(),
            signature: None,
        };
        assert_eq!(env.split_data(), Some(("{\"name\":\"x@y\"}", 1700)));
    }
}
