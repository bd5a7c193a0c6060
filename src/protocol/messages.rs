//! Typed payloads carried inside envelopes

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use super::envelope::Action;
use crate::clock::Millis;
use crate::crypto::RecordId;
use crate::scoreboard::ScoreRecord;
use crate::world::Player;

/// Contested actions decided by quorum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrialAction {
    Push,
    Kill,
    Expelled,
}

impl TrialAction {
    /// Envelope tag used when proposing this action
    pub fn proposal_tag(self) -> Action {
        match self {
            TrialAction::Push => Action::Push,
            TrialAction::Kill => Action::Kill,
            TrialAction::Expelled => Action::Ban,
        }
    }
}

/// Authoritative motion broadcast by the owning peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveUpdate {
    pub time: Millis,
    pub position: f64,
    pub velocity: i32,
}

/// A peer's proposal of a contested action about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialProposal {
    pub action: TrialAction,
    /// Proposal time on the proposer's clock
    pub time: Millis,
    /// Claimed victims for KILL
    #[serde(default)]
    pub victims: Vec<String>,
}

/// Acknowledgment or denial of an open trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub origin_id: String,
    pub action: TrialAction,
    pub ack: bool,
}

/// Request to witness a published score record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAnnouncement {
    pub record_id: RecordId,
    pub record: ScoreRecord,
}

/// Decoded envelope payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Join(Player),
    Sync(Vec<Millis>),
    Move(MoveUpdate),
    Put,
    Attack(Player),
    Proposal(TrialProposal),
    Score(ScoreAnnouncement),
    Exit,
    Ack(Acknowledgement),
}

impl Payload {
    /// Envelope tag for this payload
    pub fn action(&self) -> Action {
        match self {
            Payload::Join(_) => Action::Join,
            Payload::Sync(_) => Action::Sync,
            Payload::Move(_) => Action::Move,
            Payload::Put => Action::Put,
            Payload::Attack(_) => Action::Attack,
            Payload::Proposal(p) => p.action.proposal_tag(),
            Payload::Score(_) => Action::Score,
            Payload::Exit => Action::Exit,
            Payload::Ack(_) => Action::Ack,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Payload::Join(p) | Payload::Attack(p) => serde_json::to_string(p),
            Payload::Sync(samples) => serde_json::to_string(samples),
            Payload::Move(m) => serde_json::to_string(m),
            Payload::Put | Payload::Exit => Ok("1".to_string()),
            Payload::Proposal(p) => serde_json::to_string(p),
            Payload::Score(s) => serde_json::to_string(s),
            Payload::Ack(a) => serde_json::to_string(a),
        }
    }

    /// Decode the payload json of an envelope tagged `action`
    pub fn decode(action: Action, json: &str) -> serde_json::Result<Self> {
        Ok(match action {
            Action::Join => Payload::Join(serde_json::from_str(json)?),
            Action::Sync => Payload::Sync(serde_json::from_str(json)?),
            Action::Move => Payload::Move(serde_json::from_str(json)?),
            Action::Put => Payload::Put,
            Action::Attack => Payload::Attack(serde_json::from_str(json)?),
            Action::Push | Action::Kill | Action::Ban => {
                let proposal: TrialProposal = serde_json::from_str(json)?;
                if proposal.action.proposal_tag() != action {
                    return Err(serde_json::Error::custom(format!(
                        "proposal for {:?} under tag {}",
                        proposal.action, action
                    )));
                }
                Payload::Proposal(proposal)
            }
            Action::Score => Payload::Score(serde_json::from_str(json)?),
            Action::Exit => Payload::Exit,
            Action::Ack => Payload::Ack(serde_json::from_str(json)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_tag_mismatch_rejected() {
        let json = serde_json::to_string(&TrialProposal {
            action: TrialAction::Push,
            time: 5,
            victims: vec![],
        })
        .unwrap();
        assert!(Payload::decode(Action::Kill, &json).is_err());
        assert!(matches!(
            Payload::decode(Action::Push, &json),
            Ok(Payload::Proposal(_))
        ));
    }

    #[test]
    fn test_ack_wire_shape() {
        let ack = Payload::Ack(Acknowledgement {
            origin_id: "p".into(),
            action: TrialAction::Expelled,
            ack: true,
        });
        assert_eq!(
            ack.to_json().unwrap(),
            r#"{"originId":"p","action":"EXPELLED","ack":true}"#
        );
    }

    #[test]
    fn test_expelled_proposes_under_ban() {
        assert_eq!(TrialAction::Expelled.proposal_tag(), Action::Ban);
    }
}
