use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, AccountKind, CallId, ContactUri, ConversationUid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: AccountId,
    pub kind: AccountKind,
    pub alias: String,
    /// Raw public identifier (hash) of the account.
    pub uri: String,
    #[serde(default)]
    pub registered_name: String,
}

impl AccountInfo {
    /// Registered name when one exists, raw identifier otherwise.
    pub fn display_identifier(&self) -> String {
        if self.registered_name.is_empty() {
            self.uri.clone()
        } else {
            self.registered_name.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountRequest {
    pub kind: AccountKind,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Invalid,
    IncomingRinging,
    OutgoingRinging,
    Connecting,
    Searching,
    InProgress,
    Paused,
    Inactive,
    Ended,
    PeerBusy,
    Timeout,
    Terminating,
    Connected,
    AutoAnswering,
}

impl CallStatus {
    pub fn label(self) -> &'static str {
        match self {
            CallStatus::Invalid => "Invalid",
            CallStatus::IncomingRinging => "Incoming",
            CallStatus::OutgoingRinging => "Ringing",
            CallStatus::Connecting => "Connecting",
            CallStatus::Searching => "Searching",
            CallStatus::InProgress => "In progress",
            CallStatus::Paused => "Hold",
            CallStatus::Inactive => "Inactive",
            CallStatus::Ended => "Finished",
            CallStatus::PeerBusy => "Peer busy",
            CallStatus::Timeout => "Timeout",
            CallStatus::Terminating => "Terminating",
            CallStatus::Connected => "Communication established",
            CallStatus::AutoAnswering => "Auto answering",
        }
    }

    /// States worth announcing while a call is being set up or torn down.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            CallStatus::Connecting
                | CallStatus::Searching
                | CallStatus::OutgoingRinging
                | CallStatus::Terminating
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub id: CallId,
    pub peer_uri: ContactUri,
    pub status: CallStatus,
    pub audio_only: bool,
    pub is_outgoing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub uri: ContactUri,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub registered_name: String,
}

impl ContactInfo {
    /// Alias, else registered name, else the raw URI.
    pub fn display_name(&self) -> String {
        let name = if !self.alias.is_empty() {
            self.alias.as_str()
        } else if !self.registered_name.is_empty() {
            self.registered_name.as_str()
        } else {
            self.uri.as_str()
        };
        name.replace('\r', "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Invalid,
    Unknown,
    Sending,
    Failure,
    Success,
    Displayed,
    TransferCreated,
    TransferAccepted,
    TransferCanceled,
    TransferError,
    TransferUnjoinablePeer,
    TransferOngoing,
    TransferAwaitingPeer,
    TransferAwaitingHost,
    TransferTimeoutExpired,
    TransferFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub author: ContactUri,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub status: InteractionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub uid: ConversationUid,
    pub participants: Vec<ContactUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<Interaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterNameStatus {
    Success,
    WrongPassword,
    InvalidName,
    AlreadyTaken,
    NetworkError,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AccountEvent {
    AccountAdded {
        account_id: AccountId,
    },
    AccountRemoved {
        account_id: AccountId,
    },
    NameRegistrationEnded {
        account_id: AccountId,
        status: RegisterNameStatus,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CallEvent {
    CallStatusChanged { call_id: CallId },
    CallStarted { call_id: CallId },
    CallEnded { call_id: CallId },
    NewIncomingCall { peer_uri: ContactUri, call_id: CallId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ConversationEvent {
    InteractionStatusUpdated {
        uid: ConversationUid,
        interaction_id: u64,
        interaction: Interaction,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(alias: &str, registered_name: &str) -> ContactInfo {
        ContactInfo {
            uri: ContactUri::new("f00d"),
            alias: alias.to_string(),
            registered_name: registered_name.to_string(),
        }
    }

    #[test]
    fn contact_display_name_falls_back_to_registered_name_then_uri() {
        assert_eq!(contact("Bob\r", "bobby").display_name(), "Bob");
        assert_eq!(contact("", "bobby").display_name(), "bobby");
        assert_eq!(contact("", "").display_name(), "f00d");
    }

    #[test]
    fn account_display_identifier_prefers_registered_name() {
        let mut info = AccountInfo {
            id: AccountId::new("a1"),
            kind: AccountKind::Ring,
            alias: "Alice".into(),
            uri: "abcd".into(),
            registered_name: String::new(),
        };
        assert_eq!(info.display_identifier(), "abcd");
        info.registered_name = "alice".into();
        assert_eq!(info.display_identifier(), "alice");
    }

    #[test]
    fn only_setup_and_teardown_states_are_transitional() {
        assert!(CallStatus::Connecting.is_transitional());
        assert!(CallStatus::Terminating.is_transitional());
        assert!(!CallStatus::InProgress.is_transitional());
        assert!(!CallStatus::Ended.is_transitional());
    }

    #[test]
    fn call_events_use_tagged_wire_shape() {
        let event = CallEvent::CallStarted {
            call_id: CallId::new("c1"),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "call_started");
        assert_eq!(json["payload"]["call_id"], "c1");
    }
}
