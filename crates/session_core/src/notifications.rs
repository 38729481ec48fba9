//! Asynchronous console notifications and their wording.

use shared::protocol::{CallStatus, InteractionStatus, RegisterNameStatus};
use tokio::sync::mpsc;

/// Sink for notifications raised from event handlers.
///
/// Implementations must serialize output so a notification never lands in the
/// middle of a prompt the operator is typing into.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: String);
}

/// Forwards notifications to a single consumer that owns the console.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: String) {
        if self.tx.send(message).is_err() {
            tracing::debug!("notification dropped: console printer is gone");
        }
    }
}

pub fn incoming_call(peer: &str) -> String {
    format!("{peer} is calling you!")
}

pub fn call_started(peer: &str) -> String {
    format!("Call with {peer} started")
}

pub fn call_ended(peer: &str) -> String {
    format!("Call with {peer} ended")
}

pub fn call_status(peer: &str, status: CallStatus) -> Option<String> {
    status
        .is_transitional()
        .then(|| format!("Call with {peer} status: {}", status.label()))
}

pub fn delivery_status(status: InteractionStatus) -> Option<String> {
    let text = match status {
        InteractionStatus::Success => "sent",
        InteractionStatus::Failure | InteractionStatus::TransferError => "failure",
        InteractionStatus::TransferUnjoinablePeer => "unjoinable peer",
        InteractionStatus::Sending => "sending",
        InteractionStatus::TransferCreated => "connecting",
        InteractionStatus::TransferAccepted => "accepted",
        InteractionStatus::TransferCanceled => "canceled",
        InteractionStatus::TransferOngoing => "ongoing",
        InteractionStatus::TransferAwaitingPeer => "awaiting peer",
        InteractionStatus::TransferAwaitingHost => "awaiting host",
        InteractionStatus::TransferTimeoutExpired => "awaiting peer timeout",
        InteractionStatus::TransferFinished => "finished",
        InteractionStatus::Invalid | InteractionStatus::Unknown | InteractionStatus::Displayed => {
            return None
        }
    };
    Some(format!("Delivery status: {text}"))
}

pub fn name_registration(status: RegisterNameStatus, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let message = match status {
        RegisterNameStatus::Success => format!("Name \"{name}\" registered successfully"),
        RegisterNameStatus::InvalidName => format!(
            "Unable to register name \"{name}\" (Invalid name). Your username should contain \
             between 3 and 32 alphanumeric characters (or underscore)."
        ),
        RegisterNameStatus::WrongPassword => {
            format!("Unable to register name \"{name}\" (Wrong password).")
        }
        RegisterNameStatus::AlreadyTaken => {
            format!("Unable to register name \"{name}\" (Username already taken)")
        }
        RegisterNameStatus::NetworkError => format!(
            "Unable to register name \"{name}\" (Network error) - check your connection."
        ),
        RegisterNameStatus::Invalid => return None,
    };
    Some(message)
}
