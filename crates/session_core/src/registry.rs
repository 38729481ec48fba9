//! In-flight calls keyed by call id, plus the pending incoming-call slot.
//!
//! Every entry remembers the account it belongs to so listings and the
//! incoming slot only ever surface calls of the account asking for them.

use std::collections::BTreeMap;

use shared::domain::{AccountId, CallId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEntry {
    pub call_id: CallId,
    pub peer_display_name: String,
}

#[derive(Debug)]
struct TrackedCall {
    account_id: AccountId,
    peer_display_name: String,
}

#[derive(Debug, Default)]
pub struct CallRegistry {
    entries: BTreeMap<CallId, TrackedCall>,
    incoming: Option<(AccountId, CallId)>,
}

impl CallRegistry {
    /// Records a ringing call and makes it the pending incoming call.
    ///
    /// A call already waiting in the slot is overwritten, not queued.
    pub fn record_incoming(
        &mut self,
        account_id: AccountId,
        call_id: CallId,
        peer_display_name: String,
    ) {
        self.entries.insert(
            call_id.clone(),
            TrackedCall {
                account_id: account_id.clone(),
                peer_display_name,
            },
        );
        self.incoming = Some((account_id, call_id));
    }

    pub fn record_outgoing(
        &mut self,
        account_id: AccountId,
        call_id: CallId,
        peer_display_name: String,
    ) {
        self.entries.insert(
            call_id,
            TrackedCall {
                account_id,
                peer_display_name,
            },
        );
    }

    pub fn peer_name(&self, call_id: &CallId) -> Option<&str> {
        self.entries
            .get(call_id)
            .map(|call| call.peer_display_name.as_str())
    }

    /// Drops the call whatever the reason it ended and returns its peer name.
    pub fn end(&mut self, call_id: &CallId) -> Option<String> {
        if self.incoming.as_ref().is_some_and(|(_, pending)| pending == call_id) {
            self.incoming = None;
        }
        self.entries
            .remove(call_id)
            .map(|call| call.peer_display_name)
    }

    /// Drops every call of `account_id`, its pending incoming call included.
    pub fn forget_account(&mut self, account_id: &AccountId) {
        self.entries.retain(|_, call| &call.account_id != account_id);
        if self
            .incoming
            .as_ref()
            .is_some_and(|(owner, _)| owner == account_id)
        {
            self.incoming = None;
        }
    }

    pub fn incoming_for(&self, account_id: &AccountId) -> Option<&CallId> {
        match &self.incoming {
            Some((owner, call_id)) if owner == account_id => Some(call_id),
            _ => None,
        }
    }

    pub fn entries_for(&self, account_id: &AccountId) -> Vec<CallEntry> {
        self.entries
            .iter()
            .filter(|(_, call)| &call.account_id == account_id)
            .map(|(call_id, call)| CallEntry {
                call_id: call_id.clone(),
                peer_display_name: call.peer_display_name.clone(),
            })
            .collect()
    }
}
