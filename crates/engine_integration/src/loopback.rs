//! In-process engine that honours the [`Engine`] contract without a daemon.
//!
//! Accounts, calls, contacts and conversations live in memory. The
//! `ring_incoming`/`start`/`end`/`set_status` style hooks let callers drive the
//! same event streams a remote engine would push.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{AccountId, AccountKind, CallId, ContactUri, ConversationUid},
    error::{EngineError, EngineResult, ErrorCode},
    protocol::{
        AccountEvent, AccountInfo, CallEvent, CallInfo, CallStatus, ContactInfo,
        ConversationEvent, ConversationInfo, Interaction, InteractionStatus, NewAccountRequest,
        RegisterNameStatus,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AccountModels, CallModel, ContactModel, ConversationModel, Engine};

const EVENT_CAPACITY: usize = 256;
const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;

struct LoopbackAccount {
    info: AccountInfo,
    password: String,
    calls: Arc<LoopbackCallModel>,
    contacts: Arc<LoopbackContactModel>,
    conversations: Arc<LoopbackConversationModel>,
}

impl LoopbackAccount {
    fn new(info: AccountInfo, password: String) -> Self {
        Self {
            info,
            password,
            calls: Arc::new(LoopbackCallModel::new()),
            contacts: Arc::new(LoopbackContactModel::default()),
            conversations: Arc::new(LoopbackConversationModel::new()),
        }
    }

    fn models(&self) -> AccountModels {
        AccountModels {
            calls: self.calls.clone(),
            contacts: self.contacts.clone(),
            conversations: self.conversations.clone(),
        }
    }
}

pub struct LoopbackEngine {
    accounts: Mutex<Vec<LoopbackAccount>>,
    events: broadcast::Sender<AccountEvent>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Registers an account directly, without an account-added event.
    pub async fn seed_account(&self, alias: &str, registered_name: &str) -> AccountId {
        let info = AccountInfo {
            id: AccountId::new(Uuid::new_v4().simple().to_string()),
            kind: AccountKind::Ring,
            alias: alias.to_string(),
            uri: Uuid::new_v4().simple().to_string(),
            registered_name: registered_name.to_string(),
        };
        let id = info.id.clone();
        self.accounts
            .lock()
            .await
            .push(LoopbackAccount::new(info, String::new()));
        id
    }

    pub async fn call_model(&self, account_id: &AccountId) -> Option<Arc<LoopbackCallModel>> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| &account.info.id == account_id)
            .map(|account| account.calls.clone())
    }

    pub async fn contact_model(
        &self,
        account_id: &AccountId,
    ) -> Option<Arc<LoopbackContactModel>> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| &account.info.id == account_id)
            .map(|account| account.contacts.clone())
    }

    pub async fn conversation_model(
        &self,
        account_id: &AccountId,
    ) -> Option<Arc<LoopbackConversationModel>> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| &account.info.id == account_id)
            .map(|account| account.conversations.clone())
    }

    fn emit(&self, event: AccountEvent) {
        let _ = self.events.send(event);
    }
}

fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl Engine for LoopbackEngine {
    async fn list_accounts(&self) -> EngineResult<Vec<AccountId>> {
        Ok(self
            .accounts
            .lock()
            .await
            .iter()
            .map(|account| account.info.id.clone())
            .collect())
    }

    async fn account_info(&self, account_id: &AccountId) -> EngineResult<AccountInfo> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| &account.info.id == account_id)
            .map(|account| account.info.clone())
            .ok_or_else(|| EngineError::not_found(format!("unknown account {account_id}")))
    }

    async fn create_account(&self, request: NewAccountRequest) -> EngineResult<AccountId> {
        let info = AccountInfo {
            id: AccountId::new(Uuid::new_v4().simple().to_string()),
            kind: request.kind,
            alias: request.alias,
            uri: Uuid::new_v4().simple().to_string(),
            registered_name: String::new(),
        };
        let account_id = info.id.clone();
        self.accounts
            .lock()
            .await
            .push(LoopbackAccount::new(info, request.password));
        info!(account_id = %account_id, "loopback: account created");
        self.emit(AccountEvent::AccountAdded {
            account_id: account_id.clone(),
        });
        Ok(account_id)
    }

    async fn remove_account(&self, account_id: &AccountId) -> EngineResult<()> {
        {
            let mut accounts = self.accounts.lock().await;
            let Some(position) = accounts
                .iter()
                .position(|account| &account.info.id == account_id)
            else {
                return Err(EngineError::not_found(format!(
                    "unknown account {account_id}"
                )));
            };
            accounts.remove(position);
        }
        info!(account_id = %account_id, "loopback: account removed");
        self.emit(AccountEvent::AccountRemoved {
            account_id: account_id.clone(),
        });
        Ok(())
    }

    async fn register_name(
        &self,
        account_id: &AccountId,
        password: &str,
        username: &str,
    ) -> EngineResult<bool> {
        let status = {
            let mut accounts = self.accounts.lock().await;
            let taken = accounts
                .iter()
                .any(|account| account.info.registered_name == username);
            let Some(account) = accounts
                .iter_mut()
                .find(|account| &account.info.id == account_id)
            else {
                return Err(EngineError::not_found(format!(
                    "unknown account {account_id}"
                )));
            };

            if account.password != password {
                RegisterNameStatus::WrongPassword
            } else if !is_valid_username(username) {
                RegisterNameStatus::InvalidName
            } else if taken {
                RegisterNameStatus::AlreadyTaken
            } else {
                account.info.registered_name = username.to_string();
                RegisterNameStatus::Success
            }
        };

        debug!(account_id = %account_id, username, ?status, "loopback: name registration ended");
        self.emit(AccountEvent::NameRegistrationEnded {
            account_id: account_id.clone(),
            status,
            name: username.to_string(),
        });
        Ok(true)
    }

    async fn account_models(&self, account_id: &AccountId) -> EngineResult<AccountModels> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| &account.info.id == account_id)
            .map(LoopbackAccount::models)
            .ok_or_else(|| EngineError::not_found(format!("unknown account {account_id}")))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
struct LoopbackCallState {
    calls: HashMap<CallId, CallInfo>,
    accept_requests: Vec<CallId>,
    dialed: Vec<(ContactUri, bool)>,
}

pub struct LoopbackCallModel {
    state: Mutex<LoopbackCallState>,
    events: broadcast::Sender<CallEvent>,
}

impl LoopbackCallModel {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(LoopbackCallState::default()),
            events,
        }
    }

    /// Number of live subscribers on this account's call stream.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub async fn ring_incoming(&self, call_id: &CallId, peer_uri: &ContactUri) {
        self.state.lock().await.calls.insert(
            call_id.clone(),
            CallInfo {
                id: call_id.clone(),
                peer_uri: peer_uri.clone(),
                status: CallStatus::IncomingRinging,
                audio_only: true,
                is_outgoing: false,
            },
        );
        let _ = self.events.send(CallEvent::NewIncomingCall {
            peer_uri: peer_uri.clone(),
            call_id: call_id.clone(),
        });
    }

    pub async fn set_status(&self, call_id: &CallId, status: CallStatus) {
        if let Some(call) = self.state.lock().await.calls.get_mut(call_id) {
            call.status = status;
        }
        let _ = self.events.send(CallEvent::CallStatusChanged {
            call_id: call_id.clone(),
        });
    }

    pub async fn start(&self, call_id: &CallId) {
        if let Some(call) = self.state.lock().await.calls.get_mut(call_id) {
            call.status = CallStatus::InProgress;
        }
        let _ = self.events.send(CallEvent::CallStarted {
            call_id: call_id.clone(),
        });
    }

    pub async fn end(&self, call_id: &CallId) {
        self.state.lock().await.calls.remove(call_id);
        let _ = self.events.send(CallEvent::CallEnded {
            call_id: call_id.clone(),
        });
    }

    pub async fn accept_requests(&self) -> Vec<CallId> {
        self.state.lock().await.accept_requests.clone()
    }

    pub async fn dialed(&self) -> Vec<(ContactUri, bool)> {
        self.state.lock().await.dialed.clone()
    }
}

#[async_trait]
impl CallModel for LoopbackCallModel {
    async fn create_call(&self, uri: &ContactUri, audio_only: bool) -> EngineResult<CallId> {
        let call_id = CallId::new(Uuid::new_v4().simple().to_string());
        {
            let mut state = self.state.lock().await;
            state.dialed.push((uri.clone(), audio_only));
            state.calls.insert(
                call_id.clone(),
                CallInfo {
                    id: call_id.clone(),
                    peer_uri: uri.clone(),
                    status: CallStatus::Searching,
                    audio_only,
                    is_outgoing: true,
                },
            );
        }
        let _ = self.events.send(CallEvent::CallStatusChanged {
            call_id: call_id.clone(),
        });
        Ok(call_id)
    }

    async fn accept(&self, call_id: &CallId) -> EngineResult<()> {
        {
            let mut state = self.state.lock().await;
            state.accept_requests.push(call_id.clone());
            let Some(call) = state.calls.get_mut(call_id) else {
                return Err(EngineError::not_found(format!("unknown call {call_id}")));
            };
            if call.status != CallStatus::IncomingRinging {
                return Err(EngineError::new(
                    ErrorCode::Rejected,
                    format!("call {call_id} is not ringing"),
                ));
            }
            call.status = CallStatus::InProgress;
        }
        let _ = self.events.send(CallEvent::CallStarted {
            call_id: call_id.clone(),
        });
        Ok(())
    }

    async fn get_call(&self, call_id: &CallId) -> EngineResult<CallInfo> {
        self.state
            .lock()
            .await
            .calls
            .get(call_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("unknown call {call_id}")))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct LoopbackContactModel {
    contacts: Mutex<Vec<ContactInfo>>,
}

impl LoopbackContactModel {
    pub async fn add_contact(&self, contact: ContactInfo) {
        let mut contacts = self.contacts.lock().await;
        contacts.retain(|existing| existing.uri != contact.uri);
        contacts.push(contact);
    }
}

#[async_trait]
impl ContactModel for LoopbackContactModel {
    async fn all_contacts(&self) -> EngineResult<Vec<ContactInfo>> {
        Ok(self.contacts.lock().await.clone())
    }

    async fn get_contact(&self, uri: &ContactUri) -> EngineResult<ContactInfo> {
        self.contacts
            .lock()
            .await
            .iter()
            .find(|contact| &contact.uri == uri)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("unknown contact {uri}")))
    }
}

#[derive(Default)]
struct LoopbackConversationState {
    conversations: Vec<ConversationInfo>,
    sent: Vec<(ConversationUid, String)>,
    next_interaction_id: u64,
}

pub struct LoopbackConversationModel {
    state: Mutex<LoopbackConversationState>,
    events: broadcast::Sender<ConversationEvent>,
}

impl LoopbackConversationModel {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(LoopbackConversationState::default()),
            events,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub async fn add_conversation(&self, conversation: ConversationInfo) {
        self.state.lock().await.conversations.push(conversation);
    }

    pub async fn sent_messages(&self) -> Vec<(ConversationUid, String)> {
        self.state.lock().await.sent.clone()
    }

    /// Pushes a delivery status for the last interaction of `uid`.
    pub async fn update_interaction_status(&self, uid: &ConversationUid, status: InteractionStatus) {
        let (interaction_id, interaction) = {
            let mut state = self.state.lock().await;
            let interaction_id = state.next_interaction_id;
            let Some(conversation) = state
                .conversations
                .iter_mut()
                .find(|conversation| &conversation.uid == uid)
            else {
                return;
            };
            let Some(interaction) = conversation.last_interaction.as_mut() else {
                return;
            };
            interaction.status = status;
            (interaction_id, interaction.clone())
        };
        let _ = self.events.send(ConversationEvent::InteractionStatusUpdated {
            uid: uid.clone(),
            interaction_id,
            interaction,
        });
    }
}

#[async_trait]
impl ConversationModel for LoopbackConversationModel {
    async fn all_filtered_conversations(&self) -> EngineResult<Vec<ConversationInfo>> {
        Ok(self.state.lock().await.conversations.clone())
    }

    async fn conversation_for_uid(
        &self,
        uid: &ConversationUid,
    ) -> EngineResult<Option<ConversationInfo>> {
        Ok(self
            .state
            .lock()
            .await
            .conversations
            .iter()
            .find(|conversation| &conversation.uid == uid)
            .cloned())
    }

    async fn send_message(&self, uid: &ConversationUid, body: &str) -> EngineResult<()> {
        let (interaction_id, interaction) = {
            let mut state = self.state.lock().await;
            state.next_interaction_id += 1;
            let interaction_id = state.next_interaction_id;
            let Some(conversation) = state
                .conversations
                .iter_mut()
                .find(|conversation| &conversation.uid == uid)
            else {
                return Err(EngineError::not_found(format!("unknown conversation {uid}")));
            };
            let interaction = Interaction {
                author: ContactUri::new(""),
                body: body.to_string(),
                timestamp: Utc::now(),
                status: InteractionStatus::Sending,
            };
            conversation.last_interaction = Some(interaction.clone());
            state.sent.push((uid.clone(), body.to_string()));
            (interaction_id, interaction)
        };
        let _ = self.events.send(ConversationEvent::InteractionStatusUpdated {
            uid: uid.clone(),
            interaction_id,
            interaction,
        });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/loopback_tests.rs"]
mod tests;
