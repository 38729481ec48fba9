use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{AccountId, CallId, ContactUri, ConversationUid},
    error::EngineResult,
    protocol::{
        AccountEvent, AccountInfo, CallEvent, CallInfo, ContactInfo, ConversationEvent,
        ConversationInfo, NewAccountRequest,
    },
};
use tokio::sync::broadcast;

pub mod loopback;

pub use loopback::LoopbackEngine;

/// Account-level surface of the communications engine.
///
/// Events are delivered at most once per subscriber; a subscriber that stops
/// draining its receiver misses events instead of stalling the engine.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn list_accounts(&self) -> EngineResult<Vec<AccountId>>;
    async fn account_info(&self, account_id: &AccountId) -> EngineResult<AccountInfo>;
    async fn create_account(&self, request: NewAccountRequest) -> EngineResult<AccountId>;
    async fn remove_account(&self, account_id: &AccountId) -> EngineResult<()>;
    async fn register_name(
        &self,
        account_id: &AccountId,
        password: &str,
        username: &str,
    ) -> EngineResult<bool>;
    async fn account_models(&self, account_id: &AccountId) -> EngineResult<AccountModels>;
    fn subscribe_events(&self) -> broadcast::Receiver<AccountEvent>;
}

#[async_trait]
pub trait CallModel: Send + Sync {
    async fn create_call(&self, uri: &ContactUri, audio_only: bool) -> EngineResult<CallId>;
    async fn accept(&self, call_id: &CallId) -> EngineResult<()>;
    async fn get_call(&self, call_id: &CallId) -> EngineResult<CallInfo>;
    fn subscribe_events(&self) -> broadcast::Receiver<CallEvent>;
}

#[async_trait]
pub trait ContactModel: Send + Sync {
    async fn all_contacts(&self) -> EngineResult<Vec<ContactInfo>>;
    async fn get_contact(&self, uri: &ContactUri) -> EngineResult<ContactInfo>;
}

#[async_trait]
pub trait ConversationModel: Send + Sync {
    async fn all_filtered_conversations(&self) -> EngineResult<Vec<ConversationInfo>>;
    /// `None` when the engine knows no conversation with this uid.
    async fn conversation_for_uid(
        &self,
        uid: &ConversationUid,
    ) -> EngineResult<Option<ConversationInfo>>;
    async fn send_message(&self, uid: &ConversationUid, body: &str) -> EngineResult<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<ConversationEvent>;
}

/// Per-account models handed out by the engine.
#[derive(Clone)]
pub struct AccountModels {
    pub calls: Arc<dyn CallModel>,
    pub contacts: Arc<dyn ContactModel>,
    pub conversations: Arc<dyn ConversationModel>,
}
