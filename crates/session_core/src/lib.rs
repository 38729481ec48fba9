use std::{future::Future, sync::Arc, time::Duration};

use engine_integration::Engine;
use shared::{
    domain::{AccountId, AccountKind, CallId, ContactUri, ConversationUid},
    error::{EngineError, EngineResult},
    protocol::{
        AccountEvent, AccountInfo, CallEvent, ContactInfo, ConversationEvent, InteractionStatus,
        NewAccountRequest, RegisterNameStatus,
    },
};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        Mutex, MutexGuard,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod directory;
pub mod error;
pub mod listing;
pub mod notifications;
pub mod registry;
pub mod session;

pub use commands::{CommandDispatcher, Flow, Mode, Terminal};
pub use directory::{AccountDirectory, AccountHandle};
pub use error::{CommandError, SessionError, SessionResult};
pub use notifications::{ChannelNotifier, Notifier};
pub use registry::{CallEntry, CallRegistry};
pub use session::{ActiveAccount, ActiveSession, StreamKind, Subscription};

pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(2);
const LAST_MESSAGE_PREVIEW_CHARS: usize = 40;

/// Runs an engine call with an upper bound so a stuck engine degrades to an error.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    call: impl Future<Output = EngineResult<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::timeout(format!(
            "{operation} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub engine_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }
}

/// Outcome of [`SessionController::clear_if_matches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Untouched,
    Reselected(String),
    Unselected,
}

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub index: usize,
    pub active: bool,
    pub info: AccountInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub uid: ConversationUid,
    pub peer_uri: String,
    pub username: String,
    pub alias: String,
    pub last_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedAccount {
    pub account_id: AccountId,
    pub display_identifier: String,
    pub was_active: bool,
}

struct PendingAccount {
    username: String,
    password: String,
}

#[derive(Default)]
struct ControllerState {
    session: ActiveSession,
    registry: CallRegistry,
    pending_account: Option<PendingAccount>,
}

/// Owns the active account, the call registry and every engine subscription.
///
/// Event handlers and operator commands share one lock over the session state.
/// Handlers run on the tasks that drain the engine's broadcast streams.
pub struct SessionController {
    engine: Arc<dyn Engine>,
    directory: AccountDirectory,
    notifier: Arc<dyn Notifier>,
    options: ControllerOptions,
    state: Mutex<ControllerState>,
    account_events: Mutex<Option<Subscription>>,
}

impl SessionController {
    pub fn new(
        engine: Arc<dyn Engine>,
        notifier: Arc<dyn Notifier>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory: AccountDirectory::new(Arc::clone(&engine), options.engine_timeout),
            engine,
            notifier,
            options,
            state: Mutex::new(ControllerState::default()),
            account_events: Mutex::new(None),
        })
    }

    /// Subscribes to account-lifecycle events for the lifetime of the controller.
    pub async fn start(self: &Arc<Self>) {
        let events = self.engine.subscribe_events();
        let subscription = Subscription::new(StreamKind::Accounts, self.spawn_account_events(events));
        let previous = self.account_events.lock().await.replace(subscription);
        if let Some(previous) = previous {
            previous.release().await;
        }
        info!("session controller started");
    }

    /// Releases every subscription, account-level ones included.
    pub async fn shutdown(&self) {
        let account_events = self.account_events.lock().await.take();
        if let Some(subscription) = account_events {
            subscription.release().await;
        }
        let mut state = self.state.lock().await;
        if let Some(account_id) = state.session.clear().await {
            debug!(account_id = %account_id, "released subscriptions on shutdown");
        }
        info!("session controller stopped");
    }

    pub async fn account_count(&self) -> SessionResult<usize> {
        self.directory.account_count().await
    }

    pub async fn current(&self) -> Option<AccountHandle> {
        self.state.lock().await.session.current().cloned()
    }

    pub async fn current_account_id(&self) -> Option<AccountId> {
        self.current().await.map(|handle| handle.id().clone())
    }

    pub async fn subscription_kinds(&self) -> Vec<StreamKind> {
        self.state.lock().await.session.subscription_kinds()
    }

    /// Calls tracked for the active account.
    pub async fn calls(&self) -> Vec<CallEntry> {
        let state = self.state.lock().await;
        match state.session.current() {
            Some(handle) => state.registry.entries_for(handle.id()),
            None => Vec::new(),
        }
    }

    pub async fn incoming_call(&self) -> Option<CallId> {
        let state = self.state.lock().await;
        let handle = state.session.current()?;
        state.registry.incoming_for(handle.id()).cloned()
    }

    pub async fn account_rows(&self) -> SessionResult<Vec<AccountRow>> {
        let active = self.current_account_id().await;
        let infos = self.directory.account_infos().await?;
        Ok(infos
            .into_iter()
            .enumerate()
            .map(|(index, info)| AccountRow {
                index,
                active: active.as_ref() == Some(&info.id),
                info,
            })
            .collect())
    }

    /// Makes the account at `index` the active one and returns its display identifier.
    pub async fn select_account(self: &Arc<Self>, index: usize) -> SessionResult<String> {
        let mut state = self.state.lock().await;
        self.select_locked(&mut state, index).await
    }

    async fn select_locked(
        self: &Arc<Self>,
        state: &mut MutexGuard<'_, ControllerState>,
        index: usize,
    ) -> SessionResult<String> {
        let handle = match self.directory.handle_at(index).await {
            Ok(handle) => handle,
            Err(err @ (SessionError::NotFound { .. } | SessionError::Engine(_))) => return Err(err),
            Err(err) => {
                warn!(index, error = %err, "account vanished while switching; session unselected");
                state.session.clear().await;
                return Err(err);
            }
        };

        let display = match self.directory.resolve_display_identifier(handle.id()).await {
            Ok(display) => display,
            Err(err) => {
                warn!(account_id = %handle.id(), error = %err, "failed to resolve account; session unselected");
                state.session.clear().await;
                return Err(err);
            }
        };

        if let Some(previous) = state.session.clear().await {
            state.registry.forget_account(&previous);
            debug!(account_id = %previous, "released subscriptions of previous account");
        }
        let subscriptions = self.subscribe_account(&handle);
        info!(account_id = %handle.id(), index, "switched active account");
        state.session.install(ActiveAccount::new(handle, subscriptions));
        Ok(display)
    }

    fn subscribe_account(self: &Arc<Self>, handle: &AccountHandle) -> Vec<Subscription> {
        let calls = handle.models().calls.subscribe_events();
        let conversations = handle.models().conversations.subscribe_events();
        vec![
            Subscription::new(
                StreamKind::Calls,
                self.spawn_call_events(handle.id().clone(), calls),
            ),
            Subscription::new(
                StreamKind::Conversations,
                self.spawn_conversation_events(handle.id().clone(), conversations),
            ),
        ]
    }

    /// Falls back to the first account (or none) when `account_id` was the active one.
    pub async fn clear_if_matches(self: &Arc<Self>, account_id: &AccountId) -> ClearOutcome {
        let mut state = self.state.lock().await;
        if !state.session.is_active(account_id) {
            return ClearOutcome::Untouched;
        }
        state.session.clear().await;
        state.registry.forget_account(account_id);

        match self.directory.account_count().await {
            Ok(0) => ClearOutcome::Unselected,
            Ok(_) => match self.select_locked(&mut state, 0).await {
                Ok(display) => ClearOutcome::Reselected(display),
                Err(err) => {
                    warn!(error = %err, "fallback to first account failed");
                    ClearOutcome::Unselected
                }
            },
            Err(err) => {
                warn!(error = %err, "failed to count accounts after removal");
                ClearOutcome::Unselected
            }
        }
    }

    pub async fn create_account(
        &self,
        alias: &str,
        username: &str,
        password: &str,
    ) -> SessionResult<AccountId> {
        self.state.lock().await.pending_account = Some(PendingAccount {
            username: username.to_string(),
            password: password.to_string(),
        });

        let request = NewAccountRequest {
            kind: AccountKind::Ring,
            alias: alias.to_string(),
            archive_path: None,
            password: password.to_string(),
            pin: None,
        };
        match bounded(
            self.options.engine_timeout,
            "create account",
            self.engine.create_account(request),
        )
        .await
        {
            Ok(account_id) => {
                info!(account_id = %account_id, "account creation requested");
                Ok(account_id)
            }
            Err(err) => {
                self.state.lock().await.pending_account = None;
                Err(err.into())
            }
        }
    }

    pub async fn remove_account(&self, index: usize) -> SessionResult<RemovedAccount> {
        let account_id = self.directory.account_id_at(index).await?;
        let display_identifier = self.directory.resolve_display_identifier(&account_id).await?;
        let was_active = self.state.lock().await.session.is_active(&account_id);

        bounded(
            self.options.engine_timeout,
            "remove account",
            self.engine.remove_account(&account_id),
        )
        .await?;
        info!(account_id = %account_id, was_active, "account removal requested");

        Ok(RemovedAccount {
            account_id,
            display_identifier,
            was_active,
        })
    }

    async fn active_handle(&self) -> SessionResult<AccountHandle> {
        self.current().await.ok_or(SessionError::NoActiveAccount)
    }

    /// Dials `peer` from the active account; the call is tracked under the typed name.
    pub async fn place_call(&self, peer: &str, audio_only: bool) -> SessionResult<CallId> {
        let mut state = self.state.lock().await;
        let handle = state
            .session
            .current()
            .cloned()
            .ok_or(SessionError::NoActiveAccount)?;
        let uri = ContactUri::dialable(peer);
        let call_id = bounded(
            self.options.engine_timeout,
            "create call",
            handle.models().calls.create_call(&uri, audio_only),
        )
        .await?;
        state
            .registry
            .record_outgoing(handle.id().clone(), call_id.clone(), peer.to_string());
        info!(account_id = %handle.id(), call_id = %call_id, audio_only, "outgoing call placed");
        Ok(call_id)
    }

    /// Accepts the pending incoming call. `Ok(None)` when nothing is ringing.
    pub async fn accept_incoming(&self) -> SessionResult<Option<CallId>> {
        let state = self.state.lock().await;
        let handle = state
            .session
            .current()
            .cloned()
            .ok_or(SessionError::NoActiveAccount)?;
        let Some(call_id) = state.registry.incoming_for(handle.id()).cloned() else {
            warn!(account_id = %handle.id(), "no incoming call to accept");
            return Ok(None);
        };

        bounded(
            self.options.engine_timeout,
            "accept call",
            handle.models().calls.accept(&call_id),
        )
        .await?;
        info!(account_id = %handle.id(), call_id = %call_id, "incoming call accepted");
        Ok(Some(call_id))
    }

    pub async fn contacts(&self) -> SessionResult<Vec<ContactInfo>> {
        let handle = self.active_handle().await?;
        let contacts = bounded(
            self.options.engine_timeout,
            "list contacts",
            handle.models().contacts.all_contacts(),
        )
        .await?;
        Ok(contacts
            .into_iter()
            .filter(|contact| !contact.uri.is_empty())
            .collect())
    }

    pub async fn conversations(&self) -> SessionResult<Vec<ConversationRow>> {
        let handle = self.active_handle().await?;
        let models = handle.models();
        let conversations = bounded(
            self.options.engine_timeout,
            "list conversations",
            models.conversations.all_filtered_conversations(),
        )
        .await?;

        let mut rows = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let peer = conversation.participants.first().cloned();
            let contact = match &peer {
                Some(uri) => bounded(
                    self.options.engine_timeout,
                    "get contact",
                    models.contacts.get_contact(uri),
                )
                .await
                .ok(),
                None => None,
            };
            rows.push(ConversationRow {
                uid: conversation.uid,
                peer_uri: peer.map(|uri| uri.0).unwrap_or_default(),
                username: contact
                    .as_ref()
                    .map(|contact| contact.registered_name.clone())
                    .unwrap_or_default(),
                alias: contact.map(|contact| contact.alias).unwrap_or_default(),
                last_message: conversation
                    .last_interaction
                    .map(|interaction| message_preview(&interaction.body))
                    .unwrap_or_default(),
            });
        }
        Ok(rows)
    }

    /// Sends `body` to an existing conversation. `Ok(false)` when the uid is unknown.
    pub async fn send_message(&self, uid: &ConversationUid, body: &str) -> SessionResult<bool> {
        let handle = self.active_handle().await?;
        let conversations = &handle.models().conversations;
        let conversation = bounded(
            self.options.engine_timeout,
            "get conversation",
            conversations.conversation_for_uid(uid),
        )
        .await?;
        if !conversation.is_some_and(|conversation| !conversation.uid.is_empty()) {
            debug!(uid = %uid, "no such conversation");
            return Ok(false);
        }

        bounded(
            self.options.engine_timeout,
            "send message",
            conversations.send_message(uid, body),
        )
        .await?;
        Ok(true)
    }

    fn spawn_account_events(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<AccountEvent>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.dispatch_account_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "account event stream lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_call_events(
        self: &Arc<Self>,
        account_id: AccountId,
        mut events: broadcast::Receiver<CallEvent>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.dispatch_call_event(&account_id, event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(account_id = %account_id, skipped, "call event stream lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_conversation_events(
        self: &Arc<Self>,
        account_id: AccountId,
        mut events: broadcast::Receiver<ConversationEvent>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConversationEvent::InteractionStatusUpdated { interaction, .. }) => {
                        controller
                            .on_interaction_status_updated(&account_id, interaction.status)
                            .await
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(account_id = %account_id, skipped, "conversation event stream lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn dispatch_account_event(self: &Arc<Self>, event: AccountEvent) {
        match event {
            AccountEvent::AccountAdded { account_id } => self.on_account_added(&account_id).await,
            AccountEvent::AccountRemoved { account_id } => {
                self.on_account_removed(&account_id).await
            }
            AccountEvent::NameRegistrationEnded { status, name, .. } => {
                self.on_name_registration_ended(status, &name)
            }
        }
    }

    async fn dispatch_call_event(&self, account_id: &AccountId, event: CallEvent) {
        match event {
            CallEvent::CallStatusChanged { call_id } => {
                self.on_call_status_changed(account_id, &call_id).await
            }
            CallEvent::CallStarted { call_id } => self.on_call_started(account_id, &call_id).await,
            CallEvent::CallEnded { call_id } => self.on_call_ended(account_id, &call_id).await,
            CallEvent::NewIncomingCall { call_id, .. } => {
                self.on_new_incoming_call(account_id, &call_id).await
            }
        }
    }

    pub async fn on_account_added(&self, account_id: &AccountId) {
        let pending = self.state.lock().await.pending_account.take();
        if let Some(pending) = pending.filter(|pending| !pending.username.is_empty()) {
            match bounded(
                self.options.engine_timeout,
                "register name",
                self.engine
                    .register_name(account_id, &pending.password, &pending.username),
            )
            .await
            {
                Ok(_) => info!(account_id = %account_id, username = %pending.username, "name registration requested"),
                Err(err) => error!(account_id = %account_id, error = %err, "name registration request failed"),
            }
        }
        self.notifier.notify(format!("Account added: {account_id}"));
    }

    pub async fn on_account_removed(self: &Arc<Self>, account_id: &AccountId) {
        let outcome = self.clear_if_matches(account_id).await;

        let mut lines = Vec::new();
        match self.directory.account_count().await {
            Ok(0) => lines.push("Deleted last account!".to_string()),
            Ok(_) => {
                if let ClearOutcome::Reselected(display) = &outcome {
                    lines.push("Deleted selected account".to_string());
                    lines.push(format!("Logging to: {display}"));
                }
            }
            Err(err) => warn!(error = %err, "failed to count accounts after removal"),
        }
        lines.push(format!("Successfully removed account {account_id}"));
        self.notifier.notify(lines.join("\n"));
    }

    pub fn on_name_registration_ended(&self, status: RegisterNameStatus, name: &str) {
        if let Some(line) = notifications::name_registration(status, name) {
            self.notifier.notify(line);
        }
    }

    fn scoped_handle(
        state: &ControllerState,
        account_id: &AccountId,
        event: &'static str,
    ) -> Option<AccountHandle> {
        match state.session.current() {
            Some(handle) if handle.id() == account_id => Some(handle.clone()),
            _ => {
                debug!(account_id = %account_id, event, "ignoring event for inactive account");
                None
            }
        }
    }

    /// Snapshot of the active handle when `account_id` is the active account.
    /// The lock is released before returning.
    async fn active_handle_for(
        &self,
        account_id: &AccountId,
        event: &'static str,
    ) -> Option<AccountHandle> {
        let state = self.state.lock().await;
        Self::scoped_handle(&state, account_id, event)
    }

    async fn resolve_peer_name(
        &self,
        handle: &AccountHandle,
        call_id: &CallId,
    ) -> SessionResult<String> {
        let models = handle.models();
        let call = bounded(
            self.options.engine_timeout,
            "get call",
            models.calls.get_call(call_id),
        )
        .await
        .map_err(SessionError::EngineLookup)?;
        let peer = call.peer_uri.without_prefix();
        let contact = bounded(
            self.options.engine_timeout,
            "get contact",
            models.contacts.get_contact(&peer),
        )
        .await
        .map_err(SessionError::EngineLookup)?;
        Ok(contact.display_name())
    }

    pub async fn on_new_incoming_call(&self, account_id: &AccountId, call_id: &CallId) {
        let Some(handle) = self.active_handle_for(account_id, "new incoming call").await else {
            return;
        };

        let name = match self.resolve_peer_name(&handle, call_id).await {
            Ok(name) => name,
            Err(err) => {
                warn!(
                    account_id = %account_id,
                    call_id = %call_id,
                    error = %err,
                    "can't get contact for incoming call; notification suppressed"
                );
                return;
            }
        };

        let mut state = self.state.lock().await;
        if Self::scoped_handle(&state, account_id, "new incoming call").is_none() {
            return;
        }
        info!(account_id = %account_id, call_id = %call_id, "incoming call");
        state
            .registry
            .record_incoming(account_id.clone(), call_id.clone(), name.clone());
        self.notifier.notify(notifications::incoming_call(&name));
    }

    pub async fn on_call_started(&self, account_id: &AccountId, call_id: &CallId) {
        let state = self.state.lock().await;
        if Self::scoped_handle(&state, account_id, "call started").is_none() {
            return;
        }
        match state.registry.peer_name(call_id) {
            Some(peer) => self.notifier.notify(notifications::call_started(peer)),
            None => debug!(call_id = %call_id, "call started for untracked call"),
        }
    }

    pub async fn on_call_ended(&self, account_id: &AccountId, call_id: &CallId) {
        let mut state = self.state.lock().await;
        if Self::scoped_handle(&state, account_id, "call ended").is_none() {
            return;
        }
        if let Some(peer) = state.registry.end(call_id) {
            info!(call_id = %call_id, "call ended");
            self.notifier.notify(notifications::call_ended(&peer));
        }
    }

    pub async fn on_call_status_changed(&self, account_id: &AccountId, call_id: &CallId) {
        let Some(handle) = self.active_handle_for(account_id, "call status changed").await else {
            return;
        };

        let call = match bounded(
            self.options.engine_timeout,
            "get call",
            handle.models().calls.get_call(call_id),
        )
        .await
        {
            Ok(call) => call,
            Err(err) => {
                warn!(call_id = %call_id, error = %err, "can't get call for this account");
                return;
            }
        };

        let peer = call.peer_uri.without_prefix();
        let Some(line) = notifications::call_status(peer.as_str(), call.status) else {
            return;
        };
        let state = self.state.lock().await;
        if Self::scoped_handle(&state, account_id, "call status changed").is_some() {
            self.notifier.notify(line);
        }
    }

    pub async fn on_interaction_status_updated(
        &self,
        account_id: &AccountId,
        status: InteractionStatus,
    ) {
        let state = self.state.lock().await;
        if Self::scoped_handle(&state, account_id, "interaction status updated").is_none() {
            return;
        }
        if let Some(line) = notifications::delivery_status(status) {
            self.notifier.notify(line);
        }
    }
}

fn message_preview(body: &str) -> String {
    if body.chars().count() > LAST_MESSAGE_PREVIEW_CHARS {
        let mut preview: String = body.chars().take(LAST_MESSAGE_PREVIEW_CHARS).collect();
        preview.push_str("...");
        preview
    } else {
        body.to_string()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
