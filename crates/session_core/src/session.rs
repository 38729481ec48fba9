//! The active account context and the subscriptions it owns.

use tokio::task::JoinHandle;

use shared::domain::AccountId;

use crate::directory::AccountHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Accounts,
    Calls,
    Conversations,
}

/// A running event pump. Dropping it aborts the task; `release` also waits
/// for the task to be gone so its receiver is closed on return.
#[derive(Debug)]
pub struct Subscription {
    kind: StreamKind,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(kind: StreamKind, task: JoinHandle<()>) -> Self {
        Self {
            kind,
            task: Some(task),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub async fn release(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug)]
pub struct ActiveAccount {
    handle: AccountHandle,
    subscriptions: Vec<Subscription>,
}

impl ActiveAccount {
    pub fn new(handle: AccountHandle, subscriptions: Vec<Subscription>) -> Self {
        Self {
            handle,
            subscriptions,
        }
    }

    async fn release(self) {
        for subscription in self.subscriptions {
            subscription.release().await;
        }
    }
}

/// At most one selected account. Reassignment always goes through
/// [`ActiveSession::clear`] first so old subscriptions never overlap new ones.
#[derive(Debug, Default)]
pub struct ActiveSession {
    active: Option<ActiveAccount>,
}

impl ActiveSession {
    pub fn current(&self) -> Option<&AccountHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    pub fn is_active(&self, account_id: &AccountId) -> bool {
        self.current()
            .is_some_and(|handle| handle.id() == account_id)
    }

    pub fn subscription_kinds(&self) -> Vec<StreamKind> {
        self.active
            .as_ref()
            .map(|active| active.subscriptions.iter().map(Subscription::kind).collect())
            .unwrap_or_default()
    }

    /// Releases every subscription of the current account and unselects it.
    pub async fn clear(&mut self) -> Option<AccountId> {
        let previous = self.active.take()?;
        let account_id = previous.handle.id().clone();
        previous.release().await;
        Some(account_id)
    }

    /// Installs a fully built account. The session must be clear.
    pub fn install(&mut self, next: ActiveAccount) {
        debug_assert!(self.active.is_none(), "install over a live account");
        self.active = Some(next);
    }
}
