//! Read-only view over the engine's accounts.
//!
//! Accounts come and go asynchronously, so every index-based access re-reads
//! the list instead of trusting an earlier listing.

use std::{sync::Arc, time::Duration};

use engine_integration::{AccountModels, Engine};
use shared::{domain::AccountId, protocol::AccountInfo};

use crate::{bounded, SessionError, SessionResult};

/// Non-owning reference to an engine account and its per-account models.
#[derive(Clone)]
pub struct AccountHandle {
    id: AccountId,
    models: AccountModels,
}

impl AccountHandle {
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn models(&self) -> &AccountModels {
        &self.models
    }
}

impl std::fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountHandle").field("id", &self.id).finish()
    }
}

impl PartialEq for AccountHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Clone)]
pub struct AccountDirectory {
    engine: Arc<dyn Engine>,
    timeout: Duration,
}

impl AccountDirectory {
    pub fn new(engine: Arc<dyn Engine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub async fn list_accounts(&self) -> SessionResult<Vec<AccountId>> {
        Ok(bounded(self.timeout, "list accounts", self.engine.list_accounts()).await?)
    }

    pub async fn account_count(&self) -> SessionResult<usize> {
        Ok(self.list_accounts().await?.len())
    }

    pub async fn account_infos(&self) -> SessionResult<Vec<AccountInfo>> {
        let mut infos = Vec::new();
        for account_id in self.list_accounts().await? {
            match bounded(
                self.timeout,
                "account info",
                self.engine.account_info(&account_id),
            )
            .await
            {
                Ok(info) => infos.push(info),
                // removed between the listing and the lookup
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(infos)
    }

    /// Resolves the account at `index`, failing with `NotFound` outside `[0, count)`.
    pub async fn handle_at(&self, index: usize) -> SessionResult<AccountHandle> {
        let accounts = self.list_accounts().await?;
        let Some(account_id) = accounts.get(index).cloned() else {
            return Err(SessionError::NotFound {
                index,
                count: accounts.len(),
            });
        };
        let models = bounded(
            self.timeout,
            "account models",
            self.engine.account_models(&account_id),
        )
        .await
        .map_err(SessionError::EngineLookup)?;
        Ok(AccountHandle {
            id: account_id,
            models,
        })
    }

    pub async fn account_id_at(&self, index: usize) -> SessionResult<AccountId> {
        let accounts = self.list_accounts().await?;
        accounts
            .get(index)
            .cloned()
            .ok_or(SessionError::NotFound {
                index,
                count: accounts.len(),
            })
    }

    pub async fn resolve_display_identifier(&self, account_id: &AccountId) -> SessionResult<String> {
        let info = bounded(self.timeout, "account info", self.engine.account_info(account_id))
            .await
            .map_err(SessionError::EngineLookup)?;
        Ok(info.display_identifier())
    }
}
