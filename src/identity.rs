use crate::error::StoreError;
use crate::player::AccountId;
use sqids::Sqids;
use std::collections::HashMap;
use std::sync::RwLock;

/// Maps chat accounts to the public short ids players share with friends.
pub trait IdentityStore: Send + Sync {
    /// Registers the account on first sight and refreshes its display name
    /// afterwards. Returns the account's short id.
    fn resolve_or_create(&self, account: AccountId, display_name: &str) -> Result<String, StoreError>;
    fn lookup_short_id(&self, account: AccountId) -> Result<Option<String>, StoreError>;
    fn lookup_name_by_short_id(&self, short_id: &str) -> Result<Option<String>, StoreError>;
    fn lookup_account_by_short_id(&self, short_id: &str) -> Result<Option<AccountId>, StoreError>;
}

fn sqids_instance() -> Result<Sqids, StoreError> {
    Sqids::builder()
        .min_length(6)
        .build()
        .map_err(|e| StoreError::Database(e.to_string()))
}

/// Short ids encode the account id itself, so two accounts never collide.
pub fn short_id_for(account: AccountId) -> Result<String, StoreError> {
    sqids_instance()?.encode(&[account]).map_err(|_| StoreError::Encoding(account))
}

/// Inverse of [`short_id_for`]. Only canonical encodings are accepted.
pub fn account_for(short_id: &str) -> Option<AccountId> {
    let sqids = sqids_instance().ok()?;
    match sqids.decode(short_id.trim()).as_slice() {
        [account] if sqids.encode(&[*account]).ok()? == short_id.trim() => Some(*account),
        _ => None,
    }
}

/// Process-local store, used by tests and when no database path is given.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    names: RwLock<HashMap<AccountId, String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        MemoryIdentityStore::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn resolve_or_create(&self, account: AccountId, display_name: &str) -> Result<String, StoreError> {
        let short_id = short_id_for(account)?;
        let mut names = self.names.write().map_err(|_| StoreError::LockError)?;
        names.insert(account, display_name.to_string());
        Ok(short_id)
    }

    fn lookup_short_id(&self, account: AccountId) -> Result<Option<String>, StoreError> {
        let names = self.names.read().map_err(|_| StoreError::LockError)?;
        if !names.contains_key(&account) {
            return Ok(None);
        }
        short_id_for(account).map(Some)
    }

    fn lookup_name_by_short_id(&self, short_id: &str) -> Result<Option<String>, StoreError> {
        let Some(account) = account_for(short_id) else {
            return Ok(None);
        };
        let names = self.names.read().map_err(|_| StoreError::LockError)?;
        Ok(names.get(&account).cloned())
    }

    fn lookup_account_by_short_id(&self, short_id: &str) -> Result<Option<AccountId>, StoreError> {
        let Some(account) = account_for(short_id) else {
            return Ok(None);
        };
        let names = self.names.read().map_err(|_| StoreError::LockError)?;
        Ok(names.contains_key(&account).then_some(account))
    }
}
