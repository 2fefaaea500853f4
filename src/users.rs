//! User account operations
//!
//! Registration, soft deletion and role changes over the store. Role
//! changes and deactivations are auditable events. There is no HTTP
//! surface here: identity management belongs to the external auth
//! collaborator, and these operations back it plus the test suites.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::core::CoreError;
use crate::models::{User, UserRole};
use crate::store::{Store, StoreError};

pub struct UserDirectory {
    store: Arc<dyn Store>,
    audit: Arc<AuditTrail>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn Store>, audit: Arc<AuditTrail>) -> Self {
        Self { store, audit }
    }

    /// Create a user with a zero balance. Username and email must pass the
    /// shape rules; uniqueness violations surface as `Conflict`.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password_digest: &str,
        role: UserRole,
    ) -> Result<User, CoreError> {
        User::validate_username(username).map_err(CoreError::Validation)?;
        User::validate_email(email).map_err(CoreError::Validation)?;

        let user = User::new(username, email, password_digest, role);
        self.store.create_user(&user).await?;
        // The balance row is created eagerly so the account is usable at once
        self.store.get_or_create_balance(user.id).await?;

        self.audit
            .user_activity(user.id, "USER_CREATED", &format!("user {username} registered"))
            .await;
        info!(user_id = %user.id, username, "user registered");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, CoreError> {
        self.store.get_user(id).await.map_err(|err| match err {
            StoreError::NotFound => CoreError::NotFound("user"),
            other => other.into(),
        })
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        Ok(self.store.get_user_by_username(username).await?)
    }

    /// Soft delete: the row stays for ledger integrity.
    pub async fn deactivate(&self, id: Uuid) -> Result<(), CoreError> {
        self.store.soft_delete_user(id).await.map_err(|err| match err {
            StoreError::NotFound => CoreError::NotFound("user"),
            other => other.into(),
        })?;

        self.audit
            .user_activity(id, "USER_DEACTIVATED", "user soft-deleted")
            .await;
        Ok(())
    }

    pub async fn change_role(&self, id: Uuid, role: UserRole) -> Result<(), CoreError> {
        self.store.set_user_role(id, role).await.map_err(|err| match err {
            StoreError::NotFound => CoreError::NotFound("user"),
            other => other.into(),
        })?;

        self.audit
            .user_activity(id, "ROLE_CHANGED", &format!("role set to {role}"))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;
    use crate::store::MemoryStore;

    fn directory(store: Arc<MemoryStore>) -> UserDirectory {
        let audit = Arc::new(AuditTrail::new(store.clone()));
        UserDirectory::new(store, audit)
    }

    #[tokio::test]
    async fn register_creates_user_and_zero_balance() {
        let store = Arc::new(MemoryStore::new());
        let dir = directory(store.clone());

        let user = dir
            .register("alice", "alice@example.com", "digest", UserRole::Customer)
            .await
            .unwrap();

        assert_eq!(dir.get(user.id).await.unwrap().username, "alice");
        assert_eq!(
            store.get_or_create_balance(user.id).await.unwrap().amount,
            Amount::ZERO
        );
        assert!(store
            .audit_records()
            .await
            .iter()
            .any(|r| r.action == "USER_CREATED"));
    }

    #[tokio::test]
    async fn register_rejects_bad_shapes() {
        let dir = directory(Arc::new(MemoryStore::new()));

        assert!(matches!(
            dir.register("ab", "a@b.com", "d", UserRole::Customer).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            dir.register("alice", "not-an-email", "d", UserRole::Customer)
                .await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let dir = directory(Arc::new(MemoryStore::new()));
        dir.register("alice", "alice@example.com", "d", UserRole::Customer)
            .await
            .unwrap();

        assert!(matches!(
            dir.register("alice", "other@example.com", "d", UserRole::Customer)
                .await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn role_change_and_deactivation_are_audited() {
        let store = Arc::new(MemoryStore::new());
        let dir = directory(store.clone());

        let user = dir
            .register("bob", "bob@example.com", "d", UserRole::Customer)
            .await
            .unwrap();

        dir.change_role(user.id, UserRole::Teller).await.unwrap();
        assert_eq!(dir.get(user.id).await.unwrap().role, UserRole::Teller);

        dir.deactivate(user.id).await.unwrap();
        assert!(dir.get(user.id).await.unwrap().is_deleted());

        let actions: Vec<String> = store
            .audit_records()
            .await
            .iter()
            .map(|r| r.action.clone())
            .collect();
        assert!(actions.contains(&"ROLE_CHANGED".to_string()));
        assert!(actions.contains(&"USER_DEACTIVATED".to_string()));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let dir = directory(Arc::new(MemoryStore::new()));
        assert!(matches!(
            dir.deactivate(Uuid::new_v4()).await,
            Err(CoreError::NotFound("user"))
        ));
    }
}
