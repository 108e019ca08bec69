use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{Store, StoreError};
use crate::users::{
    password::{hash_password, verify_or_dummy},
    repo_types::{NewUser, User, UserChanges},
};

pub const MIN_PASSWORD_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("users must have an email address")]
    MissingEmail,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Hash(anyhow::Error),
}

/// Optional fields for [`create_user`].
#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    pub name: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Profile changes; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

/// Trims and lower-cases the whole address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub async fn create_user(
    store: &dyn Store,
    email: &str,
    password: &str,
    extra: ExtraFields,
) -> Result<User, AccountError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AccountError::MissingEmail);
    }
    let password_hash = hash_password(password).map_err(AccountError::Hash)?;

    let user = store
        .insert_user(NewUser {
            email,
            name: extra.name.unwrap_or_default(),
            password_hash,
            is_staff: extra.is_staff,
            is_superuser: extra.is_superuser,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(user)
}

pub async fn create_superuser(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<User, AccountError> {
    create_user(
        store,
        email,
        password,
        ExtraFields {
            name: None,
            is_staff: true,
            is_superuser: true,
        },
    )
    .await
}

/// `None` for an unknown email, an inactive account or a wrong password alike.
/// Every path runs one argon2 verification, so timing does not tell them apart.
pub async fn authenticate(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<Option<User>, AccountError> {
    let email = normalize_email(email);
    let user = store.find_user_by_email(&email).await?;
    let usable_hash = user
        .as_ref()
        .filter(|u| u.is_active)
        .map(|u| u.password_hash.as_str());
    let ok = verify_or_dummy(password, usable_hash).map_err(AccountError::Hash)?;

    match user {
        None => {
            warn!(email = %email, "login unknown email");
            Ok(None)
        }
        Some(user) if !user.is_active => {
            warn!(user_id = %user.id, "login inactive account");
            Ok(None)
        }
        Some(user) if !ok => {
            warn!(user_id = %user.id, "login invalid password");
            Ok(None)
        }
        Some(user) => Ok(Some(user)),
    }
}

/// Enables or disables login for an account. `None` when the account does not exist.
pub async fn set_active(
    store: &dyn Store,
    user_id: Uuid,
    active: bool,
) -> Result<Option<User>, AccountError> {
    let updated = store
        .update_user(
            user_id,
            UserChanges {
                is_active: Some(active),
                ..Default::default()
            },
        )
        .await?;
    if updated.is_some() {
        info!(%user_id, active, "account activation changed");
    }
    Ok(updated)
}

pub async fn update_profile(
    store: &dyn Store,
    user_id: Uuid,
    changes: ProfileChanges,
) -> Result<Option<User>, AccountError> {
    let password_hash = match changes.password {
        Some(plain) => Some(hash_password(&plain).map_err(AccountError::Hash)?),
        None => None,
    };
    let updated = store
        .update_user(
            user_id,
            UserChanges {
                email: changes.email.as_deref().map(normalize_email),
                name: changes.name,
                password_hash,
                is_active: None,
            },
        )
        .await?;
    if let Some(user) = &updated {
        info!(user_id = %user.id, "profile updated");
    }
    Ok(updated)
}

/// Creates the configured superuser unless the email is already taken.
pub async fn ensure_superuser(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<(), AccountError> {
    if store.find_user_by_email(&normalize_email(email)).await?.is_some() {
        return Ok(());
    }
    let user = create_superuser(store, email, password).await?;
    info!(user_id = %user.id, "bootstrap superuser created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn create_user_with_email_successful() {
        let store = MemoryStore::new();
        let user = create_user(&store, "myemail@gmail.com", "MyTestPass123", ExtraFields::default())
            .await
            .unwrap();
        assert_eq!(user.email, "myemail@gmail.com");
        assert!(user.check_password("MyTestPass123"));
        assert_ne!(user.password_hash, "MyTestPass123");
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
    }

    #[tokio::test]
    async fn new_user_email_normalized() {
        let store = MemoryStore::new();
        let user = create_user(&store, "test@AOL.COM", "test123", ExtraFields::default())
            .await
            .unwrap();
        assert_eq!(user.email, "test@aol.com");
    }

    #[tokio::test]
    async fn new_user_without_email_fails() {
        let store = MemoryStore::new();
        let err = create_user(&store, "", "test123", ExtraFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::MissingEmail));
        let err = create_user(&store, "   ", "test123", ExtraFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::MissingEmail));
    }

    #[tokio::test]
    async fn create_new_superuser() {
        let store = MemoryStore::new();
        let user = create_superuser(&store, "test@test.de", "pass123").await.unwrap();
        assert!(user.is_superuser);
        assert!(user.is_staff);
    }

    #[test]
    fn normalize_email_is_idempotent() {
        for email in ["test@AOL.COM", " Mixed.Case@Example.org ", "plain@x.de"] {
            let once = normalize_email(email);
            assert_eq!(normalize_email(&once), once);
        }
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("test@developer.de"));
        assert!(!is_valid_email("developer.de"));
        assert!(!is_valid_email("a b@c.de"));
    }

    #[tokio::test]
    async fn authenticate_is_uniform_on_failure() {
        let store = MemoryStore::new();
        create_user(&store, "testdeveloper@developer.de", "test_pass", ExtraFields::default())
            .await
            .unwrap();

        let ok = authenticate(&store, "TestDeveloper@developer.de", "test_pass")
            .await
            .unwrap();
        assert!(ok.is_some());
        assert!(authenticate(&store, "testdeveloper@developer.de", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(authenticate(&store, "nobody@developer.de", "test_pass")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_profile_rehashes_password() {
        let store = MemoryStore::new();
        let user = create_user(
            &store,
            "testdeveloper@developer.de",
            "test_pass",
            ExtraFields {
                name: Some("name developer".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = update_profile(
            &store,
            user.id,
            ProfileChanges {
                name: Some("name hacker".into()),
                password: Some("new password".into()),
                email: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.name, "name hacker");
        assert!(updated.check_password("new password"));
        assert!(!updated.check_password("test_pass"));
        assert_ne!(updated.password_hash, "new password");
    }

    #[tokio::test]
    async fn ensure_superuser_runs_once() {
        let store = MemoryStore::new();
        ensure_superuser(&store, "Admin@Example.com", "adminpass").await.unwrap();
        ensure_superuser(&store, "admin@example.com", "adminpass").await.unwrap();
        let admin = store
            .find_user_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_superuser);
    }

    #[tokio::test]
    async fn every_failed_login_pays_for_a_verification() {
        use crate::users::password::verifications;

        let store = MemoryStore::new();
        let user = create_user(&store, "known@developer.de", "test_pass", ExtraFields::default())
            .await
            .unwrap();

        let before = verifications();
        assert!(authenticate(&store, "nobody@developer.de", "test_pass")
            .await
            .unwrap()
            .is_none());
        assert_eq!(verifications(), before + 1);

        let before = verifications();
        assert!(authenticate(&store, "known@developer.de", "wrong")
            .await
            .unwrap()
            .is_none());
        assert_eq!(verifications(), before + 1);

        set_active(&store, user.id, false).await.unwrap().unwrap();
        let before = verifications();
        assert!(authenticate(&store, "known@developer.de", "test_pass")
            .await
            .unwrap()
            .is_none());
        assert_eq!(verifications(), before + 1);
    }

    #[tokio::test]
    async fn deactivated_account_can_be_reactivated() {
        let store = MemoryStore::new();
        let user = create_user(&store, "known@developer.de", "test_pass", ExtraFields::default())
            .await
            .unwrap();

        let off = set_active(&store, user.id, false).await.unwrap().unwrap();
        assert!(!off.is_active);
        assert!(authenticate(&store, "known@developer.de", "test_pass")
            .await
            .unwrap()
            .is_none());

        set_active(&store, user.id, true).await.unwrap().unwrap();
        assert!(authenticate(&store, "known@developer.de", "test_pass")
            .await
            .unwrap()
            .is_some());
        assert!(set_active(&store, Uuid::new_v4(), false).await.unwrap().is_none());
    }
}
