use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::claims;
use super::credentials::{CredentialStore, StoreError};
use crate::models::{LoginResponse, User};

/// Keys under which the session is kept in the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub user: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "accessToken".to_string(),
            refresh_token: "refreshToken".to_string(),
            user: "user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Typed access to the tokens and cached user held by a [`CredentialStore`].
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn CredentialStore>,
    keys: StorageKeys,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(&self.keys.access_token)?.filter(|t| !t.is_empty()))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(&self.keys.refresh_token)?.filter(|t| !t.is_empty()))
    }

    pub fn credentials(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(access_token) = self.access_token()? else {
            return Ok(None);
        };
        Ok(Some(Credentials {
            access_token,
            refresh_token: self.refresh_token()?,
        }))
    }

    /// The cached user record. An unreadable record is treated as absent.
    pub fn user(&self) -> Result<Option<User>, StoreError> {
        let Some(raw) = self.store.get(&self.keys.user)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached user record");
                Ok(None)
            }
        }
    }

    /// Persist everything a successful login returns.
    pub fn store_login(&self, login: &LoginResponse) -> Result<(), StoreError> {
        self.store.set(&self.keys.access_token, &login.access_token)?;
        self.store.set(&self.keys.refresh_token, &login.refresh_token)?;
        self.store.set(&self.keys.user, &serde_json::to_string(&login.user)?)?;
        debug!(user_id = login.user.id, "Stored login session");
        Ok(())
    }

    /// Persist refreshed tokens. Without a new refresh token the previous
    /// one stays in place.
    pub fn store_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), StoreError> {
        self.store.set(&self.keys.access_token, access_token)?;
        match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => self.store.set(&self.keys.refresh_token, token)?,
            None => debug!("Refresh response carried no refresh token, keeping previous"),
        }
        Ok(())
    }

    /// Remove access token, refresh token and cached user.
    ///
    /// Every key is attempted even when an earlier removal fails; the first
    /// error is returned.
    pub fn clear(&self) -> Result<(), StoreError> {
        let keys = [
            &self.keys.access_token,
            &self.keys.refresh_token,
            &self.keys.user,
        ];
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.store.remove(key) {
                warn!(key = %key, error = %e, "Failed to remove stored credential");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Expiry of the stored access token, when it is a JWT with an `exp` claim.
    pub fn access_token_expiry(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .access_token()?
            .and_then(|token| claims::expires_at(&token)))
    }
}
