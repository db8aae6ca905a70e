//! Authentication collaborator
//!
//! The overlay treats authentication as an opaque capability: given a
//! username and password it hands back a key pair or fails, and it can
//! tell anyone the public key registered for a username.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use skein_core::{SkeinError, SkeinResult};

use crate::{KeyPair, PublicKey};

/// Authentication capability used by peers
pub trait Authenticator: Send + Sync {
    /// Create an account; fails when the username is taken
    fn register(&self, username: &str, password: &str) -> SkeinResult<KeyPair>;

    /// Return the account's key pair when the password matches
    fn login(&self, username: &str, password: &str) -> SkeinResult<KeyPair>;

    /// Public key registered for `username`
    fn public_key(&self, username: &str) -> Option<PublicKey>;
}

struct Account {
    salt: [u8; 16],
    password_hash: [u8; 32],
    keys: KeyPair,
}

/// In-process authority holding accounts in memory
#[derive(Default)]
pub struct LocalAuthority {
    accounts: RwLock<HashMap<String, Account>>,
}

impl LocalAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    fn hash_password(salt: &[u8; 16], password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

impl Authenticator for LocalAuthority {
    fn register(&self, username: &str, password: &str) -> SkeinResult<KeyPair> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(username) {
            return Err(SkeinError::AuthenticationFailed(username.to_string()));
        }

        let salt: [u8; 16] = rand::random();
        let keys = KeyPair::generate();
        accounts.insert(
            username.to_string(),
            Account {
                salt,
                password_hash: Self::hash_password(&salt, password),
                keys: keys.clone(),
            },
        );
        tracing::debug!(username, "registered account");
        Ok(keys)
    }

    fn login(&self, username: &str, password: &str) -> SkeinResult<KeyPair> {
        let accounts = self.accounts.read();
        match accounts.get(username) {
            Some(account) if Self::hash_password(&account.salt, password) == account.password_hash => {
                Ok(account.keys.clone())
            }
            _ => Err(SkeinError::AuthenticationFailed(username.to_string())),
        }
    }

    fn public_key(&self, username: &str) -> Option<PublicKey> {
        self.accounts
            .read()
            .get(username)
            .map(|account| account.keys.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_login() {
        let auth = LocalAuthority::new();
        let registered = auth.register("alice", "pw").unwrap();
        let logged_in = auth.login("alice", "pw").unwrap();

        assert_eq!(registered.public_key(), logged_in.public_key());
        assert_eq!(auth.public_key("alice"), Some(registered.public_key()));
    }

    #[test]
    fn test_register_twice_fails() {
        let auth = LocalAuthority::new();
        auth.register("alice", "pw").unwrap();
        assert!(matches!(
            auth.register("alice", "other"),
            Err(SkeinError::AuthenticationFailed(_))
        ));
        assert_eq!(auth.account_count(), 1);
    }

    #[test]
    fn test_wrong_password_fails() {
        let auth = LocalAuthority::new();
        auth.register("alice", "pw").unwrap();
        assert!(auth.login("alice", "nope").is_err());
        assert!(auth.login("bob", "pw").is_err());
    }

    #[test]
    fn test_unknown_public_key() {
        let auth = LocalAuthority::new();
        assert!(auth.public_key("nobody").is_none());
    }
}
