//! Issuer and receiver identities held by the service.
//!
//! Requests that do not carry a secret key sign with one of these. Both start
//! unset and are replaced with a fresh key pair on every setup call.

use nostr::{Nip01Error, generate_secret_key, get_public_key_hex};
use serde::Serialize;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Issuer,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Issuer => write!(f, "issuer"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// A key pair. The secret key never appears in `Debug` output.
#[derive(Clone)]
pub struct Identity {
    secret_key: [u8; 32],
    pubkey: String,
}

impl Identity {
    pub fn generate() -> Result<Self, Nip01Error> {
        let secret_key = generate_secret_key();
        let pubkey = get_public_key_hex(&secret_key)?;
        Ok(Self { secret_key, pubkey })
    }

    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }

    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("pubkey", &self.pubkey)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Identities {
    issuer: RwLock<Option<Identity>>,
    receiver: RwLock<Option<Identity>>,
}

impl Identities {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: Role) -> &RwLock<Option<Identity>> {
        match role {
            Role::Issuer => &self.issuer,
            Role::Receiver => &self.receiver,
        }
    }

    /// Generate a fresh key pair for `role`, replacing the previous one.
    /// Returns the new public key.
    pub fn setup(&self, role: Role) -> Result<String, Nip01Error> {
        let identity = Identity::generate()?;
        let pubkey = identity.pubkey().to_string();
        *self
            .slot(role)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identity);

        info!("Set up {} identity with pubkey {}", role, pubkey);
        Ok(pubkey)
    }

    pub fn get(&self, role: Role) -> Option<Identity> {
        self.slot(role)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::is_hex32;

    #[test]
    fn test_identities_start_unset() {
        let identities = Identities::new();
        assert!(identities.get(Role::Issuer).is_none());
        assert!(identities.get(Role::Receiver).is_none());
    }

    #[test]
    fn test_setup_replaces_key_pair() {
        let identities = Identities::new();

        let first = identities.setup(Role::Issuer).unwrap();
        let second = identities.setup(Role::Issuer).unwrap();

        assert!(is_hex32(&first));
        assert_ne!(first, second);
        assert_eq!(identities.get(Role::Issuer).unwrap().pubkey(), second);
        assert!(identities.get(Role::Receiver).is_none());
    }

    #[test]
    fn test_debug_hides_secret_key() {
        let identity = Identity::generate().unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(identity.pubkey()));
        assert!(!debug.contains(&format!("{:?}", identity.secret_key())));
    }
}
