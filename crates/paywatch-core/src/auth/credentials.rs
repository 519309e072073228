use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;
use tracing::debug;

use super::SessionCredentials;
use crate::config::APP_NAME;
use crate::storage::JsonFile;

/// Cookie jar file name in the data directory
const COOKIES_FILE: &str = "cookies.json";

/// Account PIN used for re-authentication. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(***)")
    }
}

/// Persists the session cookie jar and keeps the PIN in the OS keychain.
pub struct CredentialStore {
    cookies: JsonFile,
    keyring_account: String,
    entry: OnceLock<Entry>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(data_dir: &Path, keyring_account: impl Into<String>) -> Self {
        Self {
            cookies: JsonFile::new(data_dir.join(COOKIES_FILE)),
            keyring_account: keyring_account.into(),
            entry: OnceLock::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the stored cookie jar. `None` if nothing has been seeded yet.
    pub fn load_cookies(&self) -> Result<Option<SessionCredentials>> {
        self.cookies.load()
    }

    pub fn save_cookies(&self, credentials: &SessionCredentials) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.cookies.save(credentials)?;
        debug!(cookies = credentials.len(), "Saved session cookies");
        Ok(())
    }

    /// Resolve the starting session: an explicitly supplied jar wins and is
    /// written through, otherwise the stored one is used.
    pub fn resolve_cookies(&self, seed: Option<SessionCredentials>) -> Result<SessionCredentials> {
        match seed {
            Some(credentials) => {
                self.save_cookies(&credentials)?;
                Ok(credentials)
            }
            None => self.load_cookies()?.ok_or_else(|| {
                anyhow::anyhow!("No stored session cookies; seed them from a browser session first")
            }),
        }
    }

    /// Store the PIN in the OS keychain
    pub fn store_pin(&self, pin: &Pin) -> Result<()> {
        self.entry()?
            .set_password(pin.expose())
            .context("Failed to store PIN in keychain")?;
        Ok(())
    }

    /// Retrieve the PIN from the OS keychain
    pub fn pin(&self) -> Result<Pin> {
        self.entry()?
            .get_password()
            .map(Pin)
            .context("Failed to retrieve PIN from keychain")
    }

    /// Remove the PIN from the OS keychain
    pub fn delete_pin(&self) -> Result<()> {
        self.entry()?
            .delete_credential()
            .context("Failed to delete PIN from keychain")?;
        Ok(())
    }

    pub fn has_pin(&self) -> bool {
        self.entry()
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }

    fn entry(&self) -> Result<&Entry> {
        if let Some(entry) = self.entry.get() {
            return Ok(entry);
        }
        let entry =
            Entry::new(APP_NAME, &self.keyring_account).context("Failed to create keyring entry")?;
        Ok(self.entry.get_or_init(|| entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pin_debug_is_redacted() {
        assert_eq!(format!("{:?}", Pin::new("1234")), "Pin(***)");
    }

    #[test]
    fn test_pin_keychain_lifecycle() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let dir = TempDir::new().expect("create temp dir");
        let store = CredentialStore::new(dir.path(), "test-pin");
        assert!(!store.has_pin());
        assert!(store.pin().is_err());

        store.store_pin(&Pin::new("4321")).unwrap();
        assert!(store.has_pin());
        assert_eq!(store.pin().unwrap().expose(), "4321");

        store.delete_pin().unwrap();
        assert!(!store.has_pin());
    }

    #[test]
    fn test_cookie_jar_round_trip() {
        let dir = TempDir::new().expect("create temp dir");
        let store = CredentialStore::new(dir.path(), "test");
        assert!(store.load_cookies().unwrap().is_none());

        let creds = SessionCredentials::from_cookie_header("__OBANK_session=s; __OBANK_refresh=r");
        store.save_cookies(&creds).unwrap();

        let reloaded = CredentialStore::new(dir.path(), "test")
            .load_cookies()
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, creds);
    }

    #[test]
    fn test_resolve_cookies_prefers_seed() {
        let dir = TempDir::new().expect("create temp dir");
        let store = CredentialStore::new(dir.path(), "test");
        assert!(store.resolve_cookies(None).is_err());

        let seed = SessionCredentials::from_map([("a", "1")]);
        assert_eq!(store.resolve_cookies(Some(seed.clone())).unwrap(), seed);
        // Seed was written through
        assert_eq!(store.resolve_cookies(None).unwrap(), seed);
    }
}
