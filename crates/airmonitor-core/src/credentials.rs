use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "airmonitor";

/// Keychain account the Airly API key is stored under
const API_KEY_ACCOUNT: &str = "airly-api-key";

/// Airly API key storage in the OS keychain.
pub struct ApiKeyStore;

impl ApiKeyStore {
    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, API_KEY_ACCOUNT).context("Failed to create keyring entry")
    }

    /// Store the API key in the OS keychain
    pub fn store(api_key: &str) -> Result<()> {
        Self::entry()?
            .set_password(api_key)
            .context("Failed to store API key in keychain")?;
        Ok(())
    }

    /// Retrieve the API key, `None` if none has been stored
    pub fn get() -> Result<Option<String>> {
        match Self::entry()?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve API key from keychain"),
        }
    }

    /// Delete the stored API key
    pub fn delete() -> Result<()> {
        Self::entry()?
            .delete_credential()
            .context("Failed to delete API key from keychain")?;
        Ok(())
    }
}
