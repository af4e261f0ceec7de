use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "konnect";

/// OS-keychain memory of an attendee's access code, so returning users
/// skip the badge scan. Never written to the cache store.
pub struct CredentialStore {
    conference: String,
}

impl CredentialStore {
    pub fn new(conference: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.conference).context("Failed to create keyring entry")
    }

    /// Store the access code for this conference in the OS keychain
    pub fn store(&self, access_code: &str) -> Result<()> {
        self.entry()?
            .set_password(access_code)
            .context("Failed to store access code in keychain")?;
        Ok(())
    }

    /// Retrieve the stored access code for this conference
    pub fn get(&self) -> Result<String> {
        self.entry()?
            .get_password()
            .context("Failed to retrieve access code from keychain")
    }

    /// Delete the stored access code
    pub fn delete(&self) -> Result<()> {
        self.entry()?
            .delete_credential()
            .context("Failed to delete access code from keychain")?;
        Ok(())
    }

    /// Check if an access code is stored for this conference
    pub fn has_credentials(&self) -> bool {
        self.entry()
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}
