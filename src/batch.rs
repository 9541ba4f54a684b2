// Batch coordinator: unlocks the shares listed in a manifest one after the
// other and stops at the first failure. Whatever was unlocked before the
// failing entry stays unlocked; nothing after it is attempted.

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BatchError, Error, ManifestError, Result};
use crate::session::Session;
use crate::shares::{require, unlock_share};
use crate::transport::Transport;

/// One share to unlock and the password that opens it.
///
/// Manifests use the keys `Name` and `Password`; lowercase keys are
/// accepted as well.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Password", alias = "password")]
    pub password: String,
}

impl UnlockRequest {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        require(&format!("entry {index}: share name"), &self.name)?;
        require(&format!("entry {index} ('{}'): password", self.name), &self.password)
    }
}

impl std::fmt::Debug for UnlockRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockRequest")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An ordered list of shares to unlock, e.g.
/// `[{"Name":"a","Password":"p1"},{"Name":"b","Password":"p2"}]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<UnlockRequest>,
}

impl Manifest {
    /// Decode a manifest from a JSON stream.
    ///
    /// Malformed documents fail with a [`ManifestError`] pointing at the
    /// defect; entries with an empty name or password fail validation.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let manifest: Self = serde_json::from_reader(reader).map_err(ManifestError::from)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_reader(json.as_bytes())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| Error::Manifest(err.into()))
    }

    pub fn validate(&self) -> Result<()> {
        self.entries
            .iter()
            .enumerate()
            .try_for_each(|(index, entry)| entry.validate(index))
    }
}

impl From<Vec<UnlockRequest>> for Manifest {
    fn from(entries: Vec<UnlockRequest>) -> Self {
        Self { entries }
    }
}

/// Unlock every request in order, stopping at the first failure.
pub fn unlock_all<T: Transport>(
    session: &Session<'_, T>,
    requests: &[UnlockRequest],
) -> std::result::Result<(), BatchError> {
    unlock_all_with_progress(session, requests, |_, _| {})
}

/// Like [`unlock_all`], calling `on_unlocked` after each share that opened.
pub fn unlock_all_with_progress<T, F>(
    session: &Session<'_, T>,
    requests: &[UnlockRequest],
    mut on_unlocked: F,
) -> std::result::Result<(), BatchError>
where
    T: Transport,
    F: FnMut(usize, &UnlockRequest),
{
    for (index, request) in requests.iter().enumerate() {
        debug!(index, share = %request.name, "unlocking");
        if let Err(err) = unlock_share(session, &request.name, &request.password) {
            return Err(BatchError {
                index,
                share: request.name.clone(),
                source: Box::new(err),
            });
        }
        on_unlocked(index, request);
    }
    info!(count = requests.len(), "batch unlock complete");
    Ok(())
}
