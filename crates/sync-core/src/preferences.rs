//! Persisted preferences: commit author and the sync watermark.
//!
//! Stored as pretty-printed JSON in `<state_dir>/preferences.json`. The file
//! is loaded when the store is created and rewritten on every mutation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PreferencesError;
use crate::repository::Signature;

const PREFERENCES_FILE: &str = "preferences.json";
const DEFAULT_AUTHOR_NAME: &str = "gitnotes";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    /// End of the last successful index update or background cycle.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    /// Open the preferences in `state_dir`. A missing file yields defaults; a
    /// malformed one is logged and replaced on the next save.
    pub fn new(state_dir: &Path) -> Self {
        let path = state_dir.join(PREFERENCES_FILE);
        let mut store = Self {
            path,
            prefs: Preferences::default(),
        };

        match store.load() {
            Ok(prefs) => store.prefs = prefs,
            Err(e) => warn!("Ignoring unreadable preferences {}: {}", store.path.display(), e),
        }

        store
    }

    pub fn load(&self) -> Result<Preferences, PreferencesError> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.prefs)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn get(&self) -> &Preferences {
        &self.prefs
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.prefs.last_sync_at
    }

    pub fn record_sync(&mut self, at: DateTime<Utc>) -> Result<(), PreferencesError> {
        self.prefs.last_sync_at = Some(at);
        self.save()
    }

    pub fn set_author(&mut self, name: String, email: String) -> Result<(), PreferencesError> {
        self.prefs.author_name = Some(name);
        self.prefs.author_email = Some(email);
        self.save()
    }

    /// Commit identity: saved preferences, then the repository's git config,
    /// then a generated identity which is saved for next time.
    pub fn resolve_author(
        &mut self,
        from_repo: Option<Signature>,
    ) -> Result<Signature, PreferencesError> {
        if let (Some(name), Some(email)) = (&self.prefs.author_name, &self.prefs.author_email) {
            return Ok(Signature::now(name.clone(), email.clone()));
        }

        if let Some(signature) = from_repo {
            return Ok(signature);
        }

        let suffix: [u8; 4] = rand::rng().random();
        let email = format!("{}-{}@localhost", DEFAULT_AUTHOR_NAME, hex::encode(suffix));
        info!("No commit identity configured, using {}", email);
        self.set_author(DEFAULT_AUTHOR_NAME.to_string(), email.clone())?;
        Ok(Signature::now(DEFAULT_AUTHOR_NAME.to_string(), email))
    }
}
