//! Persistent storage for the caregiver contact.
//!
//! A single JSON document (`caregiver.json`) in the data directory. The core only
//! reads it, at the moment an alert is dispatched; the HTTP layer writes it.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Substituted for any caregiver field left empty.
pub const NOT_PROVIDED: &str = "Not Provided";

const CONTACT_FILE: &str = "caregiver.json";

/// Errors raised by contact persistence.
#[derive(Debug, Error)]
pub enum ContactStoreError {
    /// The contact file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The contact file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The contact file is not valid JSON.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseError {
        /// File being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The contact could not be serialized.
    #[error("Failed to serialize contact: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for contact persistence.
pub type ContactStoreResult<T> = std::result::Result<T, ContactStoreError>;

/// Who to notify when a fall is escalated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Priya Sharma",
    "mobile": "+44 7700 900123",
    "email": "priya@example.com"
}))]
pub struct CaregiverContact {
    /// Caregiver name.
    #[serde(default)]
    #[schema(example = "Priya Sharma")]
    pub name: String,

    /// Caregiver mobile number.
    #[serde(default)]
    #[schema(example = "+44 7700 900123")]
    pub mobile: String,

    /// Caregiver email address.
    #[serde(default)]
    #[schema(example = "priya@example.com")]
    pub email: String,
}

impl CaregiverContact {
    /// Copy with surrounding whitespace removed from every field.
    #[must_use]
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            mobile: self.mobile.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }

    /// Copy where every empty field reads [`NOT_PROVIDED`].
    #[must_use]
    pub fn or_not_provided(&self) -> Self {
        fn fill(value: &str) -> String {
            if value.trim().is_empty() {
                NOT_PROVIDED.to_string()
            } else {
                value.to_string()
            }
        }

        Self {
            name: fill(&self.name),
            mobile: fill(&self.mobile),
            email: fill(&self.email),
        }
    }
}

/// Read/write access to the stored caregiver contact.
pub trait ContactStore: Send + Sync {
    /// The stored contact, or an empty one if nothing usable is stored.
    fn get(&self) -> CaregiverContact;

    /// Trim and store `contact`, returning what was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the contact cannot be persisted.
    fn put(&self, contact: &CaregiverContact) -> ContactStoreResult<CaregiverContact>;
}

/// Contact store backed by `caregiver.json`.
#[derive(Debug, Clone)]
pub struct JsonContactStore {
    path: PathBuf,
}

impl JsonContactStore {
    /// Store the contact in `data_dir/caregiver.json`.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(CONTACT_FILE),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ContactStoreResult<Option<CaregiverContact>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| ContactStoreError::ReadError {
                path: self.path.clone(),
                source,
            })?;
        let contact =
            serde_json::from_str(&content).map_err(|source| ContactStoreError::ParseError {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(contact))
    }
}

impl ContactStore for JsonContactStore {
    fn get(&self) -> CaregiverContact {
        match self.load() {
            Ok(contact) => contact.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable caregiver contact");
                CaregiverContact::default()
            }
        }
    }

    fn put(&self, contact: &CaregiverContact) -> ContactStoreResult<CaregiverContact> {
        let contact = contact.trimmed();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ContactStoreError::CreateDirError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&contact)?;
        std::fs::write(&self.path, content).map_err(|source| ContactStoreError::WriteError {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), "Caregiver contact saved");
        Ok(contact)
    }
}

/// In-memory contact store.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    contact: RwLock<CaregiverContact>,
}

impl MemoryContactStore {
    /// Store pre-filled with `contact`.
    #[must_use]
    pub fn with_contact(contact: CaregiverContact) -> Self {
        Self {
            contact: RwLock::new(contact.trimmed()),
        }
    }
}

impl ContactStore for MemoryContactStore {
    fn get(&self) -> CaregiverContact {
        self.contact
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn put(&self, contact: &CaregiverContact) -> ContactStoreResult<CaregiverContact> {
        let contact = contact.trimmed();
        match self.contact.write() {
            Ok(mut guard) => *guard = contact.clone(),
            Err(poisoned) => *poisoned.into_inner() = contact.clone(),
        }
        Ok(contact)
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/fallguard/`
/// Elsewhere: the platform data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/fallguard")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fallguard")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"))
    }
}

/// Default path of the caregiver contact file.
#[must_use]
pub fn default_contact_path() -> PathBuf {
    default_data_dir().join(CONTACT_FILE)
}
