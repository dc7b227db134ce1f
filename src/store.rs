//! Provider configuration document persistence.
//!
//! Owns the on-disk JSON document mapping provider name → configuration.
//! The persisted document is the source of truth for declared configuration
//! and survives process restarts; live connection state is rebuilt from it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::error;

use crate::types::Result;

fn default_active() -> bool {
    true
}

/// One provider entry in the configuration document.
///
/// Everything besides `active` is transport-specific and passed through
/// unmodified; the core never interprets those fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_active")]
    pub active: bool,

    /// Opaque transport fields (command, url, env, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: true,
            extra: Map::new(),
        }
    }
}

/// The full persisted configuration document.
///
/// Always contains the top-level `mcpServers` mapping, defaulting to empty.
/// A `BTreeMap` keeps the on-disk ordering stable across rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(rename = "mcpServers", default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Load/save access to the provider configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document.
    ///
    /// A missing file is created with the default document. An unreadable or
    /// corrupt file is logged and degrades to the default in memory without
    /// touching the file on disk — availability over consistency for a
    /// non-critical admin surface.
    pub async fn load(&self) -> Document {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(doc) => doc,
                Err(err) => {
                    error!(path = %self.path.display(), "corrupt provider document: {err}");
                    Document::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let doc = Document::default();
                if let Err(err) = self.save(&doc).await {
                    error!(
                        path = %self.path.display(),
                        "failed to persist default provider document: {err}"
                    );
                }
                doc
            }
            Err(err) => {
                error!(path = %self.path.display(), "failed to read provider document: {err}");
                Document::default()
            }
        }
    }

    /// Persist the full document, overwriting the previous contents.
    ///
    /// Writes to a temporary file in the same directory and renames it into
    /// place so readers never observe a half-written document.
    pub async fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Unique temp name so concurrent saves cannot clobber each other's
        // staging file; the rename itself is last-writer-wins.
        static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);

        let raw = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension(format!("json.tmp{n}"));
        fs::write(&tmp, raw.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
