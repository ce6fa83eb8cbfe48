use crate::merge::merge_documents;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("no materialized config for user {0}")]
    NotFound(String),
    #[error("base config template not found: {0}")]
    TemplateMissing(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Exchange credential captured from a user.
#[derive(Debug, Clone)]
pub struct Credential {
    pub wallet_address: String,
    pub private_key: String,
}

/// Materializes isolated per-user worker configurations from a shared JSON
/// template. Each user gets a private working directory so the worker process
/// sees exactly one user's credentials.
#[derive(Clone)]
pub struct UserConfigStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    base: Value,
    user_data_dir: PathBuf,
    strategy_asset: String,
}

impl UserConfigStore {
    /// Reads and parses the shared template once, and ensures the user-data
    /// directory and the shared strategy directory exist.
    ///
    /// # Errors
    ///
    /// Returns `TemplateMissing` if the template file does not exist, or an
    /// I/O / parse error for an unreadable or malformed template.
    pub fn new(
        base_config_path: impl AsRef<Path>,
        user_data_dir: impl Into<PathBuf>,
        strategy_asset: impl Into<String>,
    ) -> Result<Self, ConfigStoreError> {
        let base_config_path = base_config_path.as_ref();
        if !base_config_path.exists() {
            return Err(ConfigStoreError::TemplateMissing(base_config_path.into()));
        }
        let base: Value = serde_json::from_str(&fs::read_to_string(base_config_path)?)?;

        let user_data_dir = user_data_dir.into();
        fs::create_dir_all(user_data_dir.join("strategies"))?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                base,
                user_data_dir,
                strategy_asset: strategy_asset.into(),
            }),
        })
    }

    /// Path of the user's private working directory.
    #[must_use]
    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.inner.user_data_dir.join(format!("user_{user_id}"))
    }

    /// Path of the user's materialized config file.
    #[must_use]
    pub fn config_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("config.json")
    }

    /// Database URL handed to the worker's `--db-url` flag.
    #[must_use]
    pub fn worker_db_url(&self, user_id: &str) -> String {
        format!("sqlite:///{}", self.user_dir(user_id).join("tradesv3.sqlite").display())
    }

    /// Deep-merges user-specific fields onto a copy of the shared template and
    /// serializes the result to the user's config path.
    ///
    /// The notification-routing field (`telegram.chat_id`) is always set to
    /// the owning user's id so a shared notification channel can be routed
    /// back to exactly that user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user directory cannot be created or the merged
    /// document cannot be written.
    pub fn materialize(
        &self,
        user_id: &str,
        credential: &Credential,
        pairs: Option<&[String]>,
    ) -> Result<PathBuf, ConfigStoreError> {
        let mut doc = self.inner.base.clone();

        let mut overrides = json!({
            "exchange": {
                "walletAddress": credential.wallet_address,
                "privateKey": credential.private_key,
            },
            "telegram": {
                "chat_id": user_id,
            },
            "bot_name": format!("HyperliquidTrader_User_{user_id}"),
        });
        if let Some(pairs) = pairs {
            merge_documents(
                &mut overrides,
                &json!({"exchange": {"pair_whitelist": pairs}}),
            );
        }
        merge_documents(&mut doc, &overrides);

        let user_dir = self.user_dir(user_id);
        let strategies_dir = user_dir.join("strategies");
        fs::create_dir_all(&strategies_dir)?;
        self.copy_strategy_asset(&strategies_dir)?;

        let config_path = self.config_path(user_id);
        fs::write(&config_path, serde_json::to_string_pretty(&doc)?)?;
        info!(user_id, path = %config_path.display(), "materialized user config");
        Ok(config_path)
    }

    /// Recursively merges `patch` into an existing materialized config.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no materialized config yet.
    pub fn update(&self, user_id: &str, patch: &Value) -> Result<PathBuf, ConfigStoreError> {
        let config_path = self.config_path(user_id);
        if !config_path.exists() {
            return Err(ConfigStoreError::NotFound(user_id.to_string()));
        }

        let mut doc: Value = serde_json::from_str(&fs::read_to_string(&config_path)?)?;
        merge_documents(&mut doc, patch);
        fs::write(&config_path, serde_json::to_string_pretty(&doc)?)?;
        info!(user_id, "updated user config");
        Ok(config_path)
    }

    /// Reads a user's materialized config, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unreadable or malformed existing file.
    pub fn read(&self, user_id: &str) -> Result<Option<Value>, ConfigStoreError> {
        let config_path = self.config_path(user_id);
        if !config_path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(config_path)?)?))
    }

    /// Removes the user's entire working directory tree. Returns `false` if
    /// nothing existed, without raising.
    pub fn delete(&self, user_id: &str) -> bool {
        let user_dir = self.user_dir(user_id);
        if !user_dir.exists() {
            return false;
        }
        match fs::remove_dir_all(&user_dir) {
            Ok(()) => {
                info!(user_id, "deleted user data");
                true
            }
            Err(e) => {
                warn!(user_id, error = %e, "failed to delete user data");
                false
            }
        }
    }

    /// User ids derived from the existing per-user working directories.
    #[must_use]
    pub fn list_user_ids(&self) -> BTreeSet<String> {
        let Ok(entries) = fs::read_dir(&self.inner.user_data_dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("user_"))
                    .map(ToString::to_string)
            })
            .collect()
    }

    fn copy_strategy_asset(&self, strategies_dir: &Path) -> Result<(), ConfigStoreError> {
        let source = self
            .inner
            .user_data_dir
            .join("strategies")
            .join(&self.inner.strategy_asset);
        let target = strategies_dir.join(&self.inner.strategy_asset);
        if source.exists() && !target.exists() {
            fs::copy(&source, &target)?;
        }
        Ok(())
    }
}
