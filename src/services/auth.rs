use crate::errors::FleetError;
use crate::services::config::FleetConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Username plus private key, built once per run and shared read-only by
/// every executor.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    username: String,
    key_path: PathBuf,
    private_key: String,
    passphrase: Option<String>,
}

impl AuthContext {
    pub fn new(
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
        private_key: impl Into<String>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                username: username.into(),
                key_path: key_path.into(),
                private_key: private_key.into(),
                passphrase,
            }),
        }
    }

    pub fn load(config: &FleetConfig) -> Result<Self, FleetError> {
        let private_key = read_private_key(&config.key_path)?;
        let passphrase = std::env::var("FLEETCMD_SSH_KEY_PASSPHRASE")
            .ok()
            .filter(|value| !value.is_empty());
        Ok(Self::new(
            config.user.clone(),
            config.key_path.clone(),
            private_key,
            passphrase,
        ))
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn key_path(&self) -> &Path {
        &self.inner.key_path
    }

    pub fn private_key(&self) -> &str {
        &self.inner.private_key
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.inner.passphrase.as_deref()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("username", &self.inner.username)
            .field("key_path", &self.inner.key_path)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn read_private_key(path: &Path) -> Result<String, FleetError> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        FleetError::configuration(format!(
            "Failed to read private key {}: {}",
            path.display(),
            err
        ))
        .with_hint("Pass --key or set FLEETCMD_SSH_KEY to a readable private key.")
    })?;
    if !contents.contains("PRIVATE KEY") {
        return Err(FleetError::configuration(format!(
            "{} does not look like a private key",
            path.display()
        )));
    }
    Ok(contents)
}
