// Webhook registry - name to target table
//
// Holds:
// - The mapping from webhook name to its ordered target list
// - Shared-read / exclusive-write access over the whole map
//
// The table is written during startup and read for the rest of the
// process lifetime. No entry is ever removed.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors returned by registry mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name is already registered and override was not requested
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// Webhook names must be non-empty
    #[error("webhook name must not be empty")]
    EmptyName,
}

/// Symbolic webhook identifier, used as the registry key and the inbound path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WebhookName(String);

impl WebhookName {
    /// Create a name, rejecting the empty string
    pub fn new(name: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for WebhookName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for WebhookName {
    type Error = RegistryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// A backend URL that payloads are forwarded to
///
/// Kept as the configured string; it is parsed again by each delivery task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetEndpoint(String);

impl TargetEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetEndpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetEndpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A name together with its (possibly empty) ordered target list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub name: WebhookName,
    pub targets: Vec<TargetEndpoint>,
}

impl WebhookRegistration {
    pub fn new(name: WebhookName, targets: Vec<TargetEndpoint>) -> Self {
        Self { name, targets }
    }
}

/// Concurrent name -> targets table
///
/// A single lock guards the whole map. Lookups take the shared side and run
/// in parallel; `set` and `init` take the exclusive side. Lookups hand out an
/// `Arc` of the target list so no guard outlives the call.
#[derive(Debug, Default)]
pub struct Registry {
    webhooks: RwLock<HashMap<WebhookName, Arc<[TargetEndpoint]>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            webhooks: RwLock::new(HashMap::new()),
        }
    }

    /// Reset the registry to empty
    ///
    /// Only meant to run before serving starts, with no lookups in flight.
    pub async fn init(&self) {
        let mut webhooks = self.webhooks.write().await;
        webhooks.clear();
    }

    /// Insert or replace the targets for `name`
    ///
    /// Fails with [`RegistryError::DuplicateName`] when `name` exists and
    /// `allow_override` is false; existing state is left untouched in that case.
    pub async fn set(
        &self,
        name: WebhookName,
        targets: Vec<TargetEndpoint>,
        allow_override: bool,
    ) -> Result<(), RegistryError> {
        let mut webhooks = self.webhooks.write().await;

        if !allow_override && webhooks.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        debug!(webhook = %name, count = targets.len(), "registering webhook");
        webhooks.insert(name, targets.into());
        Ok(())
    }

    /// Insert a full registration without override permission
    pub async fn register(&self, registration: WebhookRegistration) -> Result<(), RegistryError> {
        self.set(registration.name, registration.targets, false).await
    }

    /// Look up the targets for `name`
    ///
    /// `None` means the name was never set. `Some` with an empty slice means
    /// the name is registered without targets.
    pub async fn get(&self, name: &str) -> Option<Arc<[TargetEndpoint]>> {
        let webhooks = self.webhooks.read().await;
        webhooks.get(name).map(Arc::clone)
    }

    /// Number of registered names
    pub async fn len(&self) -> usize {
        self.webhooks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.webhooks.read().await.is_empty()
    }

    /// Registered names in sorted order
    pub async fn names(&self) -> Vec<WebhookName> {
        let webhooks = self.webhooks.read().await;
        let mut names: Vec<WebhookName> = webhooks.keys().cloned().collect();
        names.sort();
        names
    }
}
