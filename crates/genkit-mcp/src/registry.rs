//! Registry of resource templates contributed by connected providers
//!
//! Writers (connect, disconnect, refresh) serialize on a mutex and publish a
//! fresh immutable snapshot of the matchable entries. Readers only clone the
//! current snapshot, so a match running during a reconnect sees either the old
//! or the new candidate list, never a partially built one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use genkit_mcp_protocol::{Resource, ResourceTemplate};

use crate::error::McpResult;
use crate::uri_template::{TemplateVariables, UriTemplate};

/// A compiled template (or literal URI) owned by one provider
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    template: UriTemplate,
    /// Name of the owning provider; used only to route reads
    provider: String,
    /// Registry connection the entry was published under; 0 until registered
    connection: u64,
    name: String,
    title: Option<String>,
    description: Option<String>,
    mime_type: Option<String>,
}

impl ResourceEntry {
    /// Compile an entry from a `resources/templates/list` descriptor
    pub fn from_template(provider: &str, descriptor: &ResourceTemplate) -> McpResult<Self> {
        Ok(Self {
            template: UriTemplate::new(&descriptor.uri_template)?,
            provider: provider.to_string(),
            connection: 0,
            name: descriptor.name.clone(),
            title: descriptor.title.clone(),
            description: descriptor.description.clone(),
            mime_type: descriptor.mime_type.clone(),
        })
    }

    /// Compile an entry from a `resources/list` descriptor
    pub fn from_resource(provider: &str, resource: &Resource) -> McpResult<Self> {
        Ok(Self {
            template: UriTemplate::new(&resource.uri)?,
            provider: provider.to_string(),
            connection: 0,
            name: resource.name.clone(),
            title: resource.title.clone(),
            description: resource.description.clone(),
            mime_type: resource.mime_type.clone(),
        })
    }

    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    pub fn pattern(&self) -> &str {
        self.template.pattern()
    }

    pub fn is_template(&self) -> bool {
        self.template.is_template()
    }

    pub fn variable_names(&self) -> &[String] {
        self.template.variables()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Connection generation of the owning provider slot
    pub fn connection(&self) -> u64 {
        self.connection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to the programmatic name
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

/// Outcome of a successful match
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub entry: Arc<ResourceEntry>,
    pub variables: TemplateVariables,
}

/// Match a URI against candidates in order; the first match wins.
///
/// Candidates are not ranked by specificity: registration order is the only
/// tie-break.
pub fn match_uri(uri: &str, candidates: &[Arc<ResourceEntry>]) -> Option<MatchResult> {
    candidates.iter().find_map(|entry| {
        entry.template.try_extract(uri).map(|variables| {
            debug!(
                uri = %uri,
                pattern = %entry.pattern(),
                provider = %entry.provider,
                "Matched resource URI"
            );
            MatchResult {
                entry: Arc::clone(entry),
                variables,
            }
        })
    })
}

/// Connection state of a provider as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Connected,
    /// Disabled by the host; entries stay registered but never match
    Disabled,
    /// Last enumeration failed; entries never match until a refresh succeeds
    Unavailable(String),
}

impl ProviderStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disabled => write!(f, "disabled"),
            Self::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Summary of one registered provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSummary {
    pub name: String,
    pub status: ProviderStatus,
    pub entry_count: usize,
}

#[derive(Debug)]
struct ProviderSlot {
    name: String,
    /// Assigned when the slot is created; a reconnect under the same name gets a new one
    connection: u64,
    status: ProviderStatus,
    entries: Vec<Arc<ResourceEntry>>,
}

type Snapshot = Arc<[Arc<ResourceEntry>]>;

/// Live list of resource entries across all registered providers
#[derive(Debug)]
pub struct ResourceRegistry {
    /// Writer side, in provider registration order
    providers: Mutex<Vec<ProviderSlot>>,
    /// Reader side: entries of active providers only
    snapshot: RwLock<Snapshot>,
    next_connection: AtomicU64,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(Vec::new()),
            snapshot: RwLock::new(Arc::from(Vec::new())),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Insert a provider's entries, or replace them in place if the provider is
    /// already registered (its position in the match order and its connection
    /// generation are kept). Returns the slot's connection generation.
    pub fn upsert(
        &self,
        provider: &str,
        entries: Vec<ResourceEntry>,
        status: ProviderStatus,
    ) -> u64 {
        let mut providers = self.providers.lock();
        let index = match providers.iter().position(|slot| slot.name == provider) {
            Some(index) => index,
            None => {
                providers.push(ProviderSlot {
                    name: provider.to_string(),
                    connection: self.next_connection.fetch_add(1, Ordering::Relaxed),
                    status: status.clone(),
                    entries: Vec::new(),
                });
                providers.len() - 1
            }
        };

        let slot = &mut providers[index];
        let connection = slot.connection;
        slot.status = status;
        slot.entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.connection = connection;
                Arc::new(entry)
            })
            .collect();

        self.publish(&providers);
        connection
    }

    /// Whether `entry` belongs to the current connection of an active provider
    pub fn is_current(&self, entry: &ResourceEntry) -> bool {
        self.providers.lock().iter().any(|slot| {
            slot.name == entry.provider
                && slot.connection == entry.connection
                && slot.status.is_active()
        })
    }

    /// Remove a provider and all its entries. Returns whether it was registered.
    pub fn remove(&self, provider: &str) -> bool {
        let mut providers = self.providers.lock();
        let before = providers.len();
        providers.retain(|slot| slot.name != provider);
        let removed = providers.len() != before;
        if removed {
            self.publish(&providers);
        }
        removed
    }

    /// Change a provider's status, keeping its entries. Returns whether it was registered.
    pub fn set_status(&self, provider: &str, status: ProviderStatus) -> bool {
        let mut providers = self.providers.lock();
        let Some(slot) = providers.iter_mut().find(|slot| slot.name == provider) else {
            return false;
        };
        slot.status = status;
        self.publish(&providers);
        true
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.lock().iter().any(|slot| slot.name == provider)
    }

    pub fn status(&self, provider: &str) -> Option<ProviderStatus> {
        self.providers
            .lock()
            .iter()
            .find(|slot| slot.name == provider)
            .map(|slot| slot.status.clone())
    }

    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.providers
            .lock()
            .iter()
            .map(|slot| ProviderSummary {
                name: slot.name.clone(),
                status: slot.status.clone(),
                entry_count: slot.entries.len(),
            })
            .collect()
    }

    /// Current matchable entries, in registration order
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    /// Find the first active entry matching `uri`
    pub fn find(&self, uri: &str) -> Option<MatchResult> {
        match_uri(uri, &self.snapshot())
    }

    pub fn clear(&self) {
        let mut providers = self.providers.lock();
        providers.clear();
        self.publish(&providers);
    }

    fn publish(&self, providers: &[ProviderSlot]) {
        let active: Vec<Arc<ResourceEntry>> = providers
            .iter()
            .filter(|slot| slot.status.is_active())
            .flat_map(|slot| slot.entries.iter().cloned())
            .collect();
        debug!(entries = active.len(), "Publishing resource registry snapshot");
        *self.snapshot.write() = Arc::from(active);
    }
}
