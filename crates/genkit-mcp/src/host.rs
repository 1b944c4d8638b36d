//! MCP host: owns the connected providers and the resource registry
//!
//! The host is an explicit object owned by the application. Several hosts can
//! live side by side in one process, each with its own providers.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use genkit_mcp_protocol::{Cursor, Resource, ResourceTemplate, methods};

use crate::config::HostConfig;
use crate::error::{McpError, McpResult, ProviderError};
use crate::provider::{ResourceProvider, SharedProvider};
use crate::registry::{ProviderStatus, ProviderSummary, ResourceEntry, ResourceRegistry};
use crate::resource::{FetchPolicy, McpResource, ResourceAction, ResourceOutput};
use crate::uri_template::TemplateVariables;

/// JSON-RPC "method not found": the server has no resource capability
const METHOD_NOT_FOUND: i32 = -32601;

/// Upper bound on pages followed for a single listing
const MAX_LIST_PAGES: usize = 1000;

/// Outcome of enumerating one provider
#[derive(Debug)]
pub struct EnumerationReport {
    pub provider: String,
    /// Entries that entered the registry
    pub registered: usize,
    /// Templates rejected at compile time; each is logged and skipped
    pub rejected: Vec<McpError>,
}

/// A resource matched by URI, with the variables bound by the match
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub resource: McpResource,
    pub variables: TemplateVariables,
}

struct Enumeration {
    entries: Vec<ResourceEntry>,
    rejected: Vec<McpError>,
}

/// A connected provider and the registry generation it was published under
#[derive(Clone)]
struct Connection {
    provider: SharedProvider,
    id: u64,
}

/// Host for MCP resource providers.
///
/// Lock order: `providers` before the registry. Every registry mutation
/// happens while `providers` is write-locked, so the two never disagree about
/// which providers are connected.
pub struct McpHost {
    config: HostConfig,
    registry: Arc<ResourceRegistry>,
    providers: RwLock<HashMap<String, Connection>>,
}

impl McpHost {
    pub fn new(config: HostConfig) -> McpResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(ResourceRegistry::new()),
            providers: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Connect a provider and register its resources and templates.
    ///
    /// Fails with `ProviderUnavailable` if enumeration fails; nothing is
    /// registered in that case.
    pub async fn connect(
        &self,
        name: impl Into<String>,
        provider: SharedProvider,
    ) -> McpResult<EnumerationReport> {
        let name = name.into();
        if self.providers.read().contains_key(&name) {
            return Err(McpError::AlreadyConnected(name));
        }

        info!(host = %self.config.name, provider = %name, "Connecting MCP resource provider");
        let enumeration = self
            .enumerate(&name, provider.as_ref())
            .await
            .map_err(|e| McpError::provider_unavailable(&name, e))?;

        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(McpError::AlreadyConnected(name));
        }
        let (id, report) = self.publish(&name, enumeration);
        providers.insert(name, Connection { provider, id });
        Ok(report)
    }

    /// Connect several providers concurrently, one task per provider.
    ///
    /// Each provider succeeds or fails independently.
    pub async fn connect_all(
        &self,
        providers: Vec<(String, SharedProvider)>,
    ) -> Vec<McpResult<EnumerationReport>> {
        join_all(
            providers
                .into_iter()
                .map(|(name, provider)| self.connect(name, provider)),
        )
        .await
    }

    /// Disconnect a provider; its entries stop matching immediately
    pub fn disconnect(&self, name: &str) -> McpResult<()> {
        let mut providers = self.providers.write();
        if providers.remove(name).is_none() {
            return Err(McpError::UnknownProvider(name.to_string()));
        }
        self.registry.remove(name);
        drop(providers);
        info!(host = %self.config.name, provider = %name, "Disconnected MCP resource provider");
        Ok(())
    }

    /// Keep a provider connected but exclude its entries from matching
    pub fn disable(&self, name: &str) -> McpResult<()> {
        let providers = self.providers.write();
        if !providers.contains_key(name) {
            return Err(McpError::UnknownProvider(name.to_string()));
        }
        self.registry.set_status(name, ProviderStatus::Disabled);
        drop(providers);
        info!(host = %self.config.name, provider = %name, "Disabled MCP resource provider");
        Ok(())
    }

    /// Re-enable a disabled provider by enumerating it again
    pub async fn enable(&self, name: &str) -> McpResult<EnumerationReport> {
        let connection = self
            .providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownProvider(name.to_string()))?;
        info!(host = %self.config.name, provider = %name, "Enabling MCP resource provider");
        self.refresh_provider(name, connection).await
    }

    /// Re-enumerate every enabled provider concurrently.
    ///
    /// A provider that fails is marked unavailable and its entries stop
    /// matching; the others are refreshed regardless.
    pub async fn refresh(&self) -> Vec<(String, McpResult<EnumerationReport>)> {
        let targets: Vec<(String, Connection)> = self
            .providers
            .read()
            .iter()
            .filter(|(name, _)| self.registry.status(name) != Some(ProviderStatus::Disabled))
            .map(|(name, connection)| (name.clone(), connection.clone()))
            .collect();

        join_all(targets.into_iter().map(|(name, connection)| async move {
            let result = self.refresh_provider(&name, connection).await;
            (name, result)
        }))
        .await
    }

    pub fn status(&self, name: &str) -> Option<ProviderStatus> {
        self.registry.status(name)
    }

    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.registry.providers()
    }

    /// All matchable resources, in match order
    pub fn resources(&self) -> Vec<McpResource> {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|entry| self.bind(Arc::clone(entry)))
            .collect()
    }

    /// Resources as host actions
    pub fn actions(&self) -> Vec<Arc<dyn ResourceAction>> {
        self.resources()
            .into_iter()
            .map(|resource| Arc::new(resource) as Arc<dyn ResourceAction>)
            .collect()
    }

    /// Find the resource serving `uri`; `None` means the reference is unresolved.
    ///
    /// Candidates whose provider went away after the snapshot was taken are
    /// skipped in favour of the next match.
    pub fn resolve(&self, uri: &str) -> Option<ResolvedResource> {
        self.registry.snapshot().iter().find_map(|entry| {
            let variables = entry.template().try_extract(uri)?;
            let Some(resource) = self.bind(Arc::clone(entry)) else {
                debug!(
                    uri = %uri,
                    provider = %entry.provider(),
                    "Skipping resource from a replaced provider connection"
                );
                return None;
            };
            Some(ResolvedResource {
                resource,
                variables,
            })
        })
    }

    /// Resolve and read `uri`. `Ok(None)` when no registered resource matches.
    pub async fn read(
        &self,
        uri: &str,
        cancel: &CancellationToken,
    ) -> McpResult<Option<ResourceOutput>> {
        let Some(resolved) = self.resolve(uri) else {
            debug!(host = %self.config.name, uri = %uri, "No MCP resource matches URI");
            return Ok(None);
        };
        resolved.resource.execute(uri, cancel).await.map(Some)
    }

    /// Read several URIs concurrently; a failure never cancels sibling reads
    pub async fn read_many(
        &self,
        uris: &[&str],
        cancel: &CancellationToken,
    ) -> Vec<McpResult<Option<ResourceOutput>>> {
        join_all(uris.iter().map(|uri| self.read(uri, cancel))).await
    }

    fn bind(&self, entry: Arc<ResourceEntry>) -> Option<McpResource> {
        let provider = self
            .providers
            .read()
            .get(entry.provider())
            .filter(|connection| connection.id == entry.connection())
            .map(|connection| Arc::clone(&connection.provider))?;
        let name = if self.config.namespace_resources {
            format!("{}/{}", entry.provider(), entry.name())
        } else {
            entry.name().to_string()
        };
        let policy = FetchPolicy {
            read_timeout: self.config.timeouts.read,
            retry: self.config.retry.clone(),
        };
        Some(McpResource::new(
            name,
            entry,
            provider,
            Arc::clone(&self.registry),
            policy,
        ))
    }

    async fn refresh_provider(
        &self,
        name: &str,
        connection: Connection,
    ) -> McpResult<EnumerationReport> {
        let outcome = self.enumerate(name, connection.provider.as_ref()).await;

        let providers = self.providers.write();
        // Skip if disconnected or reconnected while enumerating
        if providers.get(name).map(|current| current.id) != Some(connection.id) {
            return Err(McpError::UnknownProvider(name.to_string()));
        }

        match outcome {
            Ok(enumeration) => Ok(self.publish(name, enumeration).1),
            Err(e) => {
                self.registry
                    .set_status(name, ProviderStatus::Unavailable(e.to_string()));
                drop(providers);
                warn!(
                    host = %self.config.name,
                    provider = %name,
                    error = %e,
                    "MCP resource provider unavailable, its resources will not match"
                );
                Err(McpError::provider_unavailable(name, e))
            }
        }
    }

    /// Register enumerated entries; callers hold the `providers` write lock
    fn publish(&self, name: &str, enumeration: Enumeration) -> (u64, EnumerationReport) {
        let registered = enumeration.entries.len();
        let id = self
            .registry
            .upsert(name, enumeration.entries, ProviderStatus::Connected);
        info!(
            host = %self.config.name,
            provider = %name,
            registered = registered,
            rejected = enumeration.rejected.len(),
            "Registered MCP resources"
        );
        let report = EnumerationReport {
            provider: name.to_string(),
            registered,
            rejected: enumeration.rejected,
        };
        (id, report)
    }

    /// List static resources and templates (concurrently) and compile them.
    ///
    /// Static resources come first in the match order, then templates, each in
    /// listing order.
    async fn enumerate(
        &self,
        name: &str,
        provider: &dyn ResourceProvider,
    ) -> Result<Enumeration, ProviderError> {
        let deadline = self.config.timeouts.list;
        let listing = async {
            tokio::try_join!(list_all_resources(provider), list_all_templates(provider))
        };
        let (resources, templates) = tokio::time::timeout(deadline, listing)
            .await
            .map_err(|_| ProviderError::Timeout(deadline))??;

        let mut entries = Vec::with_capacity(resources.len() + templates.len());
        let mut rejected = Vec::new();

        let compiled = resources
            .iter()
            .map(|r| ResourceEntry::from_resource(name, r))
            .chain(templates.iter().map(|t| ResourceEntry::from_template(name, t)));

        for result in compiled {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(provider = %name, error = %e, "Rejected MCP resource template");
                    rejected.push(e);
                }
            }
        }

        Ok(Enumeration { entries, rejected })
    }
}

impl std::fmt::Debug for McpHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpHost")
            .field("name", &self.config.name)
            .field("providers", &self.registry.providers())
            .finish()
    }
}

/// Servers without resource support answer "method not found"; treat as empty
fn empty_if_unsupported<T>(
    result: Result<Vec<T>, ProviderError>,
) -> Result<Vec<T>, ProviderError> {
    match result {
        Err(ProviderError::Server { code, .. }) if code == METHOD_NOT_FOUND => Ok(Vec::new()),
        other => other,
    }
}

async fn list_all_resources(
    provider: &dyn ResourceProvider,
) -> Result<Vec<Resource>, ProviderError> {
    let mut all = Vec::new();
    let mut cursor: Option<Cursor> = None;
    for _ in 0..MAX_LIST_PAGES {
        let page = match provider.list_resources(cursor.clone()).await {
            Ok(page) => page,
            Err(e) => return empty_if_unsupported(Err(e)),
        };
        all.extend(page.resources);
        match page.next_cursor {
            Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
            _ => return Ok(all),
        }
    }
    warn!(
        method = methods::RESOURCES_LIST,
        pages = MAX_LIST_PAGES,
        "Stopped following pagination"
    );
    Ok(all)
}

async fn list_all_templates(
    provider: &dyn ResourceProvider,
) -> Result<Vec<ResourceTemplate>, ProviderError> {
    let mut all = Vec::new();
    let mut cursor: Option<Cursor> = None;
    for _ in 0..MAX_LIST_PAGES {
        let page = match provider.list_resource_templates(cursor.clone()).await {
            Ok(page) => page,
            Err(e) => return empty_if_unsupported(Err(e)),
        };
        all.extend(page.resource_templates);
        match page.next_cursor {
            Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
            _ => return Ok(all),
        }
    }
    warn!(
        method = methods::RESOURCES_TEMPLATES_LIST,
        pages = MAX_LIST_PAGES,
        "Stopped following pagination"
    );
    Ok(all)
}
