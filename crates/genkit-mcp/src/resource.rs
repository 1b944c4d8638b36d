//! Resource actions exposed to the Genkit host
//!
//! An [`McpResource`] wraps one registered entry together with the provider
//! that owns it. The generation pipeline asks `matches(uri)` to pick a resource
//! and `execute` to obtain content parts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use genkit_mcp_protocol::{ReadResourceResult, methods};

use crate::config::RetryConfig;
use crate::content::{Part, translate_contents};
use crate::error::{McpError, McpResult, ProviderError};
use crate::provider::{ResourceProvider, SharedProvider};
use crate::registry::{ResourceEntry, ResourceRegistry};
use crate::uri_template::TemplateVariables;

/// Host collaborator interface for resolving resource references
#[async_trait]
pub trait ResourceAction: Send + Sync {
    /// Action name as registered with the host
    fn name(&self) -> &str;

    /// Whether this action serves `uri`
    fn matches(&self, uri: &str) -> bool;

    /// Read `uri` and translate its content
    async fn execute(&self, uri: &str, cancel: &CancellationToken) -> McpResult<ResourceOutput>;

    /// Build the URI from `variables`, then read it
    async fn execute_with_variables(
        &self,
        variables: &TemplateVariables,
        cancel: &CancellationToken,
    ) -> McpResult<ResourceOutput>;
}

/// Content returned for one resource read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceOutput {
    /// URI as requested by the caller
    pub uri: String,
    pub variables: TemplateVariables,
    pub content: Vec<Part>,
}

/// Deadline and retry behaviour for resource reads
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub read_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Issue `resources/read`, honouring the deadline, cancellation and retry policy.
///
/// Cancellation drops the in-flight provider future.
pub async fn fetch_resource(
    provider: &dyn ResourceProvider,
    uri: &str,
    policy: &FetchPolicy,
    cancel: &CancellationToken,
) -> Result<ReadResourceResult, ProviderError> {
    let mut attempt = 0u32;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(policy.read_timeout, provider.read_resource(uri)) => {
                result.unwrap_or(Err(ProviderError::Timeout(policy.read_timeout)))
            }
        };

        let error = match outcome {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        attempt += 1;
        if !error.is_retryable() || !policy.retry.should_retry(attempt) {
            return Err(error);
        }

        let delay = policy.retry.delay_for_attempt(attempt);
        warn!(
            method = methods::RESOURCES_READ,
            uri = %uri,
            attempt = attempt,
            max_attempts = policy.retry.max_attempts,
            error = %error,
            "Resource read failed, retrying in {:?}",
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// A resource entry bound to its provider
#[derive(Clone)]
pub struct McpResource {
    name: String,
    entry: Arc<ResourceEntry>,
    provider: SharedProvider,
    registry: Arc<ResourceRegistry>,
    policy: FetchPolicy,
}

impl McpResource {
    pub fn new(
        name: impl Into<String>,
        entry: Arc<ResourceEntry>,
        provider: SharedProvider,
        registry: Arc<ResourceRegistry>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            entry,
            provider,
            registry,
            policy,
        }
    }

    pub fn entry(&self) -> &ResourceEntry {
        &self.entry
    }

    pub fn description(&self) -> Option<&str> {
        self.entry.description()
    }

    /// Whether the provider connection this handle was bound to is still
    /// registered and active
    pub fn is_available(&self) -> bool {
        self.registry.is_current(&self.entry)
    }

    async fn read(
        &self,
        uri: &str,
        variables: TemplateVariables,
        cancel: &CancellationToken,
    ) -> McpResult<ResourceOutput> {
        if !self.is_available() {
            return Err(McpError::provider_unavailable(
                self.entry.provider(),
                ProviderError::Closed,
            ));
        }

        debug!(
            resource = %self.name,
            provider = %self.entry.provider(),
            uri = %uri,
            "Reading MCP resource"
        );

        let result = fetch_resource(self.provider.as_ref(), uri, &self.policy, cancel)
            .await
            .map_err(|e| McpError::fetch_failed(uri, e))?;

        let content = translate_contents(uri, result.contents, self.entry.mime_type())
            .map_err(|e| McpError::fetch_failed(uri, e))?;

        Ok(ResourceOutput {
            uri: uri.to_string(),
            variables,
            content,
        })
    }
}

#[async_trait]
impl ResourceAction for McpResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, uri: &str) -> bool {
        self.is_available() && self.entry.template().matches(uri)
    }

    async fn execute(&self, uri: &str, cancel: &CancellationToken) -> McpResult<ResourceOutput> {
        let variables = self.entry.template().extract(uri)?;
        self.read(uri, variables, cancel).await
    }

    async fn execute_with_variables(
        &self,
        variables: &TemplateVariables,
        cancel: &CancellationToken,
    ) -> McpResult<ResourceOutput> {
        let uri = self.entry.template().expand(variables)?;
        self.execute(&uri, cancel).await
    }
}

impl std::fmt::Debug for McpResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpResource")
            .field("name", &self.name)
            .field("pattern", &self.entry.pattern())
            .field("provider", &self.entry.provider())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InMemoryProvider, ProviderResult};
    use crate::registry::ProviderStatus;
    use genkit_mcp_protocol::{
        Cursor, ListResourceTemplatesResult, ListResourcesResult, ResourceContent,
        ResourceTemplate,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a retryable error a fixed number of times, then succeeds
    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
        error: ProviderError,
    }

    #[async_trait]
    impl ResourceProvider for FlakyProvider {
        async fn list_resources(&self, _: Option<Cursor>) -> ProviderResult<ListResourcesResult> {
            Ok(ListResourcesResult::new(vec![]))
        }

        async fn list_resource_templates(
            &self,
            _: Option<Cursor>,
        ) -> ProviderResult<ListResourceTemplatesResult> {
            Ok(ListResourceTemplatesResult::new(vec![]))
        }

        async fn read_resource(&self, uri: &str) -> ProviderResult<ReadResourceResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(ReadResourceResult::single(ResourceContent::text(uri, "ok")))
        }
    }

    /// Never answers
    struct HangingProvider;

    #[async_trait]
    impl ResourceProvider for HangingProvider {
        async fn list_resources(&self, _: Option<Cursor>) -> ProviderResult<ListResourcesResult> {
            Ok(ListResourcesResult::new(vec![]))
        }

        async fn list_resource_templates(
            &self,
            _: Option<Cursor>,
        ) -> ProviderResult<ListResourceTemplatesResult> {
            Ok(ListResourceTemplatesResult::new(vec![]))
        }

        async fn read_resource(&self, _: &str) -> ProviderResult<ReadResourceResult> {
            std::future::pending::<ProviderResult<ReadResourceResult>>().await
        }
    }

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            read_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(10),
                jitter: 0.0,
                ..RetryConfig::default()
            },
        }
    }

    fn resource_for(pattern: &str, provider: SharedProvider) -> McpResource {
        let registry = Arc::new(ResourceRegistry::new());
        let descriptor = ResourceTemplate::new("data", pattern);
        let entry = ResourceEntry::from_template("files", &descriptor).unwrap();
        registry.upsert("files", vec![entry], ProviderStatus::Connected);
        let entry = Arc::clone(&registry.snapshot()[0]);
        McpResource::new("files/data", entry, provider, registry, fast_policy())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let provider = Arc::new(FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
            error: ProviderError::transport("connection reset"),
        });

        let cancel = CancellationToken::new();
        let result = fetch_resource(provider.as_ref(), "x://a", &fast_policy(), &cancel)
            .await
            .unwrap();
        assert_eq!(result.contents.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_permanent_failures() {
        let provider = FlakyProvider {
            failures: 5,
            calls: AtomicU32::new(0),
            error: ProviderError::server(-32602, "bad uri"),
        };

        let err = fetch_resource(&provider, "x://a", &fast_policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Server { code: -32602, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deadline() {
        let policy = FetchPolicy {
            read_timeout: Duration::from_millis(250),
            retry: RetryConfig::disabled(),
        };

        let err = fetch_resource(&HangingProvider, "x://a", &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Timeout(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_read() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = fetch_resource(&HangingProvider, "x://a", &fast_policy(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Cancelled);
    }

    #[tokio::test]
    async fn test_execute_returns_variables_and_parts() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new().with_template(
            ResourceTemplate::new("data", "file://data/{filename}"),
            |uri| Ok(vec![ResourceContent::text(uri, "payload")]),
        ));
        let resource = resource_for("file://data/{filename}", provider);

        assert!(resource.matches("file://data/notes.txt?rev=2"));
        let output = resource
            .execute("file://data/notes.txt?rev=2", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.uri, "file://data/notes.txt?rev=2");
        assert_eq!(output.variables.get("filename"), Some("notes.txt"));
        assert_eq!(output.content, vec![Part::Text("payload".to_string())]);
    }

    #[tokio::test]
    async fn test_execute_with_variables_expands_uri() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new().with_template(
            ResourceTemplate::new("docs", "file://docs/{filename}"),
            |uri| Ok(vec![ResourceContent::text(uri, uri)]),
        ));
        let resource = resource_for("file://docs/{filename}", provider);

        let variables: TemplateVariables =
            [("filename", "hello world.pdf")].into_iter().collect();
        let output = resource
            .execute_with_variables(&variables, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.uri, "file://docs/hello%20world.pdf");
        assert_eq!(output.variables.get("filename"), Some("hello world.pdf"));
    }

    #[tokio::test]
    async fn test_execute_rejects_unmatched_uri() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new());
        let resource = resource_for("file://data/{filename}", provider);

        let err = resource
            .execute("file://other/x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_tagged_with_uri() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new());
        let resource = resource_for("file://data/{filename}", provider);

        let err = resource
            .execute("file://data/missing.txt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_fetch_failure());
        assert_eq!(err.uri(), Some("file://data/missing.txt"));
    }

    #[tokio::test]
    async fn test_unavailable_provider_does_not_match() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new());
        let resource = resource_for("file://data/{filename}", provider);
        resource.registry.set_status("files", ProviderStatus::Disabled);

        assert!(!resource.matches("file://data/a.txt"));
        let err = resource
            .execute("file://data/a.txt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_handle_from_previous_connection_stays_unavailable() {
        let provider: SharedProvider = Arc::new(InMemoryProvider::new().with_template(
            ResourceTemplate::new("data", "file://data/{filename}"),
            |uri| Ok(vec![ResourceContent::text(uri, "old")]),
        ));
        let resource = resource_for("file://data/{filename}", provider);
        assert!(resource.matches("file://data/a.txt"));

        // Same provider name, new connection
        resource.registry.remove("files");
        let descriptor = ResourceTemplate::new("data", "file://data/{filename}");
        let entry = ResourceEntry::from_template("files", &descriptor).unwrap();
        resource
            .registry
            .upsert("files", vec![entry], ProviderStatus::Connected);

        assert!(!resource.matches("file://data/a.txt"));
        let err = resource
            .execute("file://data/a.txt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ProviderUnavailable { .. }));
    }
}
