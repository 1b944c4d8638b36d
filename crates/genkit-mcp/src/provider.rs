//! Remote resource providers
//!
//! A provider is whatever sits on the other side of an MCP connection. The
//! host only needs the three resource calls below; transports and session
//! negotiation are the provider implementation's business.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use genkit_mcp_protocol::{
    Cursor, ListResourceTemplatesResult, ListResourcesResult, ReadResourceResult, Resource,
    ResourceContent, ResourceTemplate,
};

use crate::error::ProviderError;
use crate::uri_template::{UriTemplate, normalize_uri};

/// JSON-RPC error code MCP servers use for unknown resources
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Resource surface of a connected MCP server
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// `resources/list`, one page
    async fn list_resources(&self, cursor: Option<Cursor>) -> ProviderResult<ListResourcesResult>;

    /// `resources/templates/list`, one page
    async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> ProviderResult<ListResourceTemplatesResult>;

    /// `resources/read`
    async fn read_resource(&self, uri: &str) -> ProviderResult<ReadResourceResult>;
}

/// Boxed provider handle shared between the host and its resource actions
pub type SharedProvider = Arc<dyn ResourceProvider>;

/// Reads the contents for a URI matched by an in-memory template
pub type TemplateReader =
    Arc<dyn Fn(&str) -> ProviderResult<Vec<ResourceContent>> + Send + Sync>;

struct TemplateEntry {
    descriptor: ResourceTemplate,
    template: Option<UriTemplate>,
    reader: TemplateReader,
}

/// Provider backed by in-process data.
///
/// Static resources are served verbatim; template reads are dispatched to the
/// registered reader for the first template whose pattern matches.
#[derive(Default)]
pub struct InMemoryProvider {
    resources: Vec<(Resource, Vec<ResourceContent>)>,
    templates: Vec<TemplateEntry>,
    page_size: Option<usize>,
    read_count: AtomicU64,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: Resource, contents: Vec<ResourceContent>) -> Self {
        self.resources.push((resource, contents));
        self
    }

    /// Register a template; a pattern the host cannot compile is still listed
    /// but never served.
    pub fn with_template<F>(mut self, descriptor: ResourceTemplate, reader: F) -> Self
    where
        F: Fn(&str) -> ProviderResult<Vec<ResourceContent>> + Send + Sync + 'static,
    {
        let template = UriTemplate::new(&descriptor.uri_template).ok();
        self.templates.push(TemplateEntry {
            descriptor,
            template,
            reader: Arc::new(reader),
        });
        self
    }

    /// Split listings into pages of `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Number of `resources/read` calls served so far
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    fn page<T: Clone>(
        &self,
        items: &[T],
        cursor: Option<Cursor>,
    ) -> ProviderResult<(Vec<T>, Option<Cursor>)> {
        let start = match cursor {
            Some(cursor) => cursor.as_str().parse::<usize>().map_err(|_| {
                ProviderError::server(-32602, format!("Invalid cursor: {}", cursor))
            })?,
            None => 0,
        };
        let Some(page_size) = self.page_size else {
            return Ok((items.get(start..).unwrap_or_default().to_vec(), None));
        };

        let end = (start + page_size).min(items.len());
        let page = items.get(start..end).unwrap_or_default().to_vec();
        let next = (end < items.len()).then(|| Cursor::new(end.to_string()));
        Ok((page, next))
    }
}

#[async_trait]
impl ResourceProvider for InMemoryProvider {
    async fn list_resources(&self, cursor: Option<Cursor>) -> ProviderResult<ListResourcesResult> {
        let all: Vec<Resource> = self.resources.iter().map(|(r, _)| r.clone()).collect();
        let (page, next) = self.page(&all, cursor)?;
        let mut result = ListResourcesResult::new(page);
        result.next_cursor = next;
        Ok(result)
    }

    async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> ProviderResult<ListResourceTemplatesResult> {
        let all: Vec<ResourceTemplate> =
            self.templates.iter().map(|t| t.descriptor.clone()).collect();
        let (page, next) = self.page(&all, cursor)?;
        let mut result = ListResourceTemplatesResult::new(page);
        result.next_cursor = next;
        Ok(result)
    }

    async fn read_resource(&self, uri: &str) -> ProviderResult<ReadResourceResult> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let normalized = normalize_uri(uri);

        if let Some((_, contents)) = self
            .resources
            .iter()
            .find(|(r, _)| normalize_uri(&r.uri) == normalized)
        {
            debug!(uri = %uri, "Serving static in-memory resource");
            return Ok(ReadResourceResult::new(contents.clone()));
        }

        for entry in &self.templates {
            if entry.template.as_ref().is_some_and(|t| t.matches(uri)) {
                debug!(
                    uri = %uri,
                    pattern = %entry.descriptor.uri_template,
                    "Serving templated in-memory resource"
                );
                return (entry.reader)(uri).map(ReadResourceResult::new);
            }
        }

        Err(ProviderError::server(
            RESOURCE_NOT_FOUND,
            format!("Resource not found: {}", uri),
        ))
    }
}
