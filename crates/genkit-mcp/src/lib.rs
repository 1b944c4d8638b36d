//! # Genkit MCP resource bridge
//!
//! Connects Genkit's generation pipeline to resources exposed by remote MCP
//! servers. Each connected provider contributes static resources and URI
//! templates; a URI referenced in a prompt is matched against them, read from
//! the owning provider and translated into content parts.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use genkit_mcp::{HostConfig, InMemoryProvider, McpHost};
//! use genkit_mcp::protocol::{ResourceContent, ResourceTemplate};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = InMemoryProvider::new().with_template(
//!     ResourceTemplate::new("profile", "user://profile/{id}"),
//!     |uri| Ok(vec![ResourceContent::text(uri, "Alice, admin")]),
//! );
//!
//! let host = McpHost::new(HostConfig::new("my-app"))?;
//! host.connect("users", Arc::new(provider)).await?;
//!
//! let output = host
//!     .read("user://profile/alice", &CancellationToken::new())
//!     .await?
//!     .expect("template matches");
//! assert_eq!(output.variables.get("id"), Some("alice"));
//! assert_eq!(output.content[0].text(), Some("Alice, admin"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod host;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod uri_template;

pub use genkit_mcp_protocol as protocol;

pub use config::{HostConfig, RetryConfig, TimeoutConfig};
pub use content::{Media, Part, ResourceData, detect_mime_type, translate_contents};
pub use error::{McpError, McpResult, ProviderError};
pub use host::{EnumerationReport, McpHost, ResolvedResource};
pub use provider::{InMemoryProvider, ProviderResult, ResourceProvider, SharedProvider};
pub use registry::{
    MatchResult, ProviderStatus, ProviderSummary, ResourceEntry, ResourceRegistry, match_uri,
};
pub use resource::{FetchPolicy, McpResource, ResourceAction, ResourceOutput, fetch_resource};
pub use uri_template::{TemplateVariables, UriTemplate, normalize_uri};
