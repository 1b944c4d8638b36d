//! # MCP Resource Protocol Types
//!
//! Wire-level types for the Model Context Protocol resource methods
//! (`resources/list`, `resources/templates/list`, `resources/read`).
//!
//! These types only describe what travels over JSON-RPC. Matching, template
//! compilation and content translation live in the `genkit-mcp` crate.
//!
//! ```rust
//! use genkit_mcp_protocol::resources::{ResourceContent, ReadResourceResult};
//!
//! let result = ReadResourceResult::single(ResourceContent::text(
//!     "file://data/readme.txt",
//!     "hello",
//! ));
//! let json = serde_json::to_value(&result).unwrap();
//! assert_eq!(json["contents"][0]["text"], "hello");
//! ```

pub mod meta;
pub mod methods;
pub mod resources;

pub use meta::Cursor;
pub use resources::{
    BlobResourceContents, ListResourceTemplatesResult, ListResourcesResult, ReadResourceResult,
    Resource, ResourceContent, ResourceTemplate, TextResourceContents,
};
