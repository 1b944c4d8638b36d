//! Translation of MCP resource contents into Genkit content parts

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use genkit_mcp_protocol::ResourceContent;

use crate::error::ProviderError;
use crate::uri_template::normalize_uri;

const JSON_MIME_TYPE: &str = "application/json";
const DEFAULT_BINARY_MIME_TYPE: &str = "application/octet-stream";

/// A content part as consumed by the Genkit generation pipeline.
///
/// Serializes to Genkit's part shape: `{"text": ..}`, `{"data": ..}` or
/// `{"media": {"url": .., "contentType": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Text(String),
    /// JSON payload passed through as raw text
    Data(String),
    Media(Media),
}

/// Binary content carried as a base64 data URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub url: String,
    pub content_type: String,
}

impl Media {
    pub fn from_bytes(bytes: &[u8], content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        Self {
            url: format!("data:{};base64,{}", content_type, STANDARD.encode(bytes)),
            content_type,
        }
    }

    /// Base64 payload of the data URL
    pub fn base64(&self) -> &str {
        self.url
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .unwrap_or("")
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.base64())
    }
}

impl Part {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&str> {
        match self {
            Self::Data(json) => Some(json),
            _ => None,
        }
    }

    pub fn media(&self) -> Option<&Media> {
        match self {
            Self::Media(media) => Some(media),
            _ => None,
        }
    }
}

/// Resource content after wire decoding: the blob is raw bytes, not base64
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    Text {
        text: String,
        mime_type: Option<String>,
    },
    Blob {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
}

impl TryFrom<ResourceContent> for ResourceData {
    type Error = ProviderError;

    fn try_from(content: ResourceContent) -> Result<Self, Self::Error> {
        match content {
            ResourceContent::Text(text) => Ok(Self::Text {
                text: text.text,
                mime_type: text.mime_type,
            }),
            ResourceContent::Blob(blob) => {
                let data = STANDARD.decode(blob.blob.trim()).map_err(|e| {
                    ProviderError::invalid_content(format!(
                        "blob for '{}' is not valid base64: {}",
                        blob.uri, e
                    ))
                })?;
                Ok(Self::Blob {
                    data,
                    mime_type: blob.mime_type,
                })
            }
        }
    }
}

impl ResourceData {
    /// Convert to a part; empty text and empty blobs produce no part.
    ///
    /// `fallback_mime_type` is used for blobs the provider did not type.
    pub fn into_part(self, uri: &str, fallback_mime_type: Option<&str>) -> Option<Part> {
        match self {
            Self::Text { text, .. } if text.is_empty() => None,
            Self::Text { text, mime_type } => {
                if mime_type.as_deref().is_some_and(is_json_mime_type) {
                    Some(Part::Data(text))
                } else {
                    Some(Part::Text(text))
                }
            }
            Self::Blob { data, .. } if data.is_empty() => None,
            Self::Blob { data, mime_type } => {
                let content_type = mime_type
                    .or_else(|| fallback_mime_type.map(str::to_string))
                    .or_else(|| detect_mime_type(uri).map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_BINARY_MIME_TYPE.to_string());
                Some(Part::Media(Media::from_bytes(&data, content_type)))
            }
        }
    }
}

/// Translate a `resources/read` payload into parts, in order
pub fn translate_contents(
    uri: &str,
    contents: Vec<ResourceContent>,
    fallback_mime_type: Option<&str>,
) -> Result<Vec<Part>, ProviderError> {
    let mut parts = Vec::with_capacity(contents.len());
    for content in contents {
        let data = ResourceData::try_from(content)?;
        if let Some(part) = data.into_part(uri, fallback_mime_type) {
            parts.push(part);
        }
    }
    Ok(parts)
}

/// `application/json`, ignoring case and parameters such as `charset`
fn is_json_mime_type(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(JSON_MIME_TYPE))
}

/// Detect MIME type from the file extension of the URI's last segment
pub fn detect_mime_type(uri: &str) -> Option<&'static str> {
    let path = normalize_uri(uri);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last_segment.rsplit_once('.')?;

    match ext.to_ascii_lowercase().as_str() {
        "json" => Some("application/json"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" => Some("text/html"),
        "xml" => Some("application/xml"),
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genkit_mcp_protocol::resources::{BlobResourceContents, TextResourceContents};

    fn blob_without_mime(uri: &str, blob: &str) -> ResourceContent {
        ResourceContent::Blob(BlobResourceContents {
            uri: uri.to_string(),
            mime_type: None,
            meta: None,
            blob: blob.to_string(),
        })
    }

    #[test]
    fn test_json_text_becomes_data_part() {
        let parts = translate_contents(
            "db://users/1",
            vec![ResourceContent::json("db://users/1", r#"{"id":1}"#)],
            None,
        )
        .unwrap();
        assert_eq!(parts, vec![Part::Data(r#"{"id":1}"#.to_string())]);
    }

    #[test]
    fn test_json_mime_with_parameters() {
        let content = ResourceContent::Text(TextResourceContents {
            uri: "x://a".to_string(),
            mime_type: Some("Application/JSON; charset=utf-8".to_string()),
            meta: None,
            text: "[]".to_string(),
        });
        let parts = translate_contents("x://a", vec![content], None).unwrap();
        assert_eq!(parts[0].data(), Some("[]"));
    }

    #[test]
    fn test_plain_and_untyped_text() {
        let parts = translate_contents(
            "file://a.txt",
            vec![
                ResourceContent::text("file://a.txt", "hello"),
                ResourceContent::untyped_text("file://a.txt", "world"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(parts[0].text(), Some("hello"));
        assert_eq!(parts[1].text(), Some("world"));
    }

    #[test]
    fn test_blob_becomes_media_part() {
        let payload = STANDARD.encode(b"\x89PNG");
        let parts = translate_contents(
            "file://img/logo.png",
            vec![ResourceContent::blob("file://img/logo.png", &payload, "image/png")],
            None,
        )
        .unwrap();

        let media = parts[0].media().unwrap();
        assert_eq!(media.content_type, "image/png");
        assert_eq!(media.url, format!("data:image/png;base64,{}", payload));
        assert_eq!(media.decode().unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let parts = translate_contents(
            "file://x",
            vec![
                ResourceContent::text("file://x", ""),
                ResourceContent::blob("file://x", "", "image/png"),
                ResourceContent::text("file://x", "kept"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(parts, vec![Part::Text("kept".to_string())]);
    }

    #[test]
    fn test_blob_mime_fallbacks() {
        let payload = STANDARD.encode(b"abc");

        let parts = translate_contents(
            "file://a/report",
            vec![blob_without_mime("file://a/report", &payload)],
            Some("application/pdf"),
        )
        .unwrap();
        assert_eq!(parts[0].media().unwrap().content_type, "application/pdf");

        let parts = translate_contents(
            "file://a/photo.JPG?size=large",
            vec![blob_without_mime("file://a/photo.JPG", &payload)],
            None,
        )
        .unwrap();
        assert_eq!(parts[0].media().unwrap().content_type, "image/jpeg");

        let parts = translate_contents(
            "file://a/unknown",
            vec![blob_without_mime("file://a/unknown", &payload)],
            None,
        )
        .unwrap();
        assert_eq!(
            parts[0].media().unwrap().content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let err = translate_contents(
            "file://x.png",
            vec![ResourceContent::blob("file://x.png", "not base64!!", "image/png")],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidContent(_)));
    }

    #[test]
    fn test_part_serializes_like_genkit() {
        let json = serde_json::to_value(Part::Text("hi".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));

        let media = Part::Media(Media::from_bytes(b"a", "text/plain"));
        let json = serde_json::to_value(media).unwrap();
        assert_eq!(json["media"]["contentType"], "text/plain");
    }

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(detect_mime_type("file://x/file.json"), Some("application/json"));
        assert_eq!(detect_mime_type("file://x/file.pdf#p2"), Some("application/pdf"));
        assert_eq!(detect_mime_type("file://x.dir/file"), None);
        assert_eq!(detect_mime_type("file://x/file.unknown"), None);
    }
}
