//! Partitioning through an Unstructured API deployment.
//!
//! Works with both the hosted service and self-hosted containers. The API
//! returns a JSON array of elements, each with `text` and `metadata`.

use std::path::Path;

use async_trait::async_trait;

use super::{Element, ElementMetadata, PartitionError, Partitioner, mime_type_of};

#[derive(Debug)]
pub struct UnstructuredPartitioner {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl UnstructuredPartitioner {
    #[must_use]
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }
}

/// Convert the API's element array, dropping elements without text.
fn parse_elements(raw: &[serde_json::Value]) -> Vec<Element> {
    raw.iter()
        .filter_map(|value| {
            let text = value.get("text").and_then(|t| t.as_str())?;
            let metadata = value.get("metadata");
            let field = |key: &str| {
                metadata
                    .and_then(|m| m.get(key))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
            };

            Some(Element::new(
                text,
                ElementMetadata {
                    page_number: metadata
                        .and_then(|m| m.get("page_number"))
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|p| u32::try_from(p).ok()),
                    filetype: field("filetype"),
                    filename: field("filename"),
                    languages: metadata
                        .and_then(|m| m.get("languages"))
                        .and_then(|l| l.as_array())
                        .map(|langs| {
                            langs
                                .iter()
                                .filter_map(|l| l.as_str().map(ToString::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                },
            ))
        })
        .collect()
}

#[async_trait]
impl Partitioner for UnstructuredPartitioner {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError> {
        let mime_type = mime_type_of(path);
        if !self.supports_mime_type(&mime_type) {
            return Err(PartitionError::UnsupportedType(mime_type));
        }

        let file_bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|e| PartitionError::Provider(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("strategy", "auto");

        let mut request = self.client.post(&self.api_url).multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.header("unstructured-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PartitionError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PartitionError::Provider(format!(
                "Unstructured API ({status}): {error_text}"
            )));
        }

        let raw: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PartitionError::Provider(e.to_string()))?;

        let elements = parse_elements(&raw);
        tracing::debug!(path = %path.display(), elements = elements.len(), "Partitioned file");
        Ok(elements)
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "application/pdf"
                | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                | "text/plain"
                | "text/markdown"
                | "text/x-markdown"
        )
    }

    fn provider_name(&self) -> &'static str {
        "unstructured"
    }
}
