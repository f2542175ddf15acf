//! `search` tool: web search through the DuckDuckGo instant answer API.

use async_trait::async_trait;

use super::Tool;

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";

/// Maximum number of results returned to the model.
const MAX_RESULTS: usize = 5;

/// A search result entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct SearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(DUCKDUCKGO_URL)
    }

    /// Point the tool at a different DuckDuckGo-compatible endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        let data: serde_json::Value = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_results(&data, MAX_RESULTS))
    }
}

/// Extract the abstract and related topics from an instant answer payload.
fn parse_results(data: &serde_json::Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data.get("AbstractText").and_then(|t| t.as_str()) {
        if !abstract_text.is_empty() {
            results.push(SearchResult {
                title: data
                    .get("Heading")
                    .and_then(|h| h.as_str())
                    .unwrap_or("Resultado")
                    .to_string(),
                url: data
                    .get("AbstractURL")
                    .and_then(|u| u.as_str())
                    .unwrap_or_default()
                    .to_string(),
                snippet: abstract_text.to_string(),
            });
        }
    }

    // Topic groups nest their entries under `Topics`.
    let topics = data
        .get("RelatedTopics")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .flat_map(|topic| match topic.get("Topics").and_then(|t| t.as_array()) {
            Some(nested) => nested.iter().collect::<Vec<_>>(),
            None => vec![topic],
        });

    for topic in topics {
        if results.len() >= max_results {
            break;
        }
        if let Some(text) = topic.get("Text").and_then(|t| t.as_str()) {
            results.push(SearchResult {
                title: text.chars().take(80).collect(),
                url: topic
                    .get("FirstURL")
                    .and_then(|u| u.as_str())
                    .unwrap_or_default()
                    .to_string(),
                snippet: text.to_string(),
            });
        }
    }

    results
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("Sin resultados para: \"{query}\"");
    }

    results
        .iter()
        .map(|r| format!("[snippet: {}, title: {}, link: {}]", r.snippet, r.title, r.url))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Busca informacion actualizada en internet, utilizando DuckDuckGo. \
         Util para noticias, verificar hechos y datos actuales. Entrega los resultados en texto plano."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Consulta de búsqueda"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<String> {
        let query: String = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_control())
            .collect();

        if query.trim().is_empty() {
            return Ok("Error al buscar: la consulta está vacía".to_string());
        }

        tracing::info!(query = %query, "Running web search");

        Ok(match self.search(&query).await {
            Ok(results) => format_results(&query, &results),
            Err(e) => {
                tracing::warn!(error = %e, "Web search failed");
                format!("Error al buscar: {e}")
            }
        })
    }
}
