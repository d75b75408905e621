use ragdeck_core::tool::{Error as ToolError, Tool, ToolResult};
use reqwest::{Client, Url};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The text to search for.")]
    query: String,
    #[schemars(description = "Maximum number of results, default to 5.")]
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    abstract_source: String,
    // Usually a string, but calculators and conversions return objects.
    #[serde(default)]
    answer: Value,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
    #[serde(default)]
    results: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

#[derive(Debug, PartialEq, Serialize)]
struct SearchHit {
    text: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    query: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    heading: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    r#abstract: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    abstract_source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    abstract_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    answer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    definition: String,
    results: Vec<SearchHit>,
}

impl SearchOutput {
    fn new(query: String, answer: InstantAnswer, max_results: usize) -> Self {
        let mut results = vec![];
        let topics = answer.results.into_iter().chain(answer.related_topics);
        flatten_topics(topics, &mut results, max_results);
        let answer_text = match answer.answer {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            query,
            heading: answer.heading,
            r#abstract: answer.abstract_text,
            abstract_source: answer.abstract_source,
            abstract_url: answer.abstract_url,
            answer: answer_text,
            definition: answer.definition,
            results,
        }
    }
}

fn flatten_topics(
    topics: impl IntoIterator<Item = RelatedTopic>,
    out: &mut Vec<SearchHit>,
    max_results: usize,
) {
    for topic in topics {
        if out.len() >= max_results {
            return;
        }
        match topic {
            RelatedTopic::Topic { text, url } => {
                out.push(SearchHit { text, url });
            }
            RelatedTopic::Group { topics } => {
                flatten_topics(topics, out, max_results)
            }
        }
    }
}

/// A tool for searching the web with DuckDuckGo's Instant Answer API.
pub struct WebSearchTool {
    client: Client,
    base_url: String,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a new web search tool.
    #[inline]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a web search tool that talks to `base_url` instead of
    /// DuckDuckGo.
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Default for WebSearchTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Searches the web with DuckDuckGo and returns a JSON summary with \
         the instant answer, abstract and related results."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WebSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let base_url = format!("{}/", self.base_url);
        async move {
            let query = input.query.trim().to_owned();
            if query.is_empty() {
                return Err(ToolError::invalid_input()
                    .with_reason("`query` must not be empty"));
            }
            let max_results = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

            let mut url = Url::parse(&base_url).map_err(execution_error)?;
            url.query_pairs_mut()
                .append_pair("q", &query)
                .append_pair("format", "json")
                .append_pair("no_html", "1")
                .append_pair("skip_disambig", "1");

            debug!("searching the web for {query:?}");
            let resp = client
                .get(url)
                .send()
                .await
                .map_err(execution_error)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ToolError::execution_error().with_reason(format!(
                    "search failed with status {status}"
                )));
            }
            // The API answers with a javascript content type, so the body
            // is decoded by hand.
            let body = resp.bytes().await.map_err(execution_error)?;
            let answer: InstantAnswer =
                serde_json::from_slice(&body).map_err(execution_error)?;

            let output = SearchOutput::new(query, answer, max_results);
            serde_json::to_string(&output).map_err(execution_error)
        }
    }
}

fn execution_error<E: std::fmt::Display>(err: E) -> ToolError {
    ToolError::execution_error().with_reason(err.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn parameters(
        query: &str,
        max_results: Option<usize>,
    ) -> WebSearchParameters {
        WebSearchParameters {
            query: query.to_owned(),
            max_results,
        }
    }

    #[tokio::test]
    async fn test_search() {
        let server = MockServer::start().await;
        let body = json!({
            "Heading": "NVIDIA",
            "AbstractText": "Nvidia Corporation is an American technology company.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Nvidia",
            "AbstractSource": "Wikipedia",
            "Answer": "",
            "Definition": "",
            "RelatedTopics": [
                { "Text": "GeForce", "FirstURL": "https://duckduckgo.com/GeForce" },
                {
                    "Name": "Products",
                    "Topics": [
                        { "Text": "CUDA", "FirstURL": "https://duckduckgo.com/CUDA" },
                        { "Text": "Tegra", "FirstURL": "https://duckduckgo.com/Tegra" }
                    ]
                }
            ],
            "Results": []
        });
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("q", "nvidia"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                body.to_string(),
                "application/x-javascript",
            ))
            .mount(&server)
            .await;

        let tool = WebSearchTool::with_base_url(server.uri());
        let output = tool.execute(parameters("nvidia", Some(2))).await.unwrap();
        let output: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(output["heading"], "NVIDIA");
        assert_eq!(output["abstract_source"], "Wikipedia");
        assert!(output.get("answer").is_none());
        assert_eq!(
            output["results"],
            json!([
                { "text": "GeForce", "url": "https://duckduckgo.com/GeForce" },
                { "text": "CUDA", "url": "https://duckduckgo.com/CUDA" },
            ])
        );
    }

    #[tokio::test]
    async fn test_search_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = WebSearchTool::with_base_url(server.uri());
        let err = tool.execute(parameters("nvidia", None)).await.unwrap_err();
        assert!(err.reason().contains("503"));
    }

    #[tokio::test]
    async fn test_empty_query() {
        let tool = WebSearchTool::with_base_url("http://127.0.0.1:9");
        let err = tool.execute(parameters("  ", None)).await.unwrap_err();
        assert_eq!(err.kind(), ragdeck_core::tool::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_schema() {
        let tool = WebSearchTool::new();
        let schema = tool.parameter_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert!(schema["properties"]["max_results"].is_object());
    }
}
