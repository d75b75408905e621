use ragdeck_knowledge::{KnowledgeBase, ScoredRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tool::{Error, Tool, ToolResult};

pub(crate) const SEARCH_TOOL_NAME: &str = "search_knowledge_base";
const NO_DOCUMENTS: &str = "No documents found in the knowledge base.";

/// Input of [`KnowledgeSearchTool`].
#[derive(Clone, Debug, Deserialize)]
pub struct SearchInput {
    query: String,
}

/// A passage returned to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Passage {
    pub source: String,
    pub content: String,
    pub score: f32,
}

impl From<ScoredRecord> for Passage {
    fn from(scored: ScoredRecord) -> Self {
        Self {
            source: scored.record.source,
            content: scored.record.text,
            score: scored.score,
        }
    }
}

/// Exposes [`KnowledgeBase::search`] to the model.
pub struct KnowledgeSearchTool {
    knowledge: KnowledgeBase,
    top_k: usize,
    description: String,
    schema: Value,
}

impl KnowledgeSearchTool {
    /// Creates a tool returning at most `top_k` passages per query.
    pub fn new(knowledge: KnowledgeBase, top_k: usize) -> Self {
        let mut description = format!(
            "Searches the knowledge base `{}` and returns the most relevant \
             passages as JSON.",
            knowledge.name()
        );
        if !knowledge.description().is_empty() {
            description.push(' ');
            description.push_str(knowledge.description());
        }
        Self {
            knowledge,
            top_k,
            description,
            schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The text to search for.",
                    },
                },
                "required": ["query"],
            }),
        }
    }
}

impl Tool for KnowledgeSearchTool {
    type Input = SearchInput;

    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let knowledge = self.knowledge.clone();
        let top_k = self.top_k;
        async move {
            let passages = search_passages(&knowledge, &input.query, top_k)
                .await
                .map_err(|err| {
                    Error::execution_error().with_reason(err.to_string())
                })?;
            if passages.is_empty() {
                return Ok(NO_DOCUMENTS.to_owned());
            }
            serde_json::to_string(&passages).map_err(|err| {
                Error::execution_error().with_reason(err.to_string())
            })
        }
    }
}

pub(crate) async fn search_passages(
    knowledge: &KnowledgeBase,
    query: &str,
    top_k: usize,
) -> Result<Vec<Passage>, ragdeck_knowledge::Error> {
    let results = knowledge.search(query, top_k).await?;
    debug!("{} passages for {query:?}", results.len());
    Ok(results.into_iter().map(Passage::from).collect())
}
