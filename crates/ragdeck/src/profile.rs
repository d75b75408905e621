//! The two agent setups this crate ships with.

use ragdeck_core::{Agent, AgentBuilder};
use ragdeck_knowledge::KnowledgeBase;
use ragdeck_model::Generator;

use crate::tools::{
    AnalystRecommendationsTool, HistoricalPricesTool, StockFundamentalsTool,
    StockPriceTool, StockSummaryTool, WebSearchTool, YahooFinanceClient,
};

/// Default model of the finance profile.
pub const DEFAULT_FINANCE_MODEL: &str = "gemini-1.5-pro";
/// Default model of the rag profile.
pub const DEFAULT_RAG_MODEL: &str = "llama3.2:latest";
/// Default number of passages one knowledge search returns.
pub const DEFAULT_TOP_K: usize = 5;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Settings of the finance profile.
#[derive(Clone, Debug)]
pub struct FinanceConfig {
    /// Gemini API key, required.
    pub api_key: Option<String>,
    /// Chat model name.
    pub model: String,
    /// Overrides the OpenAI-compatible Gemini endpoint.
    pub base_url: Option<String>,
    /// Overrides the DuckDuckGo endpoint.
    pub search_base_url: Option<String>,
    /// Overrides the Yahoo Finance endpoint.
    pub market_base_url: Option<String>,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_FINANCE_MODEL.to_owned(),
            base_url: None,
            search_base_url: None,
            market_base_url: None,
        }
    }
}

/// Settings of the rag profile.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Chat model name.
    pub model: String,
    /// Overrides the OpenAI-compatible chat endpoint, which defaults to
    /// `/v1` of the Ollama host.
    pub base_url: Option<String>,
    /// Ollama host serving the embedding model (and, by default, the chat
    /// model).
    pub ollama_host: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Sources to ingest at startup.
    pub sources: Vec<String>,
    /// Passages returned by one knowledge search.
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_RAG_MODEL.to_owned(),
            base_url: None,
            ollama_host: ragdeck_ollama::DEFAULT_HOST.to_owned(),
            embedding_model: ragdeck_ollama::DEFAULT_EMBEDDING_MODEL.to_owned(),
            sources: vec![],
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// A profile to bootstrap.
#[derive(Clone, Debug)]
pub enum Profile {
    /// Market analysis with web search and market data tools.
    Finance(FinanceConfig),
    /// Question answering over a knowledge base.
    Rag(RagConfig),
}

impl Profile {
    /// Returns the name of the chat provider.
    pub fn provider(&self) -> &'static str {
        match self {
            Profile::Finance(_) => "Gemini",
            Profile::Rag(_) => "Ollama",
        }
    }
}

/// Builds the finance agent around `generator`.
pub fn finance_agent<G: Generator + 'static>(
    generator: G,
    config: &FinanceConfig,
) -> Agent {
    let web_search = match &config.search_base_url {
        Some(base_url) => WebSearchTool::with_base_url(base_url),
        None => WebSearchTool::new(),
    };
    let market = match &config.market_base_url {
        Some(base_url) => YahooFinanceClient::with_base_url(base_url),
        None => YahooFinanceClient::new(),
    };

    AgentBuilder::with_generator(generator)
        .name("Gemini Finance Agent")
        .instructions([
            "Always use tables to display financial/numerical data. \
             For text data, use bullet points and short paragraphs.",
        ])
        .markdown(true)
        .show_tool_calls(true)
        .with_tool(web_search)
        .with_tool(StockPriceTool::new(market.clone()))
        .with_tool(StockSummaryTool::new(market.clone()))
        .with_tool(HistoricalPricesTool::new(market.clone()))
        .with_tool(AnalystRecommendationsTool::new(market.clone()))
        .with_tool(StockFundamentalsTool::new(market))
        .build()
}

/// Creates the knowledge base of the rag profile.
pub fn rag_knowledge<E: ragdeck_model::Embedder + 'static>(
    embedder: E,
) -> KnowledgeBase {
    KnowledgeBase::builder(embedder)
        .name("Source Knowledge")
        .description("Documents added to this session by URL or path.")
        .build()
}

/// Builds the rag agent around `generator`, searching `knowledge`.
pub fn rag_agent<G: Generator + 'static>(
    generator: G,
    knowledge: KnowledgeBase,
    top_k: usize,
) -> Agent {
    AgentBuilder::with_generator(generator)
        .name("Knowledge Agent")
        .instructions([
            "Search the knowledge base for relevant information and base \
             your answers on it.",
            "Be clear, and generate well-structured answers.",
            "Use clear headings, bullet points, or numbered lists where \
             appropriate.",
        ])
        .knowledge(knowledge)
        .search_knowledge(true)
        .knowledge_top_k(top_k)
        .markdown(true)
        .build()
}
