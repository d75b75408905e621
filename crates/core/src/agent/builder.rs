use std::sync::Arc;

use ragdeck_knowledge::KnowledgeBase;
use ragdeck_model::Generator;

use super::{Agent, AgentInner};
use crate::knowledge::{KnowledgeSearchTool, SEARCH_TOOL_NAME};
use crate::model_client::ModelClient;
use crate::tool::{AnyTool, Executor, Tool, ToolObject};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
const DEFAULT_KNOWLEDGE_TOP_K: usize = 5;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    name: Option<String>,
    description: Option<String>,
    instructions: Vec<String>,
    markdown: bool,
    knowledge: Option<KnowledgeBase>,
    search_knowledge: Option<bool>,
    add_references: bool,
    knowledge_top_k: usize,
    max_tool_rounds: usize,
    show_tool_calls: bool,
    tools: Vec<Box<dyn ToolObject>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified generator.
    #[inline]
    pub fn with_generator<G: Generator + 'static>(generator: G) -> Self {
        Self {
            model_client: ModelClient::new(generator),
            name: None,
            description: None,
            instructions: vec![],
            markdown: false,
            knowledge: None,
            search_knowledge: None,
            add_references: false,
            knowledge_top_k: DEFAULT_KNOWLEDGE_TOP_K,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            show_tool_calls: false,
            tools: vec![],
        }
    }

    /// Sets the agent's name, used in logs.
    #[inline]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description that opens the system prompt.
    #[inline]
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the instructions listed in the system prompt.
    #[inline]
    pub fn instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    /// Asks the model to format its answers as markdown.
    #[inline]
    pub fn markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Attaches a knowledge base.
    ///
    /// Unless disabled with [`search_knowledge`](Self::search_knowledge),
    /// the model can query it through the `search_knowledge_base` tool.
    #[inline]
    pub fn knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Whether to register the knowledge search tool.
    #[inline]
    pub fn search_knowledge(mut self, search_knowledge: bool) -> Self {
        self.search_knowledge = Some(search_knowledge);
        self
    }

    /// Whether to search the knowledge base with the user's query up front
    /// and add the results to the request as references.
    #[inline]
    pub fn add_references(mut self, add_references: bool) -> Self {
        self.add_references = add_references;
        self
    }

    /// Sets how many passages one knowledge search returns.
    #[inline]
    pub fn knowledge_top_k(mut self, top_k: usize) -> Self {
        self.knowledge_top_k = top_k;
        self
    }

    /// Sets how many rounds of tool calls one answer may take.
    #[inline]
    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Whether answers announce each tool call with an
    /// [`AnswerEvent::ToolCall`](crate::AnswerEvent::ToolCall) before it runs.
    #[inline]
    pub fn show_tool_calls(mut self, show_tool_calls: bool) -> Self {
        self.show_tool_calls = show_tool_calls;
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            name,
            description,
            instructions,
            markdown,
            knowledge,
            search_knowledge,
            add_references,
            knowledge_top_k,
            max_tool_rounds,
            show_tool_calls,
            mut tools,
        } = self;

        let search_knowledge =
            knowledge.is_some() && search_knowledge.unwrap_or(true);
        if let (true, Some(knowledge)) = (search_knowledge, &knowledge) {
            let tool =
                KnowledgeSearchTool::new(knowledge.clone(), knowledge_top_k);
            tools.push(Box::new(AnyTool(tool)));
        }

        let system_prompt = system_prompt(
            description.as_deref(),
            &instructions,
            markdown,
            search_knowledge,
        );
        let references = if add_references { knowledge } else { None };

        Agent {
            inner: Arc::new(AgentInner {
                name: name.unwrap_or_else(|| "agent".to_owned()),
                model_client,
                executor: Executor::with_tools(tools),
                system_prompt,
                references,
                knowledge_top_k,
                max_tool_rounds,
                show_tool_calls,
            }),
        }
    }
}

pub(super) fn system_prompt(
    description: Option<&str>,
    instructions: &[String],
    markdown: bool,
    search_knowledge: bool,
) -> String {
    let mut sections = vec![];
    if let Some(description) = description {
        sections.push(description.to_owned());
    }

    let mut bullets: Vec<String> = instructions.to_vec();
    if search_knowledge {
        bullets.push(format!(
            "Search your knowledge base with the `{SEARCH_TOOL_NAME}` tool \
             before answering questions it may cover."
        ));
    }
    if markdown {
        bullets.push("Use markdown to format your answers.".to_owned());
    }
    if !bullets.is_empty() {
        let mut list = "<instructions>\n".to_owned();
        for bullet in bullets {
            list.push_str("- ");
            list.push_str(&bullet);
            list.push('\n');
        }
        list.push_str("</instructions>");
        sections.push(list);
    }

    sections.join("\n\n")
}
