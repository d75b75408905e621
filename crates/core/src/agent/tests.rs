use std::future::ready;
use std::sync::Arc;

use futures_util::StreamExt;
use ragdeck_knowledge::{
    InMemoryIndex, KnowledgeBase, VectorIndex, VectorRecord,
};
use ragdeck_model::{
    ErrorKind as ModelErrorKind, Message, ToolCallRequest, ToolOutput,
};
use ragdeck_test_model::{
    HashEmbedder, PresetEvent, PresetResponse, ScriptedGenerator,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::builder::system_prompt;
use crate::tool::{Tool, ToolResult};
use crate::{
    AgentBuilder, AgentError, AgentErrorKind, Answer, AnswerEvent,
    ToolInvocation,
};

#[derive(Deserialize)]
struct PriceInput {
    symbol: String,
}

struct PriceTool {
    schema: Value,
}

impl PriceTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": { "symbol": { "type": "string" } },
                "required": ["symbol"],
            }),
        }
    }
}

impl Tool for PriceTool {
    type Input = PriceInput;

    fn name(&self) -> &str {
        "get_current_stock_price"
    }

    fn description(&self) -> &str {
        "Gets the latest price of a stock"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(format!("{}: 123.45", input.symbol)))
    }
}

fn price_call(id: &str, name: &str) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments: json!({ "symbol": "NVDA" }),
    })
}

async fn drain(
    mut answer: Answer,
) -> Vec<Result<AnswerEvent, AgentError>> {
    let mut items = vec![];
    while let Some(item) = answer.next().await {
        items.push(item);
    }
    items
}

async fn recipes() -> KnowledgeBase {
    let embedder = HashEmbedder::default();
    let index = Arc::new(InMemoryIndex::new());
    let text = "Pad thai needs rice noodles, tamarind and peanuts.";
    index
        .insert(vec![VectorRecord {
            id: 1,
            text: text.to_owned(),
            embedding: embedder.embed_sync(text),
            source: "thai.txt".to_owned(),
        }])
        .await
        .unwrap();
    KnowledgeBase::builder(embedder)
        .name("recipes")
        .index(index)
        .build()
}

#[tokio::test]
async fn test_streamed_answer() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_text("Hi, what can I do?"));

    let agent = AgentBuilder::with_generator(generator.clone())
        .description("You are a helpful assistant.")
        .build();
    let fragments: Vec<AnswerEvent> = drain(agent.answer("Hello"))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        fragments,
        ["Hi, ", "what ", "can ", "I ", "do?"]
            .map(|text| AnswerEvent::Text(text.to_owned()))
    );

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].messages,
        [
            Message::System("You are a helpful assistant.".to_owned()),
            Message::User("Hello".to_owned()),
        ]
    );
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn test_answer_is_lazy() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_text("unused"));

    let agent = AgentBuilder::with_generator(generator.clone()).build();
    let answer = agent.answer("Hello");
    tokio::task::yield_now().await;
    assert!(generator.requests().is_empty());

    assert_eq!(answer.text().await.unwrap(), "unused");
    assert_eq!(generator.requests().len(), 1);
}

#[tokio::test]
async fn test_tool_round() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([
        PresetEvent::TextDelta("Checking. ".to_owned()),
        price_call("call:1", "get_current_stock_price"),
    ]));
    generator.add_response(PresetResponse::with_text("NVDA is at 123.45."));

    let agent = AgentBuilder::with_generator(generator.clone())
        .with_tool(PriceTool::new())
        .build();
    let text = agent.answer("Price of NVDA?").text().await.unwrap();
    assert_eq!(text, "Checking. NVDA is at 123.45.");

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0].name, "get_current_stock_price");
    let messages = &requests[1].messages;
    assert_eq!(messages.len(), 4);
    assert!(matches!(
        &messages[2],
        Message::Assistant { content, tool_calls }
            if content == "Checking. " && tool_calls.len() == 1
    ));
    assert_eq!(
        messages[3],
        Message::Tool(ToolOutput {
            call_id: "call:1".to_owned(),
            content: "NVDA: 123.45".to_owned(),
        })
    );
}

#[tokio::test]
async fn test_show_tool_calls() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([
        PresetEvent::TextDelta("Checking.".to_owned()),
        price_call("call:1", "get_current_stock_price"),
    ]));
    generator.add_response(PresetResponse::with_text("Done."));

    let agent = AgentBuilder::with_generator(generator)
        .with_tool(PriceTool::new())
        .show_tool_calls(true)
        .build();
    let items: Vec<AnswerEvent> = drain(agent.answer("Price of NVDA?"))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let call = ToolInvocation {
        name: "get_current_stock_price".to_owned(),
        arguments: json!({ "symbol": "NVDA" }),
    };
    assert_eq!(
        items,
        [
            AnswerEvent::Text("Checking.".to_owned()),
            AnswerEvent::ToolCall(call.clone()),
            AnswerEvent::Text("Done.".to_owned()),
        ]
    );
    assert_eq!(call.to_string(), "get_current_stock_price(NVDA)");
}

#[tokio::test]
async fn test_tool_calls_hidden_by_default() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([price_call(
        "call:1",
        "get_current_stock_price",
    )]));
    generator.add_response(PresetResponse::with_text("Done."));

    let agent = AgentBuilder::with_generator(generator)
        .with_tool(PriceTool::new())
        .build();
    let items = drain(agent.answer("Price of NVDA?")).await;
    assert_eq!(items, [Ok(AnswerEvent::Text("Done.".to_owned()))]);
}

#[test]
fn test_tool_invocation_display() {
    let call = |arguments| ToolInvocation {
        name: "get_historical_stock_prices".to_owned(),
        arguments,
    };
    assert_eq!(
        call(json!({ "interval": "1d", "symbol": "NVDA" })).to_string(),
        "get_historical_stock_prices(1d, NVDA)"
    );
    assert_eq!(
        call(json!(r#"{"symbol":"AAPL"}"#)).to_string(),
        "get_historical_stock_prices(AAPL)"
    );
    assert_eq!(
        call(Value::Null).to_string(),
        "get_historical_stock_prices()"
    );
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([price_call(
        "call:1",
        "read_file",
    )]));
    generator.add_response(PresetResponse::with_text("Sorry."));

    let agent = AgentBuilder::with_generator(generator.clone()).build();
    assert_eq!(agent.answer("Hi").text().await.unwrap(), "Sorry.");

    let requests = generator.requests();
    assert_eq!(
        requests[1].messages[3],
        Message::Tool(ToolOutput {
            call_id: "call:1".to_owned(),
            content: "Error: tool `read_file` is not available".to_owned(),
        })
    );
}

#[tokio::test]
async fn test_tool_rounds_exceeded() {
    let mut generator = ScriptedGenerator::default();
    for i in 0..3 {
        generator.add_response(PresetResponse::with_events([price_call(
            &format!("call:{i}"),
            "get_current_stock_price",
        )]));
    }

    let agent = AgentBuilder::with_generator(generator.clone())
        .with_tool(PriceTool::new())
        .max_tool_rounds(2)
        .build();
    let err = agent.answer("Loop forever").text().await.unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::ToolRoundsExceeded);
    assert_eq!(generator.requests().len(), 3);
}

#[tokio::test]
async fn test_generator_error() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_text("never").with_failures(0));

    let agent = AgentBuilder::with_generator(generator).build();
    let mut answer = agent.answer("Hi");
    let err = answer.next().await.unwrap().unwrap_err();
    assert_eq!(
        err.kind(),
        AgentErrorKind::Model(ModelErrorKind::RateLimitExceeded)
    );
    assert!(answer.next().await.is_none());
}

#[tokio::test]
async fn test_error_keeps_partial_output() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([
        PresetEvent::TextDelta("The answer is".to_owned()),
        PresetEvent::Fail("connection reset".to_owned()),
    ]));

    let agent = AgentBuilder::with_generator(generator).build();
    let items = drain(agent.answer("Hi")).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(AnswerEvent::Text("The answer is".to_owned())));
    assert_eq!(items[1].as_ref().unwrap_err().to_string(), "connection reset");
}

#[tokio::test]
async fn test_no_history_between_answers() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_text("One."));
    generator.add_response(PresetResponse::with_text("Two."));

    let agent = AgentBuilder::with_generator(generator.clone()).build();
    agent.answer("First").text().await.unwrap();
    agent.answer("Second").text().await.unwrap();

    let requests = generator.requests();
    assert_eq!(requests[1].messages.len(), 2);
    assert_eq!(requests[1].messages[1], Message::User("Second".to_owned()));
}

#[test]
fn test_system_prompt() {
    let prompt = system_prompt(
        Some("You are an investment analyst."),
        &["Use tables to display data".to_owned()],
        true,
        false,
    );
    assert_eq!(
        prompt,
        "You are an investment analyst.\n\n\
         <instructions>\n\
         - Use tables to display data\n\
         - Use markdown to format your answers.\n\
         </instructions>"
    );
    assert_eq!(system_prompt(None, &[], false, false), "");
}

#[tokio::test]
async fn test_knowledge_search_tool() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_events([
        PresetEvent::ToolCall(ToolCallRequest {
            id: "call:1".to_owned(),
            name: "search_knowledge_base".to_owned(),
            arguments: json!({ "query": "pad thai" }),
        }),
    ]));
    generator.add_response(PresetResponse::with_text("Use tamarind."));

    let agent = AgentBuilder::with_generator(generator.clone())
        .knowledge(recipes().await)
        .build();
    assert!(agent.system_prompt().contains("search_knowledge_base"));
    agent.answer("How to make pad thai?").text().await.unwrap();

    let requests = generator.requests();
    assert_eq!(requests[0].tools[0].name, "search_knowledge_base");
    let Message::Tool(output) = &requests[1].messages[3] else {
        panic!("expected a tool output");
    };
    let passages: Value = serde_json::from_str(&output.content).unwrap();
    assert_eq!(passages[0]["source"], "thai.txt");
}

#[tokio::test]
async fn test_knowledge_references() {
    let mut generator = ScriptedGenerator::default();
    generator.add_response(PresetResponse::with_text("Use tamarind."));

    let agent = AgentBuilder::with_generator(generator.clone())
        .knowledge(recipes().await)
        .search_knowledge(false)
        .add_references(true)
        .build();
    agent.answer("pad thai sauce?").text().await.unwrap();

    let requests = generator.requests();
    assert!(requests[0].tools.is_empty());
    let Message::User(user) = &requests[0].messages[1] else {
        panic!("expected a user message");
    };
    assert!(user.starts_with("pad thai sauce?\n\n"));
    assert!(user.contains("<references>"));
    assert!(user.contains("rice noodles, tamarind"));
}
