use std::future::ready;

use ragdeck_model::{ToolCallRequest, ToolSpec};

use crate::tool::{BoxedToolFuture, Error, ToolObject, ToolResult};

/// An executor that handles tool call requests from the model.
pub struct Executor {
    tools: Vec<Box<dyn ToolObject>>,
}

impl Executor {
    /// Registered tools keep their order. A later tool with the same name
    /// replaces the earlier one.
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut deduped: Vec<Box<dyn ToolObject>> =
            Vec::with_capacity(tools.len());
        for tool in tools {
            match deduped.iter_mut().find(|t| t.name() == tool.name()) {
                Some(existing) => {
                    warn!("tool `{}` registered twice", tool.name());
                    *existing = tool;
                }
                None => deduped.push(tool),
            }
        }
        Self { tools: deduped }
    }

    #[inline]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    /// Returns a future resolving to the tool's result. Unknown tools
    /// resolve to an error immediately.
    pub fn execute(&self, req: ToolCallRequest) -> BoxedToolFuture {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == req.name)
        else {
            warn!("tool not found: {}", req.name);
            return Box::pin(ready(Err(Error::unknown_tool(&req.name))));
        };
        trace!("running a tool ({}) with args: {:?}", req.id, req.arguments);
        tool.execute(req.arguments)
    }
}

/// Renders a tool result as the content of a tool message.
pub(crate) fn render_result(result: &ToolResult) -> String {
    match result {
        Ok(output) => output.clone(),
        Err(err) => format!("Error: {}", err.reason()),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{AnyTool, ErrorKind, Tool};

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool {
        schema: Value,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                schema: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"],
                }),
            }
        }
    }

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the text back"
        }

        fn parameter_schema(&self) -> &Value {
            &self.schema
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(input.text))
        }
    }

    fn request(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "call:1".to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    fn executor() -> Executor {
        Executor::with_tools(vec![Box::new(AnyTool(EchoTool::new()))])
    }

    #[test]
    fn test_specs() {
        let specs = executor().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[0].parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_execute() {
        let executor = executor();

        let result = executor
            .execute(request("echo", json!({ "text": "hello" })))
            .await;
        assert_eq!(result.unwrap(), "hello");

        // Arguments encoded as a string are accepted as well.
        let result = executor
            .execute(request("echo", json!("{\"text\":\"again\"}")))
            .await;
        assert_eq!(result.unwrap(), "again");
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let result = executor()
            .execute(request("echo", json!({ "txt": "hello" })))
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = executor().execute(request("read_file", json!({}))).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTool);
        assert_eq!(
            render_result(&Err(err)),
            "Error: tool `read_file` is not available"
        );
    }
}
