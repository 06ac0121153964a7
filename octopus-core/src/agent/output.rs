//! Streaming parser for the `claude` CLI `stream-json` output

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{Error, Result};

/// A message from the stream-json output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// System message at the start
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Assistant output
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },

    /// Tool usage by the assistant
    ToolUse {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// Result from tool execution
    ToolResult {
        #[serde(default)]
        output: String,
        #[serde(default)]
        is_error: bool,
    },

    /// Final result with the answer and token counts
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, alias = "usage")]
        cost: Option<CostInfo>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },

    /// Any message type not handled above (e.g. echoed user turns)
    #[serde(other)]
    Other,
}

/// Assistant message content, either plain text or content blocks
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// One block of an assistant message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Concatenated text of the message
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Token counts reported at the end of a run
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CostInfo {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, alias = "cache_read_input_tokens")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_write_tokens: Option<u64>,
}

/// Handler for processing stream messages
pub trait StreamHandler: Send {
    fn on_system(&mut self, _subtype: Option<&str>, _session_id: Option<&str>) {}

    fn on_assistant_text(&mut self, text: &str);

    fn on_tool_use(&mut self, _tool: &str, _input: &serde_json::Value) {}

    fn on_tool_result(&mut self, _output: &str, _is_error: bool) {}

    fn on_complete(
        &mut self,
        _result: Option<&str>,
        _cost: Option<&CostInfo>,
        _duration_ms: Option<u64>,
    ) {
    }

    /// Called when a line is not valid stream JSON
    fn on_parse_error(&mut self, _line: &str, _error: &serde_json::Error) {}
}

/// Handler that accumulates the run's answer and token counts
#[derive(Debug, Default)]
pub struct CollectHandler {
    text: String,
    result: Option<String>,
    pub cost: Option<CostInfo>,
    pub tool_calls: usize,
    pub duration_ms: Option<u64>,
    /// Echo assistant text and tool calls to the log
    verbose: bool,
}

impl CollectHandler {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// The final answer: the result message if one arrived, else all assistant text
    pub fn answer(&self) -> &str {
        match self.result {
            Some(ref result) if !result.trim().is_empty() => result,
            _ => &self.text,
        }
    }
}

impl StreamHandler for CollectHandler {
    fn on_system(&mut self, subtype: Option<&str>, session_id: Option<&str>) {
        tracing::debug!(?subtype, ?session_id, "claude session started");
    }

    fn on_assistant_text(&mut self, text: &str) {
        if self.verbose && !text.is_empty() {
            tracing::debug!(text, "assistant");
        }
        self.text.push_str(text);
    }

    fn on_tool_use(&mut self, tool: &str, input: &serde_json::Value) {
        self.tool_calls += 1;
        if self.verbose {
            tracing::debug!(tool, %input, "tool use");
        }
    }

    fn on_tool_result(&mut self, output: &str, is_error: bool) {
        if is_error {
            let snippet: String = output.chars().take(200).collect();
            tracing::debug!(output = %snippet, "tool error");
        }
    }

    fn on_complete(&mut self, result: Option<&str>, cost: Option<&CostInfo>, duration_ms: Option<u64>) {
        self.result = result.map(str::to_string);
        self.cost = cost.cloned();
        self.duration_ms = duration_ms;
    }

    fn on_parse_error(&mut self, line: &str, error: &serde_json::Error) {
        tracing::debug!(line, %error, "Skipping unparseable stream line");
    }
}

/// Stream output from an agent process
pub struct OutputStreamer<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> OutputStreamer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Stream output, calling the handler for each message
    ///
    /// Returns when the stream ends (process closes stdout)
    pub async fn stream<H: StreamHandler>(&mut self, handler: &mut H) -> Result<()> {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await.map_err(Error::Io)?;

            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamMessage>(trimmed) {
                Ok(msg) => Self::dispatch_message(handler, msg),
                Err(e) => handler.on_parse_error(trimmed, &e),
            }
        }

        Ok(())
    }

    fn dispatch_message<H: StreamHandler>(handler: &mut H, msg: StreamMessage) {
        match msg {
            StreamMessage::System {
                subtype,
                session_id,
            } => {
                handler.on_system(subtype.as_deref(), session_id.as_deref());
            }
            StreamMessage::Assistant { message } => {
                handler.on_assistant_text(&message.content.text());
            }
            StreamMessage::ToolUse { tool, input } => {
                handler.on_tool_use(&tool, &input);
            }
            StreamMessage::ToolResult { output, is_error } => {
                handler.on_tool_result(&output, is_error);
            }
            StreamMessage::Result {
                result,
                cost,
                duration_ms,
                ..
            } => {
                handler.on_complete(result.as_deref(), cost.as_ref(), duration_ms);
            }
            StreamMessage::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assistant_text() {
        let json = r#"{"type":"assistant","message":{"content":"Hello world"}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Assistant { message } => {
                assert_eq!(message.content.text(), "Hello world");
            }
            _ => panic!("Expected Assistant message"),
        }
    }

    #[test]
    fn test_parse_assistant_blocks() {
        let json = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"{\"a\":"},{"type":"tool_use","id":"x"},{"type":"text","text":"1}"}]}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Assistant { message } => {
                assert_eq!(message.content.text(), "{\"a\":1}");
            }
            _ => panic!("Expected Assistant message"),
        }
    }

    #[test]
    fn test_parse_result_with_usage() {
        let json = r#"{"type":"result","subtype":"success","result":"done","usage":{"input_tokens":100,"output_tokens":50,"cache_read_input_tokens":20},"duration_ms":1234}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Result {
                result,
                cost,
                duration_ms,
                ..
            } => {
                let c = cost.unwrap();
                assert_eq!(result.as_deref(), Some("done"));
                assert_eq!(c.input_tokens, 100);
                assert_eq!(c.output_tokens, 50);
                assert_eq!(c.cache_read_tokens, Some(20));
                assert_eq!(duration_ms, Some(1234));
            }
            _ => panic!("Expected Result message"),
        }
    }

    #[test]
    fn test_unknown_type_is_other() {
        let json = r#"{"type":"user","message":{"content":"hi"}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, StreamMessage::Other));
    }

    #[tokio::test]
    async fn test_collect_handler_prefers_result() {
        let stream = concat!(
            r#"{"type":"system","subtype":"init","session_id":"abc"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"type":"assistant","message":{"content":"thinking..."}}"#,
            "\n",
            r#"{"type":"tool_use","tool":"Read","input":{"file":"app.py"}}"#,
            "\n",
            r#"{"type":"result","result":"{\"bugs_found\":false}","cost":{"input_tokens":10,"output_tokens":5}}"#,
            "\n",
        );

        let mut streamer = OutputStreamer::new(stream.as_bytes());
        let mut handler = CollectHandler::new(false);
        streamer.stream(&mut handler).await.unwrap();

        assert_eq!(handler.answer(), "{\"bugs_found\":false}");
        assert_eq!(handler.tool_calls, 1);
        assert_eq!(handler.cost.as_ref().unwrap().input_tokens, 10);
    }

    #[tokio::test]
    async fn test_collect_handler_falls_back_to_text() {
        let stream = concat!(
            r#"{"type":"assistant","message":{"content":"part one "}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":"part two"}}"#,
            "\n",
        );

        let mut streamer = OutputStreamer::new(stream.as_bytes());
        let mut handler = CollectHandler::new(true);
        streamer.stream(&mut handler).await.unwrap();

        assert_eq!(handler.answer(), "part one part two");
        assert!(handler.cost.is_none());
    }

    #[tokio::test]
    async fn test_collect_handler_tolerates_tool_errors() {
        let long_error = "x".repeat(500);
        let stream = format!(
            "{}\n{}\n",
            serde_json::json!({"type": "tool_result", "output": long_error, "is_error": true}),
            r#"{"type":"result","result":"ok"}"#,
        );

        let mut streamer = OutputStreamer::new(stream.as_bytes());
        let mut handler = CollectHandler::new(true);
        streamer.stream(&mut handler).await.unwrap();

        assert_eq!(handler.answer(), "ok");
        assert_eq!(handler.tool_calls, 0);
    }
}
