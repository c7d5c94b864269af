use std::io::{self, BufRead, Write};

use serde_json::{json, Value};
use tracing::{debug, error};

use crate::protocol::{JsonRpcMessage, JsonRpcResponse, INVALID_PARAMS, PARSE_ERROR};
use crate::tools::{self, ToolContext};

const SERVER_NAME: &str = "mastery";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

const INSTRUCTIONS: &str = "\
Mastery tracks quiz results per student and topic and picks the next quiz difficulty.\n\
\n\
Before generating a quiz, call mastery_next_level to get the difficulty (Beginner, \
Intermediate or Advanced). Generate questions at that level yourself.\n\
\n\
After the student answers every question, call mastery_record_attempt with one outcome \
per question in answer order. The returned level is what the next quiz on that topic \
will use.\n\
\n\
Levels: below 60% accuracy is Beginner, 60% up to 85% is Intermediate, 85% and above is Advanced.";

/// Run the MCP server on stdio. Blocks until stdin is closed.
pub fn run_server(ctx: &ToolContext) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), ctx)
}

/// Line-delimited JSON-RPC loop over any reader/writer pair.
pub fn serve<R: BufRead, W: Write>(reader: R, mut writer: W, ctx: &ToolContext) -> anyhow::Result<()> {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(response) = handle_line(line, ctx) {
            write_response(&mut writer, &response)?;
        }
    }

    Ok(())
}

fn write_response<W: Write>(writer: &mut W, resp: &JsonRpcResponse) -> anyhow::Result<()> {
    let json = serde_json::to_string(resp)?;
    writeln!(writer, "{json}")?;
    writer.flush()?;
    Ok(())
}

/// `None` for notifications, which get no reply.
fn handle_line(line: &str, ctx: &ToolContext) -> Option<JsonRpcResponse> {
    let msg: JsonRpcMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            error!("invalid JSON-RPC: {e}");
            return Some(JsonRpcResponse::err(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {e}"),
            ));
        }
    };

    let method = msg.method.as_deref().unwrap_or("");
    debug!("MCP request: {method}");

    let id = msg.id?;

    Some(match method {
        "initialize" => handle_initialize(id),
        "ping" => JsonRpcResponse::ok(id, json!({})),
        "tools/list" => JsonRpcResponse::ok(id, tools::tool_definitions()),
        "tools/call" => handle_tools_call(id, &msg.params, ctx),
        other => JsonRpcResponse::method_not_found(id, other),
    })
}

fn handle_initialize(id: Value) -> JsonRpcResponse {
    JsonRpcResponse::ok(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            },
            "instructions": INSTRUCTIONS
        }),
    )
}

fn handle_tools_call(id: Value, params: &Option<Value>, ctx: &ToolContext) -> JsonRpcResponse {
    let Some(params) = params else {
        return JsonRpcResponse::err(id, INVALID_PARAMS, "missing params");
    };

    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::err(id, INVALID_PARAMS, "missing tool name");
    };

    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = tools::call_tool(ctx, tool_name, &args);
    JsonRpcResponse::ok(id, serde_json::to_value(result).unwrap_or(Value::Null))
}
