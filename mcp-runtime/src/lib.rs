use std::sync::Arc;

use apibridge_core::BridgeConfig;
use clap::{Args, Subcommand};
use serde_json::{Map, Value};

pub mod executor;
pub mod server;
pub mod tools;
mod util;

pub use executor::{ApiExecutor, ApiRequest, HttpMethod, RequestExecutor};
pub use server::McpServer;
pub use tools::{ToolHandlers, tool_definitions};
pub use util::ToolError;

use server::render_error;

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the MCP server over stdio
    Serve,
    /// Invoke a single tool and print its text result
    Call(McpCallArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpCallArgs {
    /// Tool name (e.g. get_user_info, search_items, get_api_status)
    pub tool: String,
    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub arguments: String,
}

pub async fn run(config: BridgeConfig, command: McpCommands) -> i32 {
    if let Err(err) = config.validate() {
        eprintln!("{}", render_error("config_invalid", &err.to_string()));
        return 1;
    }
    tracing::info!(
        api_base_url = %config.api_base_url,
        cache_ttl_secs = config.cache_ttl_secs,
        rate_limit_requests = config.rate_limit_requests,
        "Starting apibridge MCP runtime"
    );
    let tools = ToolHandlers::new(Arc::new(RequestExecutor::new(config)));

    match command {
        McpCommands::Serve => {
            let server = McpServer::new(tools);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "MCP server stopped");
                    eprintln!("{}", render_error("mcp_server_error", &err));
                    1
                }
            }
        }
        McpCommands::Call(args) => {
            let arguments = match parse_call_arguments(&args.arguments) {
                Ok(arguments) => arguments,
                Err(err) => {
                    eprintln!("{}", render_error(&err.code, &err.message));
                    return 1;
                }
            };
            match tools.call(&args.tool, &arguments).await {
                Ok(text) => {
                    println!("{text}");
                    0
                }
                Err(err) => {
                    eprintln!("{}", render_error(&err.code, &err.message));
                    1
                }
            }
        }
    }
}

fn parse_call_arguments(raw: &str) -> Result<Map<String, Value>, ToolError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ToolError::new(
            "validation_failed",
            "--arguments must be a JSON object",
        )
        .with_field("arguments")),
        Err(e) => Err(ToolError::new(
            "validation_failed",
            format!("--arguments is not valid JSON: {e}"),
        )
        .with_field("arguments")),
    }
}
