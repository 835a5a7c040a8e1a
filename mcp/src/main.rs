use apibridge_core::BridgeConfig;
use apibridge_core::config::{
    DEFAULT_API_BASE_URL, DEFAULT_API_KEY, DEFAULT_CACHE_TTL_SECS, DEFAULT_RATE_LIMIT_REQUESTS,
};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use apibridge_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "apibridge-mcp",
    version,
    about = "apibridge MCP server — remote item API exposed as tools over stdio"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    api_key: String,

    /// Seconds a cached GET response stays fresh
    #[arg(long, env = "CACHE_TTL", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    cache_ttl: u64,

    /// Outbound requests allowed per 60-second window
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value_t = DEFAULT_RATE_LIMIT_REQUESTS)]
    rate_limit_requests: u32,

    /// Emit logs as JSON lines
    #[arg(long, env = "APIBRIDGE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: McpCommands,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "apibridge_mcp=info,apibridge_mcp_runtime=info".into());
    // stdout carries protocol frames, so logs go to stderr.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = BridgeConfig {
        api_base_url: cli.api_url,
        api_key: cli.api_key,
        cache_ttl_secs: cli.cache_ttl,
        rate_limit_requests: cli.rate_limit_requests,
        ..BridgeConfig::default()
    };

    let code = run_mcp(config, cli.command).await;
    std::process::exit(code);
}
