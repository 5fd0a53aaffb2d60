#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use poem_mcpserver::McpServer;
use ssh_ingest::mcp::McpIngestCommands;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    poem_mcpserver::stdio::stdio(McpServer::new().tools(McpIngestCommands)).await?;
    Ok(())
}
