use clap::{Parser, Subcommand};
use incident_kb_mcp::{
    config::Config,
    state::create_store,
    sync::{FilesystemObjectStore, InMemoryMetricsSink, SyncPipeline, SyncSettings},
};
use reqwest::Client;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "incident-kb-cli")]
#[command(about = "Incident knowledge-base MCP client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    endpoint: String,

    /// Caller identity forwarded as x-user-id
    #[arg(short, long, env = "INCIDENT_KB_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform the protocol handshake
    Initialize,

    /// List the available tools
    Tools,

    /// Invoke a tool
    Call {
        #[arg(value_name = "TOOL")]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Trigger a corpus sync pass on the server
    Sync,

    /// Check server health
    Health,

    /// Run one sync pass directly against the configured store
    #[command(name = "local-sync")]
    LocalSync,
}

async fn rpc(cli: &Cli, client: &Client, method: &str, params: Value) -> Result<Value, Box<dyn Error>> {
    let mut request = client.post(format!("{}/mcp", cli.endpoint)).json(&json!({
        "jsonrpc": "2.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "method": method,
        "params": params,
    }));
    if let Some(user) = &cli.user {
        request = request.header("x-user-id", user);
    }

    let body: Value = request.send().await?.json().await?;
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    let body = match &cli.command {
        Commands::Initialize => {
            rpc(
                &cli,
                &client,
                "initialize",
                json!({"clientInfo": {"name": "incident-kb-cli", "version": env!("CARGO_PKG_VERSION")}}),
            )
            .await?
        }

        Commands::Tools => rpc(&cli, &client, "tools/list", json!({})).await?,

        Commands::Call { tool, args } => {
            let arguments: Value = serde_json::from_str(args)?;
            if !arguments.is_object() {
                eprintln!("Error: --args must be a JSON object");
                std::process::exit(2);
            }
            rpc(
                &cli,
                &client,
                "tools/call",
                json!({"name": tool, "arguments": arguments}),
            )
            .await?
        }

        Commands::Sync => {
            client
                .post(format!("{}/v1/sync", cli.endpoint))
                .send()
                .await?
                .json()
                .await?
        }

        Commands::Health => {
            client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?
                .json()
                .await?
        }

        Commands::LocalSync => {
            let config = Config::load()?;
            let store = create_store(&config.state).await?;
            let metrics = InMemoryMetricsSink::new();
            let pipeline = SyncPipeline::new(
                store,
                Arc::new(FilesystemObjectStore::new(config.corpus.root.clone())),
                Arc::new(metrics.clone()),
                SyncSettings::from_config(&config.sync, &config.corpus),
            );

            let result = pipeline.run().await?;
            json!({
                "corpus": config.corpus.root.display().to_string(),
                "result": result,
                "metrics": metrics
                    .published()
                    .into_iter()
                    .flat_map(|(_, data)| data)
                    .map(|d| (d.name.to_string(), json!(d.value)))
                    .collect::<serde_json::Map<String, Value>>(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
