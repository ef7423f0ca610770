use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;

use heron::agent::Agent;
use heron::providers::configs::{
    DatabricksProviderConfig, OpenAiProviderConfig, ProviderConfig,
};
use heron::providers::factory::get_provider;
use heron::systems::functions::{FunctionClient, FunctionSystem};
use heron::systems::retrieval::{RetrievalConfig, RetrievalSystem, VectorSearchClient};

mod session;
mod session_file;

use session::Session;
use session_file::{generate_session_name, load_messages, session_path};

#[derive(Parser)]
#[command(name = "heron", author, version, about, long_about = None)]
struct Cli {
    /// Provider option (databricks or open-ai)
    #[arg(short, long, default_value = "databricks")]
    #[arg(value_enum)]
    provider: ProviderVariant,

    /// Serving endpoint name (can also be set via LLM_ENDPOINT_NAME)
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name for the open-ai provider (can also be set via OPENAI_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Fully qualified catalog function to expose as a tool (repeatable)
    #[arg(long = "function")]
    functions: Vec<String>,

    /// Vector search index to expose as a retriever tool
    #[arg(long)]
    vector_index: Option<String>,

    /// Comma separated columns to return from the vector index
    #[arg(long, default_value = "content")]
    vector_index_columns: String,

    /// System prompt override
    #[arg(long)]
    system: Option<String>,

    /// Stop a run after this many assistant turns
    #[arg(long, default_value_t = 10)]
    max_turns: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ProviderVariant {
    Databricks,
    OpenAi,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Session {
        /// Name of the session to create or resume
        #[arg(short, long)]
        name: Option<String>,

        /// Resume the conversation recorded under --name
        #[arg(short, long)]
        resume: bool,
    },
    /// Send one message and print the produced messages
    Run {
        /// The user message to send
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let agent = build_agent(&cli).await?;

    match &cli.command {
        Command::Session { name, resume } => {
            let name = name.clone().unwrap_or_else(generate_session_name);
            let session_file = session_path(&name)?;
            let messages = if *resume {
                load_messages(&session_file)?
            } else {
                Vec::new()
            };

            let mut session = Session::new(agent, session_file, cli.max_turns, messages);
            session.start().await
        }
        Command::Run { message } => {
            let session_file = session_path(&generate_session_name())?;
            let mut session = Session::new(agent, session_file, cli.max_turns, Vec::new());
            session.headless(message).await
        }
    }
}

async fn build_agent(cli: &Cli) -> Result<Agent> {
    let provider_config = match cli.provider {
        ProviderVariant::Databricks => {
            let mut config = DatabricksProviderConfig::from_env()
                .or_else(|_| databricks_config_with_endpoint(cli))?;
            if let Some(endpoint) = &cli.endpoint {
                config.endpoint = endpoint.clone();
            }
            ProviderConfig::Databricks(config)
        }
        ProviderVariant::OpenAi => {
            let mut config = OpenAiProviderConfig::from_env()?;
            if let Some(model) = &cli.model {
                config.model = model.clone();
            }
            ProviderConfig::OpenAi(config)
        }
    };

    let mut agent = Agent::new(get_provider(provider_config)?);
    if let Some(system) = &cli.system {
        agent = agent.with_system_prompt(system.clone());
    }

    if !cli.functions.is_empty() {
        let client = FunctionClient::from_env()?;
        let system = FunctionSystem::new(client, &cli.functions)
            .await
            .context("Failed to load catalog function metadata")?;
        agent.add_system(Box::new(system));
    }

    if let Some(index) = &cli.vector_index {
        let client = VectorSearchClient::from_env()?;
        let columns = cli
            .vector_index_columns
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let config = RetrievalConfig::new(index.clone())
            .with_tool(
                "search_index",
                format!("Retrieves documents from the {} index", index),
            )
            .with_columns(columns);
        agent.add_system(Box::new(RetrievalSystem::new(client, config)));
    }

    Ok(agent)
}

/// Allow `--endpoint` to stand in for LLM_ENDPOINT_NAME when only the host and
/// token come from the environment
fn databricks_config_with_endpoint(cli: &Cli) -> Result<DatabricksProviderConfig> {
    let endpoint = cli
        .endpoint
        .clone()
        .context("Serving endpoint must be set via --endpoint or LLM_ENDPOINT_NAME")?;
    let host = env::var("DATABRICKS_HOST").context("DATABRICKS_HOST must be set")?;
    let token = env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN must be set")?;

    Ok(DatabricksProviderConfig::new(host, token, endpoint))
}
