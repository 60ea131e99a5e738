mod config;
mod error;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use runtime::{Agent, Conversation, Provider, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use error::Result;

const CONFIG_FILE: &str = "toolbridge.toml";

#[derive(Parser)]
#[command(name = "toolbridge")]
#[command(about = "Drive an MCP tool server with a tool-calling language model", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file [default: ./toolbridge.toml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model name, overriding the config file
    #[arg(long, global = true, env = "TOOLBRIDGE_MODEL")]
    model: Option<String>,

    /// Maximum number of model queries per run
    #[arg(long, global = true)]
    step_budget: Option<usize>,

    /// Provider API key, overriding the config file
    #[arg(long, global = true, env = "TOOLBRIDGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one prompt and exit
    Run {
        prompt: String,
        /// Also write the answer to this markdown file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start an interactive chat session
    Chat,
    /// List the tools the server exposes
    Tools,
}

#[tokio::main]
async fn main() {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so answers on stdout stay clean.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    if let Some(budget) = cli.step_budget {
        config.agent.step_budget = budget;
    }
    if let Some(key) = cli.api_key {
        config.backend.api_key = Some(key);
    }

    match cli.command {
        Commands::Run { prompt, output } => cmd_run(&config, &prompt, output.as_deref()).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Tools => cmd_tools(&config).await,
    }
}

/// An explicit path must exist; the default one is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received");
            trigger.cancel();
        }
    });
    token
}

async fn start_agent(config: &Config) -> Result<Agent<Provider, mcp::Server>> {
    // Resolve everything that can fail before spawning the server.
    let backend = config.backend()?;
    let server = config.server_config()?;
    tracing::info!(backend = %backend, "starting");

    let session = Session::start(server).await?;
    Ok(Agent::new(backend, session, config.agent_config()))
}

async fn cmd_run(config: &Config, prompt: &str, output: Option<&Path>) -> Result<()> {
    let agent = start_agent(config).await?;
    let cancel = cancel_on_interrupt();

    let result = agent.ask(prompt, &cancel).await;
    agent.session().shutdown().await;
    let outcome = result?;

    if outcome.is_truncated() {
        tracing::warn!(steps = outcome.steps, "stopped at the step budget");
    }
    let answer = outcome.final_answer().unwrap_or_default();
    println!("{answer}");

    if let Some(path) = output {
        std::fs::write(path, render_artifact(prompt, &answer, Local::now()))?;
        tracing::info!(path = %path.display(), "answer written");
    }
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("toolbridge v{}", env!("CARGO_PKG_VERSION"));

    let agent = start_agent(config).await?;
    let catalog = agent.session().registry().snapshot();
    println!("Session ID: {}", agent.session().id);
    println!("Model: {}", config.backend.model);
    println!("Tools: {}", catalog.len());
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let cancel = cancel_on_interrupt();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation = Conversation::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = cancel.cancelled() => break,
        };
        // EOF
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let mut turn = conversation.clone();
        if let Err(e) = turn.push_user(input) {
            eprintln!("Error: {e}\n");
            continue;
        }

        match agent.run(turn, &cancel).await {
            Ok(outcome) => {
                if outcome.is_truncated() {
                    eprintln!("(stopped after {} steps)", outcome.steps);
                }
                println!("\n{}\n", outcome.final_answer().unwrap_or_default());
                conversation = outcome.conversation;
            }
            Err(runtime::Error::Cancelled) => break,
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }

    agent.session().shutdown().await;
    println!("\nSession ended.");
    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let session = Session::start(config.server_config()?).await?;
    let catalog = session.registry().snapshot();

    if catalog.is_empty() {
        println!("No tools found.");
    }
    for contract in catalog.contracts() {
        println!("{}  {}", contract.name(), contract.description());
        for param in contract.parameters() {
            let requirement = match &param.default {
                None => "required".to_string(),
                Some(default) if default.is_null() => "optional".to_string(),
                Some(default) => format!("default {default}"),
            };
            println!(
                "    {:<20} {:<8} {:<16} {}",
                param.name,
                param.kind.as_str(),
                requirement,
                param.description
            );
        }
    }
    for diagnostic in catalog.diagnostics() {
        println!("warning: {diagnostic}");
    }

    session.shutdown().await;
    Ok(())
}

/// Markdown document recording one answered prompt.
fn render_artifact(prompt: &str, answer: &str, generated: DateTime<Local>) -> String {
    format!(
        "# toolbridge answer\n\n*Generated {}*\n\n## Prompt\n\n{prompt}\n\n## Answer\n\n{answer}\n",
        generated.format("%Y-%m-%d %H:%M:%S")
    )
}
