use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskwarden_agent::{AskResponse, LlmResponder, TaskAgent};
use taskwarden_core::config::AppConfig;
use taskwarden_core::event::EventBus;
use taskwarden_core::task::{today_utc, TaskFilter, TaskRecord};
use taskwarden_core::traits::{LlmClient, TaskSearch, TaskStore};
use taskwarden_core::types::WorkflowEvent;
use taskwarden_memory::{
    EmbeddingProvider, HttpEmbeddingProvider, IndexedTaskStore, SemanticTaskSearch, SqliteTaskStore,
};
use taskwarden_tools::OperationRegistry;

#[derive(Parser)]
#[command(name = "taskwarden", version, about = "Task-list assistant with guarded agent routing")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskwarden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Ask a single question and exit
    Ask {
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Start interactive REPL mode
    Repl {
        /// Print each node as it completes
        #[arg(long)]
        trace: bool,
    },
    /// Show current configuration
    Config,
    /// Inspect the task store
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum TasksAction {
    /// List tasks ordered by due date
    List {
        /// 0 any, 1 open, 2 completed
        #[arg(long, default_value = "0")]
        completed: u64,
        /// 0 any, 1 past due, 2 due today, 3 future
        #[arg(long, default_value = "0")]
        due: u64,
    },
}

struct Components {
    store: Arc<IndexedTaskStore>,
    search: Option<Arc<dyn TaskSearch>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskwarden=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "taskwarden", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    config.validate()?;

    if let Some(Commands::Config) = &cli.command {
        print_config(&config)?;
        return Ok(());
    }

    let components = open_store(&config).await?;

    if let Some(Commands::Tasks { action }) = &cli.command {
        let TasksAction::List { completed, due } = action;
        let tasks = components
            .store
            .get_tasks(TaskFilter::from_codes(*completed, *due))
            .await?;
        print_tasks(&tasks);
        return Ok(());
    }

    let event_bus = Arc::new(EventBus::default());
    let store: Arc<dyn TaskStore> = components.store.clone();
    let registry = OperationRegistry::with_task_operations(store.clone(), components.search);

    let llm: Arc<dyn LlmClient> = Arc::new(taskwarden_llm::create_retrying_client(&config));
    let responder = Arc::new(LlmResponder::new(llm, &config, event_bus.clone()));
    let agent = Arc::new(TaskAgent::start(&config, responder, &registry, event_bus.clone()).await?);

    info!(
        model = %config.model.model_id,
        provider = %config.model.provider,
        operations = registry.list().len(),
        "Taskwarden started"
    );

    match cli.command {
        Some(Commands::Serve) => {
            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            let server =
                taskwarden_gateway::GatewayServer::new(config.gateway.clone(), agent, store);
            server.run(cancel).await?;
        }
        Some(Commands::Ask { question }) => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("Question cannot be empty.");
            }
            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                cancel_clone.cancel();
            });
            let answer = agent.ask_question_with_cancel(&question, cancel).await;
            print_answer(&answer);
        }
        Some(Commands::Repl { trace }) => run_repl(&agent, &event_bus, trace).await?,
        None => run_repl(&agent, &event_bus, false).await?,
        Some(Commands::Config | Commands::Tasks { .. } | Commands::Completions { .. }) => {}
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home) = dirs_home().map(|h| h.join(".taskwarden").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    warn!("No config file found, reading settings from the environment");
    eprintln!("See taskwarden.toml.example for reference.");
    Ok(AppConfig::from_env()?)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Components> {
    std::fs::create_dir_all(config.workspace_dir()).ok();

    let sqlite = Arc::new(SqliteTaskStore::open(&config.store_path())?);
    if config.store.seed_samples {
        sqlite.seed_samples(today_utc())?;
    }

    let embedder: Option<Arc<dyn EmbeddingProvider>> = config
        .embedding
        .as_ref()
        .map(|ec| Arc::new(HttpEmbeddingProvider::from_config(ec)) as Arc<dyn EmbeddingProvider>);

    let store = Arc::new(IndexedTaskStore::new(sqlite.clone(), embedder.clone()));
    let search: Option<Arc<dyn TaskSearch>> = match embedder {
        Some(embedder) => {
            match store.reindex_all().await {
                Ok(count) => info!(count, "Task search index ready"),
                Err(e) => warn!(error = %e, "Task indexing failed; search may miss tasks"),
            }
            Some(Arc::new(SemanticTaskSearch::new(
                sqlite,
                embedder,
                config.search.clone(),
            )))
        }
        None => {
            info!("No embedding model configured; semantic search disabled");
            None
        }
    };

    Ok(Components { store, search })
}

async fn run_repl(agent: &TaskAgent, event_bus: &EventBus, trace: bool) -> anyhow::Result<()> {
    println!("Taskwarden v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /clear to reset the conversation, /quit to exit.\n");

    if trace {
        let mut rx = event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let WorkflowEvent::NodeCompleted {
                    node_id,
                    summary,
                    elapsed_ms,
                    ..
                } = event
                {
                    eprintln!(
                        "\x1b[2mExecutor Completed: {} ({}ms) {}\x1b[0m",
                        node_id, elapsed_ms, summary
                    );
                }
            }
        });
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/clear" => {
                match agent.clear_history().await {
                    Ok(()) => println!("Hello! How can I help you?"),
                    Err(e) => eprintln!("Error: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let answer = agent.ask_question(input).await;
        print_answer(&answer);
        println!();
    }

    Ok(())
}

fn print_answer(answer: &AskResponse) {
    println!("{}", answer.answer);
    if !answer.tasks.is_empty() {
        print_tasks(&answer.tasks);
    }
}

fn print_tasks(tasks: &[TaskRecord]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    for task in tasks {
        let mark = if task.is_completed { "x" } else { " " };
        println!("  [{}] {}  (due {})", mark, task.title, task.due_date);
        if !task.description.is_empty() {
            println!("      {}", task.description);
        }
    }
}

fn print_config(config: &AppConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.model.api_key.is_some() {
        shown.model.api_key = Some("***".into());
    }
    for fb in &mut shown.fallback_models {
        if fb.api_key.is_some() {
            fb.api_key = Some("***".into());
        }
    }
    if let Some(embedding) = shown.embedding.as_mut() {
        if embedding.api_key.is_some() {
            embedding.api_key = Some("***".into());
        }
    }
    if shown.gateway.token.is_some() {
        shown.gateway.token = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
