use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use loom_agent::{AgentLoop, AgentLoopConfig};
use loom_context::{ContextConfig, ContextStore};
use loom_core::tools::ToolRegistry;
use loom_llm::{OpenAiClient, SharedChatClient};
use loom_task::{ConfirmationResponse, ProposedAction, TaskExecutor, TaskExecutorConfig};
use loom_tools::register_builtin_tools;
use loom_workflow::{
    StartOptions, Workflow, WorkflowEngine, WorkflowEngineConfig, WorkflowExecutor, WorkflowStatus,
};

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "LLM-driven agent runtime: tasks, tools and workflows")]
#[command(version)]
struct Cli {
    /// OpenAI-compatible endpoint base URL
    #[arg(long, env = "LOOM_BASE_URL", default_value = "http://localhost:11434/v1")]
    base_url: String,

    /// API key for the endpoint
    #[arg(long, env = "LOOM_API_KEY")]
    api_key: Option<String>,

    /// Model identifier
    #[arg(long, env = "LOOM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Working directory for file tools
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a user request through the iterative task loop
    Run {
        /// The request, e.g. "Read file hello.txt"
        request: String,
        /// Execute proposed actions without asking
        #[arg(long, short = 'y')]
        auto_approve: bool,
        #[arg(long, default_value_t = 10)]
        max_iterations: usize,
    },
    /// Run a single task through the raw agent loop (no confirmation gate)
    Agent {
        task: String,
        #[arg(long, default_value_t = 10)]
        max_iterations: usize,
    },
    /// Workflow operations
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Tool registry operations
    Tools {
        #[command(subcommand)]
        command: ToolCommands,
    },
    /// Write a starter loom.json configuration
    Init,
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Run a workflow from a JSON definition file
    Run {
        file: PathBuf,
        /// Initial variables as JSON, e.g. '{"name": "x"}'
        #[arg(long)]
        variables: Option<String>,
    },
}

#[derive(Subcommand)]
enum ToolCommands {
    /// List registered tools
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry).context("failed to register builtin tools")?;

    let mut llm = OpenAiClient::new(cli.base_url.clone()).with_model(cli.model.clone());
    if let Some(api_key) = &cli.api_key {
        llm = llm.with_api_key(api_key.clone());
    }
    let llm: SharedChatClient = Arc::new(llm);

    match cli.command {
        Commands::Run {
            request,
            auto_approve,
            max_iterations,
        } => run_task(llm, registry, cli.workdir, request, auto_approve, max_iterations).await,
        Commands::Agent {
            task,
            max_iterations,
        } => run_agent(llm, registry, cli.workdir, task, max_iterations).await,
        Commands::Workflow {
            command: WorkflowCommands::Run { file, variables },
        } => run_workflow(registry, cli.workdir, file, variables).await,
        Commands::Tools {
            command: ToolCommands::List,
        } => {
            list_tools(&registry);
            Ok(())
        }
        Commands::Init => init_project(),
    }
}

async fn run_task(
    llm: SharedChatClient,
    registry: Arc<ToolRegistry>,
    workdir: PathBuf,
    request: String,
    auto_approve: bool,
    max_iterations: usize,
) -> anyhow::Result<()> {
    let executor = TaskExecutor::new(
        llm,
        registry,
        TaskExecutorConfig {
            max_iterations,
            workdir,
            ..TaskExecutorConfig::default()
        },
    );

    let mut ctx = executor.create_initial_task(&request).await;
    println!("Planned todos:");
    for todo in &ctx.todos.items {
        println!("  - {}", todo.description);
    }

    let answer = executor
        .run(&mut ctx, |confirmation_id, todo, actions| {
            if auto_approve {
                return ConfirmationResponse::Approved;
            }
            prompt_for_confirmation(confirmation_id, &todo.description, actions)
        })
        .await
        .context("task failed")?;

    println!("\n{answer}");
    Ok(())
}

fn prompt_for_confirmation(
    confirmation_id: &str,
    todo: &str,
    actions: &[ProposedAction],
) -> ConfirmationResponse {
    println!("\nConfirmation {confirmation_id}");
    println!("Next todo: {todo}");
    println!("Proposed actions:");
    for action in actions {
        match &action.tool {
            Some(tool) => println!("  - {} -> {} {}", action.description, tool, action.arguments),
            None => println!("  - {} -> (no matching tool, will be skipped)", action.description),
        }
    }
    print!("Approve? [y]es / [n]o / m <new request>: ");
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return ConfirmationResponse::Cancelled;
    }
    let input = input.trim();

    if let Some(rest) = input.strip_prefix("m ") {
        return ConfirmationResponse::Modified(rest.to_string());
    }
    match input {
        "y" | "yes" | "" => ConfirmationResponse::Approved,
        _ => ConfirmationResponse::Cancelled,
    }
}

async fn run_agent(
    llm: SharedChatClient,
    registry: Arc<ToolRegistry>,
    workdir: PathBuf,
    task: String,
    max_iterations: usize,
) -> anyhow::Result<()> {
    let context = ContextStore::new(ContextConfig::default());
    let config = AgentLoopConfig {
        max_iterations,
        workdir,
        ..AgentLoopConfig::default()
    };

    let mut agent = AgentLoop::new(context, llm, registry, config);
    let result = agent.execute_task(task).await.context("agent task failed")?;

    println!("{}", result.response);
    log::info!(
        "agent finished after {} iterations ({} LLM calls)",
        result.iterations,
        agent.stats().llm_calls
    );
    Ok(())
}

async fn run_workflow(
    registry: Arc<ToolRegistry>,
    workdir: PathBuf,
    file: PathBuf,
    variables: Option<String>,
) -> anyhow::Result<()> {
    let definition = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let workflow: Workflow =
        serde_json::from_str(&definition).context("invalid workflow definition")?;

    let initial_variables = match variables {
        Some(raw) => serde_json::from_str::<serde_json::Value>(&raw)
            .context("invalid --variables JSON")?
            .as_object()
            .cloned()
            .unwrap_or_default(),
        None => Default::default(),
    };

    let executor = Arc::new(WorkflowExecutor::new(registry).with_workdir(workdir));
    let engine = WorkflowEngine::new(executor, WorkflowEngineConfig::default());

    engine.events().subscribe_all(|event| {
        log::info!("{}", serde_json::to_string(event).unwrap_or_default());
    });

    let execution_id = engine.start(
        workflow,
        StartOptions {
            initial_variables,
            ..StartOptions::default()
        },
    )?;
    println!("execution {execution_id} started");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let Some(state) = engine.get_execution(&execution_id) else {
            bail!("execution disappeared");
        };
        if state.status.is_terminal() {
            let progress = engine.progress(&execution_id)?;
            println!(
                "execution {execution_id} finished: {:?} ({:.0}% of {} steps)",
                state.status, progress.percent, progress.total_steps
            );
            for (step_id, result) in &state.step_results {
                println!("  {step_id}: {result}");
            }
            if state.status != WorkflowStatus::Completed {
                bail!(
                    "workflow {:?}: {}",
                    state.status,
                    state.error.unwrap_or_default()
                );
            }
            return Ok(());
        }
    }
}

fn list_tools(registry: &ToolRegistry) {
    for schema in registry.list_schemas() {
        let metadata = registry
            .get(&schema.function.name)
            .map(|tool| tool.metadata())
            .unwrap_or_default();
        let mut flags = Vec::new();
        if metadata.has_side_effects {
            flags.push("side-effects");
        }
        if metadata.requires_confirmation {
            flags.push("confirm");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "{:<18} {:?}{}  {}",
            schema.function.name, metadata.category, flags, schema.function.description
        );
    }
}

fn init_project() -> anyhow::Result<()> {
    let path = PathBuf::from("loom.json");
    if path.exists() {
        bail!("loom.json already exists");
    }

    let config = serde_json::json!({
        "base_url": "http://localhost:11434/v1",
        "model": "gpt-4o-mini",
        "max_iterations": 10
    });
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)
        .context("failed to write loom.json")?;

    println!("wrote loom.json; set LOOM_BASE_URL / LOOM_API_KEY / LOOM_MODEL to override");
    Ok(())
}
