//! QuantumFlow command line: plan a goal, review it, execute it.

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qf_core::agents::default_agents;
use qf_core::approval::ApprovalWorkflow;
use qf_core::config::{load_config, AppConfig, ClassifierChoice};
use qf_core::executor::Executor;
use qf_core::inference::{InferencePool, OllamaClient};
use qf_core::orchestrator::Orchestrator;
use qf_core::planner::{PlanGenerationRequest, Planner};
use qf_core::routing::{Classifier, LlmRouter, RuleBasedClassifier};
use qf_protocol::{ExecutionPlan, ExecutionStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "quantumflow",
    version,
    about = "Locally-hosted multi-agent plan runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List models available on the backend.
    Models,

    /// Generate an execution plan for a goal and ask for approval.
    Plan {
        /// The goal, in natural language.
        goal: Vec<String>,

        /// Approve without prompting.
        #[arg(long)]
        yes: bool,

        /// Execute immediately once approved.
        #[arg(long)]
        execute: bool,
    },

    /// Execute (or resume) a saved plan.
    Execute {
        plan_id: String,
    },

    /// List saved plans.
    Plans,

    /// Probe the backend and print pool metrics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let config = load_config(&home).context("load configuration")?;

    match cli.command {
        Command::Models => models(&config).await,
        Command::Plan { goal, yes, execute } => plan(&config, &home, goal, yes, execute).await,
        Command::Execute { plan_id } => execute_saved(&config, &plan_id).await,
        Command::Plans => {
            for id in ApprovalWorkflow::new().list_plans() {
                println!("{id}");
            }
            Ok(())
        }
        Command::Stats => stats(&config).await,
    }
}

async fn models(config: &AppConfig) -> Result<()> {
    let client = OllamaClient::new(config.pool.client.clone());
    let models = client.list_models().await.context("list models")?;

    if models.is_empty() {
        println!("No models installed on the backend.");
    } else {
        for model in models {
            println!("{model}");
        }
    }
    Ok(())
}

async fn plan(
    config: &AppConfig,
    home: &std::path::Path,
    goal: Vec<String>,
    yes: bool,
    execute: bool,
) -> Result<()> {
    let goal = goal.join(" ");
    if goal.trim().is_empty() {
        bail!("a goal is required, e.g. quantumflow plan build a todo API");
    }

    let pool = Arc::new(InferencePool::new(config.pool.clone()));
    let planner = Planner::new(pool.client());

    let mut request = PlanGenerationRequest::new(goal.as_str());
    request.current_dir = std::env::current_dir()
        .ok()
        .map(|d| d.display().to_string());

    println!("Planning: {goal}");
    let mut plan = planner.generate(&request).await.context("generate plan")?;

    let workflow = ApprovalWorkflow::new();
    let approved = if yes {
        plan.state.status = ExecutionStatus::Approved;
        true
    } else {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        workflow
            .request(&mut plan, &mut input, &mut output)
            .context("collect approval")?
    };

    workflow.save(&plan).context("save plan state")?;
    let plans_dir = home.join(".quantumflow").join("plans");
    workflow
        .save_markdown(&plan, &plans_dir)
        .context("save plan markdown")?;

    println!(
        "Plan {} saved ({})",
        plan.id,
        if approved { "approved" } else { "not approved" }
    );

    if approved && execute {
        run_plan(config, Arc::clone(&pool), &workflow, &mut plan).await?;
    }

    pool.shutdown(Duration::from_secs(10)).await.ok();
    Ok(())
}

async fn execute_saved(config: &AppConfig, plan_id: &str) -> Result<()> {
    let workflow = ApprovalWorkflow::new();
    let mut plan = workflow
        .load(plan_id)
        .with_context(|| format!("load plan {plan_id}"))?;

    if plan.state.status == ExecutionStatus::Cancelled {
        bail!("plan {plan_id} was cancelled at review; generate a new one");
    }

    let pool = Arc::new(InferencePool::new(config.pool.clone()));
    let result = run_plan(config, Arc::clone(&pool), &workflow, &mut plan).await;
    pool.shutdown(Duration::from_secs(10)).await.ok();
    result
}

/// Wire the orchestrator, run the executor, and persist the final state
/// whether it completed or failed.
async fn run_plan(
    config: &AppConfig,
    pool: Arc<InferencePool>,
    workflow: &ApprovalWorkflow,
    plan: &mut ExecutionPlan,
) -> Result<()> {
    let classifier: Box<dyn Classifier> = match config.classifier {
        ClassifierChoice::RuleBased => Box::new(RuleBasedClassifier::new()),
        ClassifierChoice::Llm => Box::new(LlmRouter::new(pool.client())),
    };

    let mut orchestrator = Orchestrator::new(config.orchestrator.clone(), classifier);
    if config.classifier == ClassifierChoice::Llm {
        // A model round-trip per routing decision is worth caching.
        orchestrator = orchestrator.with_routing_cache(Duration::from_secs(5 * 60));
    }
    let orchestrator = Arc::new(orchestrator);
    for agent in default_agents(pool) {
        orchestrator.register(agent)?;
    }

    let mut executor = Executor::new(orchestrator);
    let outcome = executor.execute(plan).await;

    workflow.save(plan).context("persist plan state")?;

    match outcome {
        Ok(()) => {
            println!("Plan {} completed.", plan.id);
            Ok(())
        }
        Err(err) => {
            println!(
                "Plan {} failed at phase {}; run `quantumflow execute {}` to resume.",
                plan.id,
                plan.state.current_phase + 1,
                plan.id
            );
            Err(err).context("plan execution failed")
        }
    }
}

async fn stats(config: &AppConfig) -> Result<()> {
    let pool = InferencePool::new(config.pool.clone());

    match pool.submit_sync("Reply with the single word OK.", 0).await {
        Ok(result) => println!(
            "probe: {:.2}s, {:.1} tokens/s",
            result.latency.as_secs_f64(),
            result.tokens_per_sec
        ),
        Err(err) => println!("probe failed: {err}"),
    }

    let metrics = pool.metrics();
    println!("requests:      {}", metrics.total_requests);
    println!("completed ok:  {}", metrics.completed_ok);
    println!("completed err: {}", metrics.completed_error);
    println!("mean latency:  {:?}", metrics.average_latency);
    println!("in flight:     {}", metrics.current_inflight);

    pool.shutdown(Duration::from_secs(5)).await.ok();
    Ok(())
}
