use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use qsched::{
    qlog, Error, ResourceEstimate, Result, Scheduler, SchedulerConfig, TaskId, TaskSpec,
};

const CATEGORIES: [&str; 4] = ["ml", "etl", "web", "infra"];
const ASSIGNEES: [&str; 4] = ["w1", "w2", "w3", "w4"];
const OUTCOME_TICK: Duration = Duration::from_millis(250);

/// qsched - probabilistic task scheduler
#[derive(Parser, Debug)]
#[command(name = "qsched")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    QSCHED_LOG=debug    Log level (error|warn|info|debug|trace)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.qsched/qsched.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (defaults to ~/.qsched/qsched.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the scheduler against a synthetic workload and print metrics
    Simulate {
        /// Number of synthetic tasks
        #[arg(long, default_value_t = 100)]
        tasks: usize,

        /// How long to run the periodic actors
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Seed for deterministic runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build a dependency-chained workload and print its execution plan
    Plan {
        /// Number of synthetic tasks
        #[arg(long, default_value_t = 12)]
        tasks: usize,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    qsched::log::init(cli.debug);

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::load_default()?,
    };

    match cli.command {
        Command::Simulate {
            tasks,
            seconds,
            seed,
        } => run_simulate(config, tasks, seconds, seed),
        Command::Plan { tasks } => run_plan(config, tasks),
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_simulate(
    mut config: SchedulerConfig,
    tasks: usize,
    seconds: u64,
    seed: Option<u64>,
) -> Result<()> {
    if seed.is_some() {
        config.rng_seed = seed;
    }
    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    qlog!("simulate tasks={} seconds={} seed={:?}", tasks, seconds, config.rng_seed);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let scheduler = Scheduler::new(config)?;

        let mut pending: Vec<TaskId> = Vec::with_capacity(tasks);
        for i in 0..tasks {
            let mut spec = synthetic_spec(i, &mut rng);
            if !pending.is_empty() && rng.gen_bool(0.3) {
                spec = spec.with_dependencies([pending[rng.gen_range(0..pending.len())]]);
            }
            let task = scheduler.create_task(spec).await?;
            pending.push(task.id);
        }

        scheduler.start();

        // Spread completions evenly over the run.
        let ticks = (seconds * 1000 / OUTCOME_TICK.as_millis() as u64).max(1) as usize;
        let per_tick = tasks.div_ceil(ticks).max(1);
        let deadline = Instant::now() + Duration::from_secs(seconds);
        let mut interval = tokio::time::interval(OUTCOME_TICK);
        while Instant::now() < deadline {
            interval.tick().await;
            for _ in 0..per_tick {
                if pending.is_empty() {
                    break;
                }
                let id = pending.swap_remove(rng.gen_range(0..pending.len()));
                let Some(task) = scheduler.get_task(&id).await else {
                    continue;
                };
                let estimate = task.estimated_duration_ms.unwrap_or(1_000) as f64;
                let actual = (estimate * rng.gen_range(0.6..1.6)) as u64;
                scheduler
                    .complete_task(id, rng.gen_bool(0.85), actual)
                    .await?;
            }
        }

        let metrics = scheduler.get_metrics().await;
        let live_config = scheduler.config().await;
        let plan = scheduler.get_optimal_execution_plan().await;
        let report = serde_json::json!({
            "metrics": metrics,
            "config": live_config,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);

        scheduler.shutdown().await;
        Ok::<(), Error>(())
    })
}

fn run_plan(config: SchedulerConfig, tasks: usize) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let scheduler = Scheduler::new(config)?;
        let mut previous: Option<TaskId> = None;
        for i in 0..tasks {
            let mut spec = TaskSpec::new(format!("step-{}", i))
                .with_estimated_duration(100 * (1 + (i as u64 % 5)));
            // Three interleaved chains.
            if i % 3 != 0 {
                if let Some(prev) = previous {
                    spec = spec.with_dependencies([prev]);
                }
            }
            previous = Some(scheduler.create_task(spec).await?.id);
        }
        let plan = scheduler.get_optimal_execution_plan().await;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        scheduler.shutdown().await;
        Ok::<(), Error>(())
    })
}

fn synthetic_spec(i: usize, rng: &mut StdRng) -> TaskSpec {
    TaskSpec::new(format!("task-{}", i))
        .with_priority(rng.gen_range(-10..=10))
        .with_category(CATEGORIES[rng.gen_range(0..CATEGORIES.len())])
        .with_assignee(ASSIGNEES[rng.gen_range(0..ASSIGNEES.len())])
        .with_resources(ResourceEstimate::new(
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
            if rng.gen_bool(0.2) { rng.gen_range(0.0..1.0) } else { 0.0 },
        ))
        .with_complexity(rng.gen_range(0.5..3.0))
        .with_estimated_duration(rng.gen_range(200..3_000))
}
