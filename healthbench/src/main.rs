//! HealthBench CLI

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use healthbench::{
    config::{ChatBackend, Config},
    dataset::{DatasetSource, Rubric},
    grading::{create_grader, GraderKind, RubricScorer},
    providers::create_chat_provider,
    report::{print_console_report, JsonFileSink},
    runner::{
        run_benchmark, CaseRunner, ConsoleProgress, Executor, RunError, RunRequest, StopSignal,
    },
};

#[derive(Parser)]
#[command(name = "healthbench")]
#[command(about = "Rubric-graded HealthBench evaluation for conversational medical models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark
    Run {
        /// Dataset variant name from the configuration
        #[arg(short, long, default_value = "standard")]
        dataset: String,

        /// Local NDJSON file to use instead of a configured variant
        #[arg(long)]
        dataset_file: Option<PathBuf>,

        /// Model under evaluation
        #[arg(short, long)]
        model: Option<String>,

        /// Evaluate only the first N cases
        #[arg(
            short = 'n',
            long,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        examples: Option<usize>,

        /// Output file for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Grading strategy
        #[arg(long, value_enum)]
        grader: Option<GraderKind>,

        /// Judge model for the judge grader
        #[arg(long)]
        judge_model: Option<String>,

        /// API key for OpenAI-compatible endpoints (overrides the env var)
        #[arg(long)]
        api_key: Option<String>,

        /// Backend serving the model under evaluation
        #[arg(long, value_enum)]
        chat_provider: Option<ChatBackend>,

        /// Base URL of the chat backend
        #[arg(long)]
        base_url: Option<String>,
    },

    /// List configured dataset variants
    ListDatasets,

    /// Grade a single response against a rubric file
    Grade {
        /// Rubric JSON file: an array of {"criterion", "points"} objects
        #[arg(short, long)]
        rubric: PathBuf,

        /// Response text
        #[arg(long, conflicts_with = "response_file", required_unless_present = "response_file")]
        response: Option<String>,

        /// File containing the response text
        #[arg(long)]
        response_file: Option<PathBuf>,

        /// Grading strategy
        #[arg(long, value_enum)]
        grader: Option<GraderKind>,

        /// Judge model for the judge grader
        #[arg(long)]
        judge_model: Option<String>,

        /// API key for the judge endpoint
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/healthbench.toml")]
        output: PathBuf,
    },
}

struct RunArgs {
    dataset: String,
    dataset_file: Option<PathBuf>,
    model: Option<String>,
    examples: Option<usize>,
    output: Option<PathBuf>,
    grader: Option<GraderKind>,
    judge_model: Option<String>,
    api_key: Option<String>,
    chat_provider: Option<ChatBackend>,
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("healthbench=debug,info")
    } else {
        EnvFilter::new("healthbench=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            dataset,
            dataset_file,
            model,
            examples,
            output,
            grader,
            judge_model,
            api_key,
            chat_provider,
            base_url,
        } => {
            let args = RunArgs {
                dataset,
                dataset_file,
                model,
                examples,
                output,
                grader,
                judge_model,
                api_key,
                chat_provider,
                base_url,
            };
            run(config, args).await?;
        }

        Commands::ListDatasets => {
            list_datasets(&config)?;
        }

        Commands::Grade {
            rubric,
            response,
            response_file,
            grader,
            judge_model,
            api_key,
        } => {
            grade(config, rubric, response, response_file, grader, judge_model, api_key).await?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run(mut config: Config, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(model) = args.model {
        config.chat.model = model;
    }
    if let Some(provider) = args.chat_provider {
        config.chat.provider = provider;
    }
    if let Some(url) = args.base_url {
        config.chat.base_url = Some(url);
    }
    if let Some(judge_model) = args.judge_model {
        config.judge.model = judge_model;
    }
    if let Some(grader) = args.grader {
        config.run.grader = grader;
    }
    if let Some(output) = args.output {
        config.run.output = output;
    }

    let (source, dataset_name) = match args.dataset_file {
        Some(path) => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (DatasetSource::File(path), name)
        }
        None => (config.dataset_source(&args.dataset)?, args.dataset),
    };

    let api_key = args.api_key.as_deref();
    let chat = create_chat_provider(&config.chat, api_key)?;
    let grader = create_grader(config.run.grader, &config, api_key)?;

    let stop = StopSignal::new();
    watch_interrupts(stop.clone());

    let executor = Executor::new(CaseRunner::new(chat, RubricScorer::new(grader)))
        .with_progress(Arc::new(ConsoleProgress::new()))
        .with_stop_signal(stop);

    let request = RunRequest::new(source, &dataset_name)
        .with_limit(args.examples)
        .with_dataset_timeout(Duration::from_millis(config.run.dataset_timeout_ms))
        .with_pass_threshold(config.run.pass_threshold);

    println!("=== HealthBench Evaluation ===");
    println!("Model:   {}", executor.model_name());
    println!("Dataset: {}", dataset_name);
    println!("Grader:  {}", executor.grader_name());
    if let Some(n) = args.examples {
        println!("Limit:   {} cases", n);
    }

    let sink = JsonFileSink::new(&config.run.output);
    match run_benchmark(&executor, &request, &sink).await {
        Ok(report) => {
            print_console_report(&report);
            println!("Results saved to: {}", sink.path().display());
            Ok(())
        }
        Err(RunError::EmptyRun(e)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// The first Ctrl-C lets the current case finish and the partial run be
/// saved. A second one exits at once with status 130.
fn watch_interrupts(stop: StopSignal) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.is_stopped() {
                eprintln!("\nAborted.");
                std::process::exit(130);
            }
            println!("\nStop requested, finishing the current case (Ctrl-C again to abort)...");
            stop.stop();
        }
    });
}

fn list_datasets(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Available Datasets ({}):", config.datasets.len());
    println!("{:-<60}", "");

    for (name, entry) in &config.datasets {
        let source = entry.source(name)?;
        println!("  {:<12} {}", name, entry.description);
        println!("  {:<12} source: {}", "", source);
    }

    Ok(())
}

async fn grade(
    mut config: Config,
    rubric_path: PathBuf,
    response: Option<String>,
    response_file: Option<PathBuf>,
    grader: Option<GraderKind>,
    judge_model: Option<String>,
    api_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(judge_model) = judge_model {
        config.judge.model = judge_model;
    }
    let kind = grader.unwrap_or(config.run.grader);

    let rubric: Rubric = serde_json::from_str(&std::fs::read_to_string(&rubric_path)?)?;
    let response = match (response, response_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err("either --response or --response-file is required".into()),
    };

    let scorer = RubricScorer::new(create_grader(kind, &config, api_key.as_deref())?);
    let evaluation = scorer.score(&response, &rubric).await;

    println!("Grader: {}", scorer.grader_name());
    println!("{:-<50}", "");
    for (criterion, awarded) in rubric.iter().zip(&evaluation.per_criterion_scores) {
        println!("  [{:>5}/{:>5}] {}", awarded, criterion.points, criterion.criterion);
    }
    println!("{:-<50}", "");
    println!(
        "Score: {}/{} ({:.1}%)",
        evaluation.score, evaluation.max_score, evaluation.percentage
    );
    if let Some(reasoning) = &evaluation.reasoning {
        println!("Reasoning: {}", reasoning);
    }

    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn examples_arg(args: &[&str]) -> Result<Option<usize>, clap::Error> {
        let cli = Cli::try_parse_from(args)?;
        match cli.command {
            Commands::Run { examples, .. } => Ok(examples),
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn test_examples_limit_must_be_positive() {
        assert!(examples_arg(&["healthbench", "run", "-n", "0"]).is_err());
        assert!(examples_arg(&["healthbench", "run", "--examples", "0"]).is_err());
        assert_eq!(examples_arg(&["healthbench", "run", "-n", "3"]).unwrap(), Some(3));
        assert_eq!(examples_arg(&["healthbench", "run"]).unwrap(), None);
    }
}
