//! States Language CLI
//!
//! Command-line tool for working with Amazon States Language documents:
//! validate a state machine, print it in canonical form, evaluate intrinsic
//! function expressions and run a Choice state's rules against an input.

use std::fs;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dotenv::dotenv;
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use states_language::{
    AslConfig, IntrinsicFunctionRegistry, StateMachine, StateMachineDefinition, Validator,
};

#[derive(Parser)]
#[command(name = "asl")]
#[command(about = "States Language CLI - Validate and inspect ASL state machines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "ASL_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a state machine and list every problem
    Validate {
        /// Path to the ASL JSON document
        file: String,
    },

    /// Validate a state machine and print it as canonical JSON
    Format {
        /// Path to the ASL JSON document
        file: String,
    },

    /// Evaluate an intrinsic function expression
    Intrinsic {
        /// Expression such as "States.Format('hi {}', $.name)"
        expression: String,

        /// Input document as JSON
        #[arg(long, default_value = "{}")]
        input: String,

        /// Context document as JSON, addressed with `$$`
        #[arg(long, default_value = "{}")]
        context: String,
    },

    /// Pick the next state of a Choice state for an input
    Choose {
        /// Path to the ASL JSON document
        file: String,

        /// Name of the Choice state
        state: String,

        /// Input document as JSON
        #[arg(long)]
        input: String,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    // .env is optional
    dotenv().ok();

    let cli = Cli::parse();
    let config = AslConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    debug!("Loaded configuration: {:?}", config);

    match cli.command {
        Commands::Validate { file } => validate_file(&file, &config),
        Commands::Format { file } => {
            let machine = load_machine(&file, &config)?;
            println!("{}", machine.to_json_pretty()?);
            Ok(())
        }
        Commands::Intrinsic {
            expression,
            input,
            context,
        } => {
            let input = parse_document("--input", &input)?;
            let context = parse_document("--context", &context)?;
            let registry = IntrinsicFunctionRegistry::with_config(config.intrinsics.clone());
            let value = registry.evaluate(&expression, &input, &context)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Commands::Choose { file, state, input } => {
            let machine = load_machine(&file, &config)?;
            let input = parse_document("--input", &input)?;
            match machine.choose(&state, &input)? {
                Some(next) => println!("{}", next.green()),
                None => {
                    warn!("No choice rule matched in '{}' and it has no Default", state);
                    println!("{}", "States.NoChoiceMatched".yellow());
                }
            }
            Ok(())
        }
    }
}

fn validate_file(file: &str, config: &AslConfig) -> Result<()> {
    let definition = read_definition(file)?;
    match Validator::new(config.validation.clone()).validate(&definition) {
        Ok(()) => {
            info!("Validated {}", file);
            println!("{} {}", "✅".green(), format!("{} is valid", file).green());
            Ok(())
        }
        Err(exception) => {
            println!(
                "{}",
                format!("{} has {} problem(s):", file, exception.problems().len())
                    .red()
                    .bold()
            );
            for problem in exception.problems() {
                println!("  {} {}", problem.context.yellow(), problem.message);
            }
            anyhow::bail!("{} is not valid", file)
        }
    }
}

fn load_machine(file: &str, config: &AslConfig) -> Result<StateMachine> {
    let definition = read_definition(file)?;
    StateMachine::from_definition_with(definition, &config.validation)
        .with_context(|| format!("{} is not valid", file))
}

fn read_definition(file: &str) -> Result<StateMachineDefinition> {
    let text = fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?;
    StateMachineDefinition::from_json_str(&text).with_context(|| format!("failed to parse {}", file))
}

fn parse_document(flag: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{} is not valid JSON", flag))
}
