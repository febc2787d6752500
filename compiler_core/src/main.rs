//! `exprc`: evaluate one expression from the command line.
//!
//! ```bash
//! exprc "2 + 3 * 4"
//! exprc --var price=3 --var quantity=4 "#price * #quantity"
//! exprc --mode mixed --threshold 2 --repeat 5 --verbose "#n * #n" --var n=7
//! ```

use std::process::ExitCode;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use compiler_core::{CompilerConfiguration, CompilerMode, ExpressionParser};
use interpreter::error_formatter::ErrorFormatter;
use interpreter::{ContextBuilder, EvaluationContext, Value};
use tracing::{debug, info};

const ORIGIN: &str = "<expression>";

#[derive(Parser)]
#[command(name = "exprc", version = env!("CARGO_PKG_VERSION"), about = "Evaluate an expression")]
struct Cli {
    /// Expression to evaluate
    expression: String,

    /// Bind a variable, e.g. `--var limit=10`; the value is read as a literal expression
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// off, interpreted, immediate or mixed
    #[arg(long)]
    mode: Option<CompilerMode>,

    /// Interpreted evaluations before compiling in mixed mode
    #[arg(long)]
    threshold: Option<u32>,

    /// Evaluate this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Print the canonical form of the parsed expression
    #[arg(long)]
    ast: bool,

    /// Log compiler decisions and print evaluation statistics
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn configuration(cli: &Cli) -> CompilerConfiguration {
    let mode = match (cli.mode, cli.threshold) {
        (Some(CompilerMode::CompileAfterThreshold(_)) | None, Some(n)) => CompilerMode::CompileAfterThreshold(n),
        (Some(mode), _) => mode,
        (None, None) => return compiler_core::global_configuration(),
    };
    CompilerConfiguration::new(mode)
}

/// Evaluate a `--var` value as a context-free expression.
fn literal_value(text: &str) -> Result<Value> {
    let ast = frontend::parse(text).map_err(|e| anyhow!(ErrorFormatter::new(text, "--var").format_parse_error(&e)))?;
    interpreter::evaluate(&ast, &EvaluationContext::new(Value::Null))
        .map_err(|e| anyhow!(ErrorFormatter::new(text, "--var").format_evaluation_error(&e)))
}

fn build_context(vars: &[String]) -> Result<EvaluationContext> {
    let mut builder = ContextBuilder::new();
    for binding in vars {
        let Some((name, text)) = binding.split_once('=') else {
            bail!("variable binding '{binding}' is not of the form NAME=VALUE");
        };
        let value = literal_value(text).with_context(|| format!("invalid value for variable '{name}'"))?;
        debug!(name, %value, "variable bound");
        builder = builder.variable(name.trim(), value);
    }
    Ok(builder.build())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let formatter = ErrorFormatter::new(&cli.expression, ORIGIN);
    let parser = ExpressionParser::with_configuration(configuration(&cli));
    let expression = match parser.parse(&cli.expression) {
        Ok(expression) => expression,
        Err(error) => {
            eprintln!("{}", formatter.format_parse_error(&error));
            return Ok(ExitCode::FAILURE);
        }
    };
    if cli.ast {
        println!("{}", expression.to_canonical_string());
    }

    let context = build_context(&cli.vars)?;
    let mut last = Value::Null;
    for _ in 0..cli.repeat.max(1) {
        match expression.evaluate(&context) {
            Ok(value) => last = value,
            Err(error) => {
                eprintln!("{}", formatter.format_evaluation_error(&error));
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    println!("{last}");

    if cli.verbose > 0 {
        info!(stats = %expression.stats(), mode = %expression.configuration().mode, "done");
        if let Some(program) = expression.compiled_program() {
            eprintln!("{program}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
