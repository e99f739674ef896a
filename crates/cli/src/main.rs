use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use slate_core::{serialize, SlateError};
use slate_eval::{DocumentEval, Interp};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Slate literate-calculation toolchain.
#[derive(Parser)]
#[command(name = "slate", version, about = "Slate literate-calculation toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a Slate document and print its results
    Eval {
        /// Path to the .md source file
        file: PathBuf,
    },

    /// Evaluate one expression given on the command line
    Expr {
        /// The expression to evaluate
        expr: String,
    },

    /// Print the token stream for a source file
    Tokens {
        /// Path to the .md source file
        file: PathBuf,
    },

    /// Print the parsed AST for a source file
    Ast {
        /// Path to the .md source file
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Eval { file } => cmd_eval(&file, cli.output).await,
        Commands::Expr { expr } => cmd_expr(&expr, cli.output).await,
        Commands::Tokens { file } => cmd_tokens(&file, cli.output),
        Commands::Ast { file } => cmd_ast(&file, cli.output),
    }
}

fn read_source(file: &Path) -> String {
    match fs::read_to_string(file) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", file.display(), e);
            process::exit(1);
        }
    }
}

async fn cmd_eval(file: &Path, output: OutputFormat) {
    let source = read_source(file);
    let interp = Interp::new();
    let DocumentEval { results, error } = interp.eval_document(&source).await;
    match output {
        OutputFormat::Text => {
            for r in &results {
                println!("{}", serialize(r));
            }
            if let Some(e) = error {
                fail(&e, output);
            }
        }
        OutputFormat::Json => {
            let body = json!({
                "results": results,
                "error": error,
            });
            print_json(&body);
            if error_in(&body) {
                process::exit(1);
            }
        }
    }
}

async fn cmd_expr(expr: &str, output: OutputFormat) {
    let interp = Interp::new();
    match interp.eval_expr(expr).await {
        Ok(v) => match output {
            OutputFormat::Text => println!("{}", serialize(&v)),
            OutputFormat::Json => print_json(&json!({ "result": v })),
        },
        Err(e) => fail(&e, output),
    }
}

fn cmd_tokens(file: &Path, output: OutputFormat) {
    let source = read_source(file);
    let interp = Interp::new();
    match interp.tokens(&source) {
        Ok(tokens) => match output {
            OutputFormat::Text => {
                for t in &tokens {
                    println!("{}:{}\t{:?}", t.line, t.col, t.kind);
                }
            }
            OutputFormat::Json => print_json(&json!({ "tokens": tokens })),
        },
        Err(e) => fail(&e, output),
    }
}

fn cmd_ast(file: &Path, output: OutputFormat) {
    let source = read_source(file);
    let interp = Interp::new();
    match interp.ast(&source, true) {
        Ok(stmts) => match output {
            OutputFormat::Text => {
                for s in &stmts {
                    println!("{}", serialize(s));
                }
            }
            OutputFormat::Json => print_json(&json!({ "ast": stmts })),
        },
        Err(e) => fail(&e, output),
    }
}

fn fail(e: &SlateError, output: OutputFormat) -> ! {
    match output {
        OutputFormat::Text => eprintln!("error: {}", e),
        OutputFormat::Json => print_json(&json!({ "error": e })),
    }
    process::exit(1);
}

fn print_json(body: &serde_json::Value) {
    match serde_json::to_string_pretty(body) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn error_in(body: &serde_json::Value) -> bool {
    body.get("error").map(|e| !e.is_null()).unwrap_or(false)
}
