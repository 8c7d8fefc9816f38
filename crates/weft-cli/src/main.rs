//! Weft command-line tools.
//!
//! Provides the `weft` binary for working with execution graphs stored as
//! JSON: `run` evaluates a unit, `inspect` validates it and summarizes its
//! functions, and `optimize` rewrites it with the optimization passes.
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weft_core::graph::ExecutionGraph;
use weft_eval::interpreter::trace::to_json_lines;
use weft_eval::{EvalError, Interpreter, InterpreterConfig};

/// Weft execution graph tools.
#[derive(Parser)]
#[command(name = "weft", about = "Weft execution graph tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Evaluate a unit and print its value.
    Run {
        /// Path to the JSON execution graph.
        file: PathBuf,

        /// Run the optimization passes before evaluating.
        #[arg(long)]
        optimize: bool,

        /// Print the execution trace as JSON lines to stderr.
        #[arg(long)]
        trace: bool,

        /// Maximum call depth, the unit body included.
        #[arg(long, default_value_t = 256)]
        max_depth: usize,
    },

    /// Validate a unit and summarize its functions as JSON.
    Inspect {
        /// Path to the JSON execution graph.
        file: PathBuf,
    },

    /// Optimize a unit and write the rewritten graph as JSON.
    Optimize {
        /// Path to the JSON execution graph.
        file: PathBuf,

        /// Output path (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            file,
            optimize,
            trace,
            max_depth,
        } => run(&file, optimize, trace, max_depth),
        Commands::Inspect { file } => inspect(&file),
        Commands::Optimize { file, output } => optimize(&file, output.as_deref()),
    };
    process::exit(exit_code);
}

/// Reads and parses a unit; on failure prints the reason and returns the
/// exit code: 3 when the file cannot be read, 2 when it is not a valid
/// execution graph.
fn read_graph(path: &Path) -> Result<ExecutionGraph, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    tracing::debug!(file = %path.display(), bytes = text.len(), "read execution graph");
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: '{}' is not an execution graph: {}", path.display(), e);
        2
    })
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = uncaught exception or recursion
/// limit, 2 = malformed graph, 3 = I/O error.
fn run(path: &Path, optimize: bool, trace: bool, max_depth: usize) -> i32 {
    let graph = match read_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };
    let mut interp = Interpreter::new(InterpreterConfig {
        trace_enabled: trace,
        max_call_depth: max_depth,
        optimize,
    });
    let result = interp.execute(graph);

    for line in interp.output() {
        println!("{line}");
    }
    if trace {
        match to_json_lines(interp.trace()) {
            Ok(lines) => eprint!("{lines}"),
            Err(e) => eprintln!("Error: failed to serialize trace: {e}"),
        }
    }

    match result {
        Ok(value) => {
            if !value.is_none() {
                println!("{value}");
            }
            0
        }
        Err(EvalError::Construction(errors)) => {
            eprintln!("Malformed execution graph with {} error(s):", errors.len());
            for err in &errors {
                eprintln!("  - {}", err);
            }
            2
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

/// Execute the inspect subcommand. Exit codes follow [`run`].
fn inspect(path: &Path) -> i32 {
    let graph = match read_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };
    let errors: Vec<String> = match graph.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };
    let functions: Vec<serde_json::Value> = graph
        .functions()
        .map(|def| {
            serde_json::json!({
                "id": def.id,
                "name": def.name,
                "params": def.params,
                "parent": def.parent,
                "nodes": graph.function_nodes(def.id).len(),
                "free_variables": graph.free_variables(def.id),
            })
        })
        .collect();
    let summary = serde_json::json!({
        "name": graph.name(),
        "nodes": graph.node_count(),
        "edges": graph.edge_count(),
        "functions": functions,
        "live_functions": weft_eval::optimize::live_functions(&graph).len(),
        "errors": errors,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).unwrap_or_else(|e| {
            format!("{{\"error\": \"failed to serialize summary: {}\"}}", e)
        })
    );
    if errors.is_empty() {
        0
    } else {
        2
    }
}

/// Execute the optimize subcommand. The report goes to stderr so the graph
/// can be piped.
fn optimize(path: &Path, output: Option<&Path>) -> i32 {
    let mut graph = match read_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };
    if let Err(errors) = graph.validate() {
        eprintln!("Malformed execution graph with {} error(s):", errors.len());
        for err in &errors {
            eprintln!("  - {}", err);
        }
        return 2;
    }
    let report = weft_eval::optimize(&mut graph);
    match serde_json::to_string(&report) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize report: {e}"),
    }

    let json = match serde_json::to_string_pretty(&graph) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize graph: {e}");
            return 3;
        }
    };
    match output {
        Some(out) => match fs::write(out, json) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: failed to write '{}': {}", out.display(), e);
                3
            }
        },
        None => {
            println!("{json}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::build::Builder;

    #[test]
    fn read_graph_exit_codes() {
        let temp_dir = tempfile::tempdir().unwrap();

        let missing = temp_dir.path().join("missing.json");
        assert_eq!(read_graph(&missing).unwrap_err(), 3);

        let garbage = temp_dir.path().join("garbage.json");
        fs::write(&garbage, "{ not json").unwrap();
        assert_eq!(read_graph(&garbage).unwrap_err(), 2);
        assert_eq!(run(&garbage, false, false, 256), 2);

        let mut unit = ExecutionGraph::new("ok");
        let mut b = Builder::main(&mut unit);
        let one = b.lit(1);
        b.finish(one).unwrap();
        let valid = temp_dir.path().join("valid.json");
        fs::write(&valid, serde_json::to_string(&unit).unwrap()).unwrap();
        assert_eq!(read_graph(&valid).unwrap().name(), "ok");
        assert_eq!(run(&valid, false, false, 256), 0);
    }
}
