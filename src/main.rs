use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use jsonql::{JsonCompiler, JsonTextData};

/// Runs a JsonQL query against JSON documents.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JsonQL expression, e.g. "Sum(Orders.Where(o => o.Paid).Total)"
    expression: String,
    /// JSON document; repeat to add parents (first is the closest document)
    #[arg(long)]
    document: Vec<PathBuf>,
    /// Log compilation details
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Read documents, farthest ancestor first, so each one can take the previous as parent.
    let mut data: Option<JsonTextData> = None;
    for path in args.document.iter().rev() {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Cannot read {}: {e}", path.display());
                std::process::exit(1);
            }
        };
        let document = JsonTextData::new(path.display().to_string(), text);
        data = Some(match data.take() {
            Some(parent) => document.with_parent(parent),
            None => document,
        });
    }

    let compiler = JsonCompiler::new();
    let result = match &data {
        Some(data) => compiler.query_text(&args.expression, data),
        None => compiler.query(&args.expression, &[]),
    };

    match serde_json::to_string_pretty(&result.to_json()) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Cannot print result: {e}"),
    }
    for error in &result.errors {
        eprintln!("{error}");
    }
    if !result.errors.is_empty() {
        std::process::exit(1);
    }
}
