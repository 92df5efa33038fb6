use clap::Parser;
use serde_json::Value;

use json_batch::{JsonBuilder, Registry};

/// Evaluate a batch template value against a context document. The context
/// is a JSON document shaped like the engine's runtime context
/// (`original`/`requests`/`responses`/`vars`), which makes this handy for
/// dry-running the expressions of a template without any transport.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Context document (JSON string). Pipe a file using shell quoting.
    context: String,
    /// Template value: a JSON value whose string leaves are expressions,
    /// or a bare expression like "int __sum(\"$.responses[0].body[*].v\")".
    template: String,
    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let context: Value = match serde_json::from_str(&args.context) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid context JSON: {e}");
            std::process::exit(1);
        }
    };
    // A template argument that is not valid JSON is taken as one bare
    // expression leaf.
    let template: Value = serde_json::from_str(&args.template)
        .unwrap_or_else(|_| Value::String(args.template.clone()));

    let builder = JsonBuilder::new(Registry::with_builtins());
    match builder.build(&template, &context) {
        Ok(out) => {
            let rendered = if args.pretty {
                serde_json::to_string_pretty(&out)
            } else {
                serde_json::to_string(&out)
            };
            match rendered {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("Cannot render result: {e}");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
