use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cmdl_builder::{build_source, Op};
use cmdl_common::SourceDb;
use cmdl_runtime::{Engine, EngineConfig, Environment, TermColor, Terminal};

const DEMO: &str = r#"# demo script
text "Starting demo..."
text "This line should appear."

loop(3):
    text "Inside loop, counting"

set x = 5
math x = x + 2
text "x is now: ", x

if x = 7:
    text "If statement works!"
else:
    text "If failed!"

color cyan
text "Pausing 1.5 seconds..."
pause(1.5)
color reset

text "Clearing screen in 1 second..."
pause(1)
clear
text "Screen was cleared!"
text "Demo finished."
"#;

#[derive(Parser)]
#[command(name = "cmdl")]
#[command(about = "Interpreter for indentation-scoped cmdl scripts")]
#[command(version)]
struct Cli {
    /// Script to run (the demo runs when omitted)
    source: Option<PathBuf>,

    /// Check the script for errors without running it
    #[arg(long)]
    check: bool,

    /// Wait for Enter after the script finishes
    #[arg(long)]
    hold: bool,

    /// Run the built-in demo script
    #[arg(long)]
    demo: bool,

    /// Stop with an error after this many executed instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,
}

fn main() -> Result<()> {
    // Logs go to stderr so they never mix with script output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let (name, source) = match &cli.source {
        Some(path) if !cli.demo => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            (path.display().to_string(), source)
        }
        _ => ("<demo>".to_string(), DEMO.to_string()),
    };

    let mut files = SourceDb::new();
    let file_id = files.add(name.clone(), source.clone());

    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();

    let program = match build_source(&source) {
        Ok(p) => p,
        Err(e) => {
            term::emit(&mut writer.lock(), &config, &files, &e.to_diagnostic(file_id))?;
            std::process::exit(1);
        }
    };

    tracing::debug!(script = %name, instructions = program.len(), "script built");

    if cli.check {
        println!("OK: {name} is valid");
        return Ok(());
    }

    let mut env = Environment::new();
    let result = Engine::new(&program, Terminal::stdio())
        .with_config(EngineConfig {
            max_steps: cli.max_steps,
        })
        .run(&mut env);

    let colored = program
        .instructions()
        .iter()
        .any(|i| matches!(i.op, Op::Color { .. }));
    if colored {
        print!("{}", TermColor::Reset.escape());
        io::stdout().flush()?;
    }

    if let Err(e) = result {
        term::emit(&mut writer.lock(), &config, &files, &e.to_diagnostic(file_id))?;
        std::process::exit(1);
    }

    if cli.hold {
        print!("\nScript finished. Press Enter to exit...");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
    }

    Ok(())
}
