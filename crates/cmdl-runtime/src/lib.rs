pub mod console;
pub mod engine;
pub mod error;
pub mod eval;
pub mod value;

pub use console::{Console, ScriptedConsole, TermColor, Terminal};
pub use engine::{ControlSignal, Engine, EngineConfig, LoopFrame};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use value::{Environment, Number, Value};

use cmdl_builder::{build_source, BuildError, Program};
use thiserror::Error;

/// Anything that can stop a script from source text to the end of its run.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Run a built program in a fresh environment and hand the environment back.
pub fn run_program<C: Console>(
    program: &Program,
    console: C,
    config: EngineConfig,
) -> Result<Environment, RuntimeError> {
    let mut env = Environment::new();
    Engine::new(program, console)
        .with_config(config)
        .run(&mut env)?;
    Ok(env)
}

/// Build and run `source`.
pub fn run_source<C: Console>(
    source: &str,
    console: C,
    config: EngineConfig,
) -> Result<Environment, ScriptError> {
    let program = build_source(source)?;
    Ok(run_program(&program, console, config)?)
}
