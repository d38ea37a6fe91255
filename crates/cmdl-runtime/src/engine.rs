//! The execution engine: a program counter walking a built [`Program`].
//!
//! Each instruction handler returns a [`ControlSignal`] telling the run loop
//! where to go next. Loop bookkeeping lives in an explicit frame stack that is
//! keyed by the index of the loop's `LoopStart`.

use std::time::Duration;

use cmdl_builder::{Instruction, Op, Program};
use cmdl_parser::ast::LoopBound;
use tracing::{debug, trace};

use crate::console::{Console, TermColor};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::eval::{eval_condition, eval_expr, eval_number, lookup, render_text};
use crate::value::{Environment, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    JumpTo(usize),
    Halt,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Abort with `StepLimitExceeded` after this many instructions.
    pub max_steps: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    /// Index of the `LoopStart` that pushed this frame.
    pub start: usize,
    /// Iterations left, including the current one. `None` for `loop:`.
    pub remaining: Option<i64>,
}

pub struct Engine<'p, C> {
    program: &'p Program,
    console: C,
    config: EngineConfig,
    ip: usize,
    loops: Vec<LoopFrame>,
    steps: u64,
}

impl<'p, C: Console> Engine<'p, C> {
    pub fn new(program: &'p Program, console: C) -> Self {
        Self {
            program,
            console,
            config: EngineConfig::default(),
            ip: 0,
            loops: Vec::new(),
            steps: 0,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn loop_frames(&self) -> &[LoopFrame] {
        &self.loops
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Run until the program counter passes the last instruction, `exit`
    /// executes, or an error occurs.
    #[tracing::instrument(level = "debug", skip_all, fields(instructions = self.program.len()))]
    pub fn run(&mut self, env: &mut Environment) -> Result<(), RuntimeError> {
        while self.ip < self.program.len() {
            if self.step(env)? == ControlSignal::Halt {
                break;
            }
        }
        debug!(steps = self.steps, "run finished");
        Ok(())
    }

    /// Execute the instruction at the program counter and move the counter.
    pub fn step(&mut self, env: &mut Environment) -> Result<ControlSignal, RuntimeError> {
        let program = self.program;
        let index = self.ip;
        let Some(instr) = program.get(index) else {
            return Ok(ControlSignal::Halt);
        };

        if let Some(limit) = self.config.max_steps {
            if self.steps >= limit {
                return Err(RuntimeError::at(
                    RuntimeErrorKind::StepLimitExceeded(limit),
                    instr,
                ));
            }
        }
        self.steps += 1;
        trace!(ip = index, line = instr.line, op = instr.op.name(), "step");

        let signal = self.execute(index, instr, env)?;
        self.ip = match signal {
            ControlSignal::Continue => index + 1,
            ControlSignal::JumpTo(target) => target,
            ControlSignal::Halt => program.len(),
        };
        Ok(signal)
    }

    fn execute(
        &mut self,
        index: usize,
        instr: &'p Instruction,
        env: &mut Environment,
    ) -> Result<ControlSignal, RuntimeError> {
        let at = |kind: RuntimeErrorKind| RuntimeError::at(kind, instr);

        match &instr.op {
            Op::Text { parts } => {
                let line = render_text(parts, env).map_err(at)?;
                self.console
                    .write_line(&line)
                    .map_err(|e| at(e.into()))?;
            }
            Op::Echo { text } => {
                self.console.write_line(text).map_err(|e| at(e.into()))?;
            }
            Op::Clear => {
                self.console.clear_screen().map_err(|e| at(e.into()))?;
            }
            Op::Set { name, value } => {
                let value = eval_expr(value, env).map_err(at)?;
                env.set(name.as_str(), value);
            }
            Op::Math { name, expr } => {
                if let Value::Text(_) = lookup(env, name).map_err(at)? {
                    return Err(at(RuntimeErrorKind::TypeMismatch(format!(
                        "`{name}` holds text, `math` needs a number"
                    ))));
                }
                let n = eval_number(expr, env).map_err(at)?;
                env.set(name.as_str(), n);
            }
            Op::LoopStart { bound, block_end } => {
                return self
                    .enter_loop(index, bound.as_ref(), *block_end, env)
                    .map_err(at);
            }
            Op::LoopEnd { start } => return Ok(self.end_loop(*start)),
            Op::IfStart { .. } => return self.select_branch(index, env),
            // Falling out of the previous branch's body skips the rest of the chain.
            Op::ElifStart { chain_end, .. } | Op::ElseStart { chain_end, .. } => {
                return Ok(ControlSignal::JumpTo(*chain_end));
            }
            Op::Label { .. } => {}
            Op::Goto { target } => {
                // Built programs have every target in the label table.
                let to = self
                    .program
                    .label(target)
                    .ok_or_else(|| at(RuntimeErrorKind::UnresolvedGoto(target.clone())))?;
                debug!(label = %target, from = index, to, "goto");
                return Ok(ControlSignal::JumpTo(to));
            }
            Op::Pause { duration: None } => {
                // End of input just means nobody is there to press Enter.
                self.console.read_line().map_err(|e| at(e.into()))?;
            }
            Op::Pause {
                duration: Some(expr),
            } => {
                let secs = eval_number(expr, env).map_err(at)?.as_f64();
                self.console.sleep(seconds(secs));
            }
            Op::Input { name } => {
                let line = self.read_required(name).map_err(at)?;
                env.set(name.as_str(), line);
            }
            Op::InputNumber { name } => loop {
                let line = self.read_required(name).map_err(at)?;
                if let Some(n) = Number::parse(&line) {
                    env.set(name.as_str(), n);
                    break;
                }
                trace!(input = %line, "not a number, asking again");
            },
            Op::Color { color } => {
                self.console
                    .set_color(TermColor::from_spec(color))
                    .map_err(|e| at(e.into()))?;
            }
            Op::Exit => return Ok(ControlSignal::Halt),
        }
        Ok(ControlSignal::Continue)
    }

    fn read_required(&mut self, name: &str) -> Result<String, RuntimeErrorKind> {
        self.console
            .read_line()?
            .ok_or_else(|| RuntimeErrorKind::InputClosed(name.to_string()))
    }

    fn enter_loop(
        &mut self,
        index: usize,
        bound: Option<&LoopBound>,
        block_end: usize,
        env: &Environment,
    ) -> Result<ControlSignal, RuntimeErrorKind> {
        // A goto out of this loop can leave its frame, and frames of loops
        // nested in it, behind. Re-entering starts fresh.
        if let Some(pos) = self.loops.iter().rposition(|f| f.start == index) {
            self.loops.truncate(pos);
        }

        let remaining = match bound {
            None => None,
            Some(LoopBound::Count(n)) => Some(*n),
            Some(LoopBound::Variable(name)) => match lookup(env, name)? {
                Value::Number(n) => Some(n.truncate()),
                Value::Text(_) => {
                    return Err(RuntimeErrorKind::TypeMismatch(format!(
                        "loop bound `{name}` holds text"
                    )))
                }
            },
        };

        if matches!(remaining, Some(n) if n <= 0) {
            debug!(start = index, "loop skipped");
            return Ok(ControlSignal::JumpTo(block_end));
        }
        debug!(start = index, ?remaining, "loop entered");
        self.loops.push(LoopFrame {
            start: index,
            remaining,
        });
        Ok(ControlSignal::Continue)
    }

    fn end_loop(&mut self, start: usize) -> ControlSignal {
        let frame = self.loops.iter().rposition(|f| f.start == start);
        if let Some(pos) = frame {
            self.loops.truncate(pos + 1);
        }

        let unbounded = matches!(
            self.program.get(start).map(|i| &i.op),
            Some(Op::LoopStart { bound: None, .. })
        );
        if unbounded {
            return ControlSignal::JumpTo(start + 1);
        }

        // No frame: the body was entered by a goto, so there is nothing to count.
        let Some(frame) = frame.and_then(|_| self.loops.last_mut()) else {
            debug!(start, "loop end without a frame, leaving loop");
            return ControlSignal::Continue;
        };
        match frame.remaining {
            Some(n) if n > 1 => {
                frame.remaining = Some(n - 1);
                ControlSignal::JumpTo(start + 1)
            }
            Some(_) => {
                self.loops.pop();
                debug!(start, "loop exited");
                ControlSignal::Continue
            }
            None => ControlSignal::JumpTo(start + 1),
        }
    }

    /// Evaluate an `if`/`elif` chain and jump into the first branch that holds.
    fn select_branch(
        &mut self,
        index: usize,
        env: &Environment,
    ) -> Result<ControlSignal, RuntimeError> {
        let program = self.program;
        let mut cursor = index;
        while let Some(instr) = program.get(cursor) {
            match &instr.op {
                Op::IfStart {
                    condition,
                    block_end,
                    next_branch,
                    ..
                }
                | Op::ElifStart {
                    condition,
                    block_end,
                    next_branch,
                    ..
                } => {
                    let holds = eval_condition(condition, env)
                        .map_err(|kind| RuntimeError::at(kind, instr))?;
                    if holds {
                        return Ok(ControlSignal::JumpTo(cursor + 1));
                    }
                    match next_branch {
                        Some(next) => cursor = *next,
                        None => return Ok(ControlSignal::JumpTo(*block_end)),
                    }
                }
                Op::ElseStart { .. } => return Ok(ControlSignal::JumpTo(cursor + 1)),
                _ => return Ok(ControlSignal::JumpTo(cursor)),
            }
        }
        Ok(ControlSignal::JumpTo(cursor))
    }
}

fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use cmdl_builder::build_source;

    fn run_with(
        src: &str,
        input: &[&str],
        config: EngineConfig,
    ) -> (Result<(), RuntimeError>, Environment, ScriptedConsole) {
        let program = build_source(src).unwrap();
        let mut env = Environment::new();
        let mut engine =
            Engine::new(&program, ScriptedConsole::new(input.iter().copied())).with_config(config);
        let result = engine.run(&mut env);
        (result, env, engine.into_console())
    }

    fn run(src: &str, input: &[&str]) -> (Result<(), RuntimeError>, Environment, ScriptedConsole) {
        run_with(src, input, EngineConfig::default())
    }

    #[test]
    fn test_set_math_text() {
        let (result, env, console) = run("set x = 5\nmath x = x + 2\ntext \"x=\", x\n", &[]);
        result.unwrap();
        assert_eq!(console.output(), ["x=7"]);
        assert_eq!(env.get("x"), Some(&Value::from(7)));
    }

    #[test]
    fn test_counted_loop() {
        let (result, _, console) = run("loop(3):\n    text \"hi\"\n", &[]);
        result.unwrap();
        assert_eq!(console.output(), ["hi", "hi", "hi"]);
    }

    #[test]
    fn test_zero_and_negative_loops_skip_body() {
        let (result, _, console) = run(
            "loop(0):\n    text \"a\"\nset n = -2\nloop(n):\n    text \"b\"\ntext \"done\"\n",
            &[],
        );
        result.unwrap();
        assert_eq!(console.output(), ["done"]);
    }

    #[test]
    fn test_loop_bound_truncates_float() {
        let (result, _, console) = run("set n = 5 / 2\nloop(n):\n    text \"x\"\n", &[]);
        result.unwrap();
        assert_eq!(console.output().len(), 2);
    }

    #[test]
    fn test_loop_bound_text_is_type_mismatch() {
        let (result, _, _) = run("set n = \"3\"\nloop(n):\n    text \"x\"\n", &[]);
        let err = result.unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch(_)));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_nested_loops_leave_no_frames() {
        let src = "\
set n = 0
loop(2):
    loop(3):
        math n = n + 1
text n
";
        let program = build_source(src).unwrap();
        let mut env = Environment::new();
        let mut engine = Engine::new(&program, ScriptedConsole::default());
        engine.run(&mut env).unwrap();
        assert!(engine.loop_frames().is_empty());
        assert_eq!(engine.console().output(), ["6"]);
    }

    #[test]
    fn test_only_first_true_branch_runs() {
        let src = "\
set x = 5
if x > 1:
    text \"a\"
elif x > 2:
    text \"b\"
else:
    text \"c\"
text \"end\"
";
        let (result, _, console) = run(src, &[]);
        result.unwrap();
        assert_eq!(console.output(), ["a", "end"]);
    }

    #[test]
    fn test_elif_and_else_selection() {
        let src = "\
if x = 1:
    text \"one\"
elif x = 2:
    text \"two\"
else:
    text \"other\"
";
        for (value, expected) in [("1", "one"), ("2", "two"), ("9", "other")] {
            let src = format!("set x = {value}\n{src}");
            let (result, _, console) = run(&src, &[]);
            result.unwrap();
            assert_eq!(console.output(), [expected]);
        }
    }

    #[test]
    fn test_later_conditions_not_evaluated_after_a_match() {
        let src = "\
set x = 1
if x = 1:
    text \"a\"
elif missing = 2:
    text \"b\"
";
        let (result, _, console) = run(src, &[]);
        assert!(result.is_ok());
        assert_eq!(console.output(), ["a"]);
    }

    #[test]
    fn test_error_in_elif_condition_points_at_elif() {
        let src = "set s = \"a\"\nif s = \"b\":\n    text \"b\"\nelif s < 3:\n    text \"c\"\n";
        let (result, _, _) = run(src, &[]);
        let err = result.unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch(_)));
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_goto_restarts_loop_with_fresh_frame() {
        let src = "\
set n = 0
top():
loop(3):
    math n = n + 1
    if n = 2:
        goto top()
text \"n=\", n
";
        let program = build_source(src).unwrap();
        let mut env = Environment::new();
        let mut engine = Engine::new(&program, ScriptedConsole::default());
        engine.run(&mut env).unwrap();
        assert_eq!(engine.console().output(), ["n=5"]);
        assert!(engine.loop_frames().is_empty());
    }

    #[test]
    fn test_goto_into_loop_body_runs_it_once() {
        let src = "\
goto inside()
loop(3):
    inside():
    text \"body\"
text \"after\"
";
        let (result, _, console) = run(src, &[]);
        result.unwrap();
        assert_eq!(console.output(), ["body", "after"]);
    }

    #[test]
    fn test_unbounded_loop_left_by_goto() {
        let src = "\
set i = 0
loop:
    math i = i + 1
    if i = 3:
        goto done()
    text \"i=\", i
done():
text \"end\"
";
        let (result, _, console) = run(src, &[]);
        result.unwrap();
        assert_eq!(console.output(), ["i=1", "i=2", "end"]);
    }

    #[test]
    fn test_loop_variable_reread_on_each_entry() {
        let src = "\
set n = 2
set pass = 0
again():
loop(n):
    text \"tick\"
math pass = pass + 1
set n = 3
if pass < 2:
    goto again()
";
        let (result, _, console) = run(src, &[]);
        result.unwrap();
        assert_eq!(console.output().len(), 5);
    }

    #[test]
    fn test_exit_halts() {
        let (result, _, console) = run("text \"a\"\nexit\ntext \"b\"\n", &[]);
        result.unwrap();
        assert_eq!(console.output(), ["a"]);
    }

    #[test]
    fn test_step_limit() {
        let (result, _, _) = run_with(
            "loop:\n    clear()\n",
            &[],
            EngineConfig {
                max_steps: Some(10),
            },
        );
        assert_eq!(
            result.unwrap_err().kind,
            RuntimeErrorKind::StepLimitExceeded(10)
        );
    }

    #[test]
    fn test_input_number_retries() {
        let (result, env, console) = run("input_number n\n", &["abc", "4.5"]);
        result.unwrap();
        assert_eq!(env.get("n"), Some(&Value::from(4.5)));
        assert_eq!(console.reads(), 2);
    }

    #[test]
    fn test_input_stores_text_verbatim() {
        let (result, env, _) = run("input name\n", &["  42 "]);
        result.unwrap();
        assert_eq!(env.get("name"), Some(&Value::from("  42 ")));
    }

    #[test]
    fn test_input_at_end_of_input() {
        let (result, _, _) = run("input name\n", &[]);
        assert_eq!(
            result.unwrap_err().kind,
            RuntimeErrorKind::InputClosed("name".into())
        );
        let (result, _, _) = run("input_number n\n", &["nope"]);
        assert_eq!(
            result.unwrap_err().kind,
            RuntimeErrorKind::InputClosed("n".into())
        );
    }

    #[test]
    fn test_pause_variants() {
        let (result, _, console) = run("pause()\npause(1.5)\npause(-3)\npause()\ntext \"ok\"\n", &["\n"]);
        result.unwrap();
        assert_eq!(
            console.sleeps(),
            [Duration::from_millis(1500), Duration::ZERO]
        );
        assert_eq!(console.reads(), 2);
        assert_eq!(console.output(), ["ok"]);
    }

    #[test]
    fn test_math_errors() {
        let (result, _, _) = run("math y = 1\n", &[]);
        assert_eq!(
            result.unwrap_err().kind,
            RuntimeErrorKind::UndefinedVariable("y".into())
        );
        let (result, _, _) = run("set s = \"a\"\nmath s = 1\n", &[]);
        assert!(matches!(
            result.unwrap_err().kind,
            RuntimeErrorKind::TypeMismatch(_)
        ));
        let (result, _, _) = run("set s = 1\nmath s = \"a\"\n", &[]);
        assert!(matches!(
            result.unwrap_err().kind,
            RuntimeErrorKind::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_color_and_clear() {
        let (result, _, console) = run("color red\nclear()\ncolor rgb(1, 2, 3)\ncolor nope\n", &[]);
        result.unwrap();
        assert_eq!(
            console.colors(),
            [TermColor::Ansi(31), TermColor::Rgb(1, 2, 3), TermColor::Reset]
        );
        assert_eq!(console.clears(), 1);
    }

    #[test]
    fn test_echo_prints_raw_text() {
        let (result, env, console) = run("set x = 1\necho x + 1 \"unquoted\necho(  padded )\n", &[]);
        result.unwrap();
        assert_eq!(console.output(), ["x + 1 \"unquoted", "  padded "]);
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_goto_resolves_through_label_table() {
        let (result, _, console) = run("goto end()
text \"skipped\"
end():
text \"done\"
", &[]);
        result.unwrap();
        assert_eq!(console.output(), ["done"]);
    }

    #[test]
    fn test_error_location() {
        let (result, _, console) = run("text \"a\"\n\ntext y\n", &[]);
        let err = result.unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable("y".into()));
        assert_eq!(err.line, 3);
        assert_eq!(err.to_string(), "line 3: undefined variable: y");
        assert_eq!(console.output(), ["a"]);
    }
}
