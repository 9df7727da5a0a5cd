//! Runner facade: assembles a raw line and dispatches it to either the
//! built-in table or the execution engine, then reports what happened.

use crate::assembler::{self, Pipeline};
use crate::builtins::{self, BuiltinOutcome};
use crate::environment::Environment;
use crate::errors::ShellError;
use crate::executor;
use crate::queue::JobQueue;

/// What the prompt loop should do after running one line.
pub enum Outcome {
    Success,
    Error(ShellError),
    ExitShell,
}

/// Assemble and run one command line.
pub fn do_command(line: &str, env: &mut Environment, queue: &mut JobQueue) -> Outcome {
    let pipeline = match assembler::assemble(line) {
        Ok(pipeline) => pipeline,
        Err(e) => return Outcome::Error(e),
    };

    if builtins::is_builtin(&pipeline[0].cmd_name) {
        return run_builtin(&pipeline, env, queue);
    }

    match executor::execute_pipeline(&pipeline, env) {
        Ok(_code) => Outcome::Success,
        Err(e) => Outcome::Error(e),
    }
}

fn run_builtin(pipeline: &Pipeline, env: &mut Environment, queue: &mut JobQueue) -> Outcome {
    match builtins::execute(&pipeline[0], env, queue) {
        Ok(BuiltinOutcome::Success) => Outcome::Success,
        Ok(BuiltinOutcome::ExitShell) => Outcome::ExitShell,
        Ok(BuiltinOutcome::Error) => Outcome::Error(ShellError::BuiltinArgCount {
            name: pipeline[0].cmd_name.clone(),
        }),
        Err(e) => Outcome::Error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_env() -> Environment {
        let mut env = Environment::default();
        env.set(
            "PATH",
            &std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        env
    }

    #[test]
    fn setenv_then_getenv_scenario() {
        let mut env = test_env();
        let mut queue = JobQueue::new();
        assert!(matches!(
            do_command("setenv FOO bar", &mut env, &mut queue),
            Outcome::Success
        ));
        assert_eq!(env.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn malformed_line_is_reported_before_dispatch() {
        let mut env = test_env();
        let mut queue = JobQueue::new();
        let outcome = do_command(">out", &mut env, &mut queue);
        assert!(matches!(
            outcome,
            Outcome::Error(ShellError::MalformedCmdline)
        ));
    }

    #[test]
    fn exit_builtin_produces_exit_shell_outcome() {
        let mut env = test_env();
        let mut queue = JobQueue::new();
        assert!(matches!(
            do_command("exit", &mut env, &mut queue),
            Outcome::ExitShell
        ));
    }

    #[test]
    fn builtin_dispatch_is_keyed_on_name_alone_not_pipeline_length() {
        // `queue sleep 1 | wc`: dispatch must still route to the `queue`
        // builtin (which then rejects the pipe on its own descriptor),
        // rather than falling through to the executor and trying to
        // `execvpe("queue", …)` as an external program.
        let mut env = test_env();
        let mut queue = JobQueue::new();
        let outcome = do_command("queue sleep 1 | wc", &mut env, &mut queue);
        assert!(matches!(outcome, Outcome::Error(ShellError::QueueReject)));
    }

    #[test]
    fn external_pipeline_runs_through_the_executor() {
        let mut env = test_env();
        let mut queue = JobQueue::new();
        assert!(matches!(
            do_command("true", &mut env, &mut queue),
            Outcome::Success
        ));
    }
}
