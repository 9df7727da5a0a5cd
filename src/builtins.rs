//! Built-in dispatcher: the handful of commands the runner never hands to
//! the execution engine, because they need to mutate the shell's own state
//! (environment, working directory, job queue) rather than run in a child.

use crate::assembler::{CommandDescriptor, StdinSource, StdoutSink};
use crate::environment::Environment;
use crate::errors::ShellError;
use crate::queue::JobQueue;

/// What a builtin did, for the runner to act on.
#[derive(Debug, PartialEq, Eq)]
pub enum BuiltinOutcome {
    Success,
    Error,
    ExitShell,
}

const NAMES: &[&str] = &[
    "setenv", "getenv", "unsetenv", "cd", "pwd", "exit", "queue", "status", "output", "cancel",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Dispatch a single command descriptor to the matching builtin.
pub fn execute(
    descriptor: &CommandDescriptor,
    env: &mut Environment,
    queue: &mut JobQueue,
) -> Result<BuiltinOutcome, ShellError> {
    let args = &descriptor.argv[1..];

    match descriptor.cmd_name.as_str() {
        "setenv" => setenv(args, env),
        "getenv" => getenv(args, env),
        "unsetenv" => unsetenv(args, env),
        "cd" => cd(args, env),
        "pwd" => pwd(args, env),
        "exit" => exit(args),
        "queue" => queue_cmd(descriptor, args, env, queue),
        "status" => status(args, queue),
        "output" => output(args, queue),
        "cancel" => cancel(args, queue),
        other => unreachable!("{other} is not a registered builtin"),
    }
}

fn setenv(args: &[String], env: &mut Environment) -> Result<BuiltinOutcome, ShellError> {
    if args.len() != 2 {
        return Err(ShellError::BuiltinArgCount {
            name: "setenv".to_string(),
        });
    }
    env.set(&args[0], &args[1]);
    Ok(BuiltinOutcome::Success)
}

fn getenv(args: &[String], env: &Environment) -> Result<BuiltinOutcome, ShellError> {
    match args.len() {
        0 => {
            env.print(&mut std::io::stdout()).ok();
            Ok(BuiltinOutcome::Success)
        }
        1 => match env.get(&args[0]) {
            Some(value) => {
                println!("{value}");
                Ok(BuiltinOutcome::Success)
            }
            None => Err(ShellError::UnknownVariable {
                name: args[0].clone(),
            }),
        },
        _ => Err(ShellError::BuiltinArgCount {
            name: "getenv".to_string(),
        }),
    }
}

fn unsetenv(args: &[String], env: &mut Environment) -> Result<BuiltinOutcome, ShellError> {
    if args.len() != 1 {
        return Err(ShellError::BuiltinArgCount {
            name: "unsetenv".to_string(),
        });
    }
    env.remove(&args[0]);
    Ok(BuiltinOutcome::Success)
}

/// `cd` with zero args goes to `$HOME`; with one, to that path (relative or
/// absolute — `PWD` is always resynced from the *actual* post-chdir working
/// directory rather than string-concatenated, so a relative target still
/// leaves `PWD` holding a correct absolute path).
fn cd(args: &[String], env: &mut Environment) -> Result<BuiltinOutcome, ShellError> {
    if args.len() > 1 {
        return Err(ShellError::BuiltinArgCount {
            name: "cd".to_string(),
        });
    }

    let target = match args.first() {
        Some(dir) => dir.clone(),
        None => env.get("HOME").cloned().ok_or(ShellError::NoHome)?,
    };

    std::env::set_current_dir(&target).map_err(|source| ShellError::BadInFile {
        path: target,
        source,
    })?;
    env.sync_pwd();
    Ok(BuiltinOutcome::Success)
}

fn pwd(args: &[String], env: &Environment) -> Result<BuiltinOutcome, ShellError> {
    if !args.is_empty() {
        return Err(ShellError::BuiltinArgCount {
            name: "pwd".to_string(),
        });
    }
    match env.get("PWD") {
        Some(pwd) => println!("{pwd}"),
        None => {
            if let Ok(cwd) = std::env::current_dir() {
                println!("{}", cwd.display());
            }
        }
    }
    Ok(BuiltinOutcome::Success)
}

fn exit(args: &[String]) -> Result<BuiltinOutcome, ShellError> {
    if !args.is_empty() {
        return Err(ShellError::BuiltinArgCount {
            name: "exit".to_string(),
        });
    }
    Ok(BuiltinOutcome::ExitShell)
}

/// `queue CMD ARG...`: wrap the trailing words as a bare, unredirected,
/// unpiped command descriptor and hand it to the background queue. The
/// *outer* `queue` invocation itself must not carry a pipe or file
/// redirection either — `queue echo hi > file` attaches `> file` to the
/// `queue` descriptor the assembler produced, not to any nested command, so
/// that has to be rejected here before `args` is even looked at. The queue
/// also rejects the wrapped command via `is_queue_eligible`, which checks
/// all four of `pipe_in`, `pipe_out`, `stdin_source`, and `stdout_sink` —
/// not a repeated check of the same field.
fn queue_cmd(
    descriptor: &CommandDescriptor,
    args: &[String],
    env: &Environment,
    queue: &mut JobQueue,
) -> Result<BuiltinOutcome, ShellError> {
    if !descriptor.is_queue_eligible() {
        return Err(ShellError::QueueReject);
    }
    if args.len() < 2 {
        return Err(ShellError::BuiltinArgCount {
            name: "queue".to_string(),
        });
    }
    let wrapped = CommandDescriptor {
        cmd_name: args[0].clone(),
        argv: args.to_vec(),
        pipe_in: false,
        pipe_out: false,
        stdin_source: StdinSource::Default,
        stdout_sink: StdoutSink::Default,
    };
    let job_id = queue.enqueue(wrapped, env)?;
    println!("[{job_id}] queued");
    Ok(BuiltinOutcome::Success)
}

fn status(args: &[String], queue: &JobQueue) -> Result<BuiltinOutcome, ShellError> {
    if !args.is_empty() {
        return Err(ShellError::BuiltinArgCount {
            name: "status".to_string(),
        });
    }
    queue.status(&mut std::io::stdout()).ok();
    Ok(BuiltinOutcome::Success)
}

fn output(args: &[String], queue: &mut JobQueue) -> Result<BuiltinOutcome, ShellError> {
    if args.len() != 1 {
        return Err(ShellError::BuiltinArgCount {
            name: "output".to_string(),
        });
    }
    let job_id = parse_job_id(&args[0])?;
    queue.output(job_id, &mut std::io::stdout())?;
    Ok(BuiltinOutcome::Success)
}

fn cancel(args: &[String], queue: &mut JobQueue) -> Result<BuiltinOutcome, ShellError> {
    if args.len() != 1 {
        return Err(ShellError::BuiltinArgCount {
            name: "cancel".to_string(),
        });
    }
    let job_id = parse_job_id(&args[0])?;
    queue.cancel(job_id)?;
    Ok(BuiltinOutcome::Success)
}

fn parse_job_id(text: &str) -> Result<u64, ShellError> {
    text.parse()
        .map_err(|_| ShellError::NoSuchJob { id: u64::MAX })
}
