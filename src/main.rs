use std::io::{self, Write};

use sush::environment::Environment;
use sush::queue::{self, JobQueue};
use sush::runner::{self, Outcome};

fn main() {
    init_logger();
    queue::install_signal_handler();

    let mut env = Environment::init();
    let mut job_queue = JobQueue::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last_exit_code: i32 = 0;

    loop {
        job_queue.poll(&env);

        let ps1 = env.get("PS1").cloned().unwrap_or_else(|| "$ ".to_string());
        print!("{ps1}");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match runner::do_command(trimmed, &mut env, &mut job_queue) {
                    Outcome::Success => last_exit_code = 0,
                    Outcome::Error(e) => {
                        eprintln!("{e}");
                        last_exit_code = 1;
                    }
                    Outcome::ExitShell => {
                        last_exit_code = 0;
                        break;
                    }
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                eprintln!("sush: {error}");
                break;
            }
        }
    }

    job_queue.teardown();
    std::process::exit(last_exit_code);
}

/// `SUSH_LOG` takes priority over `RUST_LOG`, matching the teacher's layered
/// diagnostic-stream-vs-trace-log split: user-facing errors go to stderr via
/// `Display`, structured tracing goes through `log`/`env_logger`.
fn init_logger() {
    let env = env_logger::Env::default()
        .filter_or("SUSH_LOG", std::env::var("RUST_LOG").unwrap_or_default());
    env_logger::Builder::from_env(env).init();
}
