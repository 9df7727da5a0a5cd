//! Background job queue: a serialized, single-worker queue fed by the
//! `queue` builtin. Advanced by a `SIGCHLD` handler that only sets a flag —
//! the actual reap-and-advance bookkeeping runs from the main flow the next
//! time it reaches a safe point, per the design note on signal-handler
//! reentrancy.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::IntoRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::assembler::{CommandDescriptor, StdinSource, StdoutSink};
use crate::builtins::{self, BuiltinOutcome};
use crate::environment::Environment;
use crate::errors::ShellError;
use crate::executor;

const REDIRECT_MODE: u32 = 0o777;

static SIGCHLD_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigchld(_sig: libc::c_int) {
    // Signal-safe bookkeeping only: set a flag, nothing else. Heavyweight
    // work (waitpid, removing queue entries, forking the next job) happens
    // in `JobQueue::poll`, called from the main flow.
    SIGCHLD_RECEIVED.store(true, Ordering::SeqCst);
}

/// Install the `SIGCHLD` handler. Call once at shell startup.
pub fn install_signal_handler() {
    unsafe {
        libc::signal(
            libc::SIGCHLD,
            handle_sigchld as *const () as libc::sighandler_t,
        );
    }
}

struct QueueItem {
    job_id: u64,
    pid: libc::pid_t,
    is_complete: bool,
    outfile: PathBuf,
    descriptor: CommandDescriptor,
}

/// The shell's background job queue.
#[derive(Default)]
pub struct JobQueue {
    items: Vec<QueueItem>,
    next_id: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `queue CMD ARG…` builtin: reject pipes/redirections on the
    /// wrapped command, rewrite it to read `/dev/null` and capture its
    /// stdout to a fresh temp file, and enqueue it.
    pub fn enqueue(
        &mut self,
        mut descriptor: CommandDescriptor,
        env: &Environment,
    ) -> Result<u64, ShellError> {
        if !descriptor.is_queue_eligible() {
            return Err(ShellError::QueueReject);
        }

        let outfile = create_capture_file()?;

        descriptor.stdin_source = StdinSource::File("/dev/null".to_string());
        descriptor.stdout_sink = StdoutSink::FileTrunc(outfile.to_string_lossy().into_owned());

        let job_id = self.next_id;
        self.next_id += 1;

        self.items.push(QueueItem {
            job_id,
            pid: 0,
            is_complete: false,
            outfile,
            descriptor,
        });

        if !self.has_running_job() {
            self.dequeue_and_start(env)?;
        }

        Ok(job_id)
    }

    fn has_running_job(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.pid != 0 && !item.is_complete)
    }

    /// Fork the first queued-and-not-started item.
    fn dequeue_and_start(&mut self, env: &Environment) -> Result<(), ShellError> {
        let Some(index) = self
            .items
            .iter()
            .position(|item| item.pid == 0 && !item.is_complete)
        else {
            return Ok(());
        };

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(ShellError::ForkFailed {
                source: std::io::Error::last_os_error(),
            });
        }

        if pid == 0 {
            run_job_child(&self.items[index].descriptor, env);
        }

        self.items[index].pid = pid;
        debug!("job {} started as pid {}", self.items[index].job_id, pid);
        Ok(())
    }

    /// Called from a safe point in the main flow. No-op unless the
    /// `SIGCHLD` handler has run since the last call.
    pub fn poll(&mut self, env: &Environment) {
        if !SIGCHLD_RECEIVED.swap(false, Ordering::SeqCst) {
            return;
        }
        self.reap_and_advance(env);
    }

    /// Reap-and-advance unconditionally, bypassing the `SIGCHLD` flag. Tests
    /// use this instead of racing real signal delivery.
    pub fn force_poll(&mut self, env: &Environment) {
        self.reap_and_advance(env);
    }

    fn reap_and_advance(&mut self, env: &Environment) {
        let Some(index) = self
            .items
            .iter()
            .position(|item| item.pid != 0 && !item.is_complete)
        else {
            return;
        };

        let pid = self.items[index].pid;
        let mut raw_status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
        if rc != pid {
            // Not this one, or not yet exited — nothing to do this round.
            return;
        }

        let was_killed =
            libc::WIFSIGNALED(raw_status) && libc::WTERMSIG(raw_status) == libc::SIGKILL;

        if was_killed {
            let job_id = self.items[index].job_id;
            let _ = std::fs::remove_file(&self.items[index].outfile);
            self.items.remove(index);
            println!("[{job_id}] cancelled");
        } else {
            self.items[index].is_complete = true;
        }

        if let Err(e) = self.dequeue_and_start(env) {
            warn!("failed to start next queued job: {e}");
        }
    }

    pub fn status(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for item in &self.items {
            let state = if item.is_complete {
                "complete".to_string()
            } else if item.pid != 0 {
                format!("running as pid {}", item.pid)
            } else {
                "queued".to_string()
            };
            writeln!(out, "[{}] {}", item.job_id, state)?;
        }
        Ok(())
    }

    pub fn output(&mut self, job_id: u64, out: &mut dyn Write) -> Result<(), ShellError> {
        let index = self.find(job_id)?;

        if !self.items[index].is_complete {
            return Err(if self.items[index].pid == 0 {
                ShellError::OutputStillQueued { id: job_id }
            } else {
                ShellError::OutputStillRunning { id: job_id }
            });
        }

        let item = self.items.remove(index);
        if let Ok(mut file) = std::fs::File::open(&item.outfile) {
            let _ = std::io::copy(&mut file, out);
        }
        let _ = std::fs::remove_file(&item.outfile);
        Ok(())
    }

    pub fn cancel(&mut self, job_id: u64) -> Result<(), ShellError> {
        let index = self.find(job_id)?;

        if self.items[index].is_complete {
            return Err(ShellError::CancelAlreadyDone { id: job_id });
        }

        if self.items[index].pid != 0 {
            unsafe {
                libc::kill(self.items[index].pid, libc::SIGKILL);
            }
            // cleanup completes in `reap_and_advance` once SIGCHLD arrives.
            return Ok(());
        }

        let item = self.items.remove(index);
        let _ = std::fs::remove_file(&item.outfile);
        Ok(())
    }

    fn find(&self, job_id: u64) -> Result<usize, ShellError> {
        self.items
            .iter()
            .position(|item| item.job_id == job_id)
            .ok_or(ShellError::NoSuchJob { id: job_id })
    }

    /// Remove every remaining item's temp file at shell exit.
    pub fn teardown(&mut self) {
        for item in self.items.drain(..) {
            let _ = std::fs::remove_file(&item.outfile);
        }
    }
}

fn create_capture_file() -> Result<PathBuf, ShellError> {
    let named = tempfile::Builder::new()
        .prefix("background_cmd_")
        .rand_bytes(8)
        .tempfile_in("/tmp")
        .map_err(|source| ShellError::BadOutFile {
            path: "/tmp/background_cmd_*".to_string(),
            source,
        })?;
    let (_file, path) = named.keep().map_err(|e| ShellError::BadOutFile {
        path: "/tmp/background_cmd_*".to_string(),
        source: e.error,
    })?;
    Ok(path)
}

/// The forked worker for a single queue item: arrange its captured stdin and
/// stdout, then run the command the same way the foreground path would —
/// built-in or external — without waiting on further siblings.
fn run_job_child(descriptor: &CommandDescriptor, env: &Environment) -> ! {
    if let StdinSource::File(path) = &descriptor.stdin_source {
        if let Ok(file) = OpenOptions::new().read(true).open(path) {
            let fd = file.into_raw_fd();
            unsafe {
                libc::dup2(fd, libc::STDIN_FILENO);
                libc::close(fd);
            }
        }
    }
    if let StdoutSink::FileTrunc(path) = &descriptor.stdout_sink {
        if let Ok(file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(REDIRECT_MODE)
            .open(path)
        {
            let fd = file.into_raw_fd();
            unsafe {
                libc::dup2(fd, libc::STDOUT_FILENO);
                libc::close(fd);
            }
        }
    }

    let code = if builtins::is_builtin(&descriptor.cmd_name) {
        // Job-control builtins don't make sense inside a queued job; a
        // throwaway local queue is fine here (mirrors the foreground path's
        // builtin dispatch, which is itself never reached for queue/status/
        // output/cancel run this way).
        let mut local_queue = JobQueue::new();
        let mut local_env = env.clone();
        match builtins::execute(descriptor, &mut local_env, &mut local_queue) {
            Ok(BuiltinOutcome::Success) | Ok(BuiltinOutcome::ExitShell) => 0,
            Ok(BuiltinOutcome::Error) => 1,
            Err(_) => 1,
        }
    } else {
        let envp = env.export();
        executor::exec_single(descriptor, &envp);
        eprintln!("sush: {}: command not found", descriptor.cmd_name);
        127
    };

    std::process::exit(code);
}
