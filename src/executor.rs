//! Execution engine: opens redirection files, wires up pipes between
//! adjacent segments, forks each segment, arranges its standard streams via
//! descriptor duplication, and launches it through a PATH-searching exec.
//!
//! The engine waits for each child before forking the next (see the design
//! notes on serialized pipeline execution) rather than running the whole
//! pipeline concurrently — a faithful, if non-classical, choice.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::RawFd;

use log::debug;

use crate::assembler::{CommandDescriptor, Pipeline, StdinSource, StdoutSink};
use crate::environment::Environment;
use crate::errors::ShellError;
use crate::status;

const REDIRECT_MODE: u32 = 0o777;

/// Run a fully assembled pipeline to completion, returning the last
/// segment's exit code. Only a failed system call (fork/pipe/dup/wait) or a
/// redirection target that can't be opened aborts the pipeline early; a
/// child that fails to exec just reports its own non-zero status.
pub fn execute_pipeline(pipeline: &Pipeline, env: &Environment) -> Result<i32, ShellError> {
    let envp = env.export();

    let saved_stdin = dup_fd(libc::STDIN_FILENO)?;
    let saved_stdout = dup_fd(libc::STDOUT_FILENO)?;

    let result = run_segments(pipeline, &envp);

    restore_fd(saved_stdin, libc::STDIN_FILENO);
    restore_fd(saved_stdout, libc::STDOUT_FILENO);
    close_fd(saved_stdin);
    close_fd(saved_stdout);

    result
}

fn run_segments(pipeline: &Pipeline, envp: &[CString]) -> Result<i32, ShellError> {
    // Sentinel: the first segment reads the shell's real stdin, not a pipe
    // we created, so it must never be closed by this loop.
    let mut pipe_in_fd: RawFd = libc::STDIN_FILENO;
    let mut owns_pipe_in_fd = false;
    let mut last_status = 0;

    for segment in pipeline.iter() {
        let (read_fd, write_fd) = create_pipe()?;

        let fid_in = open_stdin_redirect(segment)?;
        let fid_out = open_stdout_redirect(segment)?;

        debug!("forking segment: {:?}", segment.argv);
        let pid = fork_checked()?;

        if pid == 0 {
            run_child(
                segment,
                pipe_in_fd,
                owns_pipe_in_fd,
                read_fd,
                write_fd,
                fid_in,
                fid_out,
                envp,
            );
        }

        // Parent: the write end belongs to the child's stdout now.
        close_fd(write_fd);
        if let Some(fd) = fid_in {
            close_fd(fd);
        }
        if let Some(fd) = fid_out {
            close_fd(fd);
        }
        if owns_pipe_in_fd {
            close_fd(pipe_in_fd);
        }

        last_status = wait_for(pid)?;

        pipe_in_fd = read_fd;
        owns_pipe_in_fd = true;
    }

    if owns_pipe_in_fd {
        close_fd(pipe_in_fd);
    }

    Ok(last_status)
}

fn run_child(
    segment: &CommandDescriptor,
    pipe_in_fd: RawFd,
    owns_pipe_in_fd: bool,
    read_fd: RawFd,
    write_fd: RawFd,
    fid_in: Option<RawFd>,
    fid_out: Option<RawFd>,
    envp: &[CString],
) -> ! {
    if let Some(fd) = fid_out {
        dup2_or_die(fd, libc::STDOUT_FILENO);
        unsafe { libc::close(fd) };
    } else if segment.pipe_out {
        dup2_or_die(write_fd, libc::STDOUT_FILENO);
    }

    if let Some(fd) = fid_in {
        dup2_or_die(fd, libc::STDIN_FILENO);
        unsafe { libc::close(fd) };
    } else if segment.pipe_in {
        dup2_or_die(pipe_in_fd, libc::STDIN_FILENO);
    }

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
        if owns_pipe_in_fd {
            libc::close(pipe_in_fd);
        }
    }

    exec_program(segment, envp);

    // exec only returns on failure.
    eprintln!("sush: {}: command not found", segment.cmd_name);
    std::process::exit(127);
}

/// PATH-searching program launch, passing `cmd_name`, `argv`, and the
/// environment array — the moral equivalent of `execvpe`.
fn exec_program(segment: &CommandDescriptor, envp: &[CString]) {
    let Ok(program) = CString::new(segment.cmd_name.as_bytes()) else {
        return;
    };
    let argv: Vec<CString> = segment
        .argv
        .iter()
        .filter_map(|arg| CString::new(arg.as_bytes()).ok())
        .collect();
    if argv.len() != segment.argv.len() {
        return;
    }

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let mut envp_ptrs: Vec<*const libc::c_char> = envp.iter().map(|e| e.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    unsafe {
        libc::execvpe(program.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
    }
}

/// Exec a single already-forked command in place, for callers (the
/// background queue) that do their own forking and stream wiring and just
/// need the final PATH-searching launch. Never returns on success; prints
/// nothing and does not exit on failure — the caller decides what to do.
pub(crate) fn exec_single(segment: &CommandDescriptor, envp: &[CString]) {
    exec_program(segment, envp);
}

fn open_stdin_redirect(segment: &CommandDescriptor) -> Result<Option<RawFd>, ShellError> {
    match &segment.stdin_source {
        StdinSource::Default => Ok(None),
        StdinSource::File(path) => {
            let file = OpenOptions::new().read(true).open(path).map_err(|source| {
                ShellError::BadInFile {
                    path: path.clone(),
                    source,
                }
            })?;
            Ok(Some(into_raw_fd(file)))
        }
    }
}

fn open_stdout_redirect(segment: &CommandDescriptor) -> Result<Option<RawFd>, ShellError> {
    match &segment.stdout_sink {
        StdoutSink::Default => Ok(None),
        StdoutSink::FileTrunc(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(REDIRECT_MODE)
                .open(path)
                .map_err(|source| ShellError::BadOutFile {
                    path: path.clone(),
                    source,
                })?;
            Ok(Some(into_raw_fd(file)))
        }
        StdoutSink::FileAppend(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .mode(REDIRECT_MODE)
                .open(path)
                .map_err(|source| ShellError::BadOutFile {
                    path: path.clone(),
                    source,
                })?;
            Ok(Some(into_raw_fd(file)))
        }
    }
}

fn into_raw_fd(file: std::fs::File) -> RawFd {
    use std::os::unix::io::IntoRawFd;
    file.into_raw_fd()
}

fn create_pipe() -> Result<(RawFd, RawFd), ShellError> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(ShellError::PipeFailed {
            source: std::io::Error::last_os_error(),
        });
    }
    Ok((fds[0], fds[1]))
}

fn fork_checked() -> Result<libc::pid_t, ShellError> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(ShellError::ForkFailed {
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(pid)
}

fn wait_for(pid: libc::pid_t) -> Result<i32, ShellError> {
    let mut raw_status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(ShellError::WaitFailed { source: err });
        }
        return Ok(status::exit_code_from_wait_status(raw_status).unwrap_or(1));
    }
}

fn dup2_or_die(from: RawFd, to: RawFd) {
    if from == to {
        return;
    }
    if unsafe { libc::dup2(from, to) } < 0 {
        eprintln!("sush: dup2 failed: {}", std::io::Error::last_os_error());
        std::process::exit(126);
    }
}

fn dup_fd(fd: RawFd) -> Result<RawFd, ShellError> {
    let rc = unsafe { libc::dup(fd) };
    if rc < 0 {
        return Err(ShellError::DupFailed {
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(rc)
}

fn restore_fd(saved: RawFd, target: RawFd) {
    unsafe {
        libc::dup2(saved, target);
    }
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use std::io::Read;

    fn test_env() -> Environment {
        let mut env = Environment::default();
        env.set(
            "PATH",
            &std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        env
    }

    #[test]
    fn stdin_stdout_fds_are_restored_after_pipeline() {
        let before_stdin = unsafe { libc::fcntl(libc::STDIN_FILENO, libc::F_GETFD) };
        let before_stdout = unsafe { libc::fcntl(libc::STDOUT_FILENO, libc::F_GETFD) };

        let pipeline = assemble("true").unwrap();
        execute_pipeline(&pipeline, &test_env()).unwrap();

        let after_stdin = unsafe { libc::fcntl(libc::STDIN_FILENO, libc::F_GETFD) };
        let after_stdout = unsafe { libc::fcntl(libc::STDOUT_FILENO, libc::F_GETFD) };
        assert_eq!(before_stdin >= 0, after_stdin >= 0);
        assert_eq!(before_stdout >= 0, after_stdout >= 0);
    }

    #[test]
    fn exit_code_of_external_command_is_propagated() {
        let pipeline = assemble("false").unwrap();
        let code = execute_pipeline(&pipeline, &test_env()).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn output_redirection_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let line = format!("echo hi > {}", path.display());
        let pipeline = assemble(&line).unwrap();
        execute_pipeline(&pipeline, &test_env()).unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hi\n");
    }

    #[test]
    fn pipeline_bytes_flow_from_producer_to_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piped.txt");
        let line = format!("echo hello | tr a-z A-Z > {}", path.display());
        let pipeline = assemble(&line).unwrap();
        execute_pipeline(&pipeline, &test_env()).unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "HELLO\n");
    }

    #[test]
    fn missing_input_file_is_bad_in_file() {
        let pipeline = assemble("cat < /no/such/file/at/all").unwrap();
        let err = execute_pipeline(&pipeline, &test_env()).unwrap_err();
        assert!(matches!(err, ShellError::BadInFile { .. }));
    }

    #[test]
    fn command_not_found_does_not_abort_pipeline() {
        let pipeline = assemble("this-command-does-not-exist-xyz").unwrap();
        let code = execute_pipeline(&pipeline, &test_env()).unwrap();
        assert_eq!(code, 127);
    }
}
