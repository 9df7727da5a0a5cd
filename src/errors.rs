use thiserror::Error;

/// Every error this crate's core can raise, one variant per §7 diagnostic kind.
///
/// `Display` renders the exact line the runner writes to the diagnostic stream;
/// nothing here panics or unwinds past a builtin or engine call.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("sush: malformed command line")]
    MalformedCmdline,

    #[error("sush: {name}: wrong number of arguments")]
    BuiltinArgCount { name: String },

    #[error("sush: getenv: {name}: not found")]
    UnknownVariable { name: String },

    #[error("sush: cd: HOME not set")]
    NoHome,

    #[error("sush: {path}: {source}")]
    BadInFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sush: {path}: {source}")]
    BadOutFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sush: {name}: command not found")]
    ExecLaunchFailed { name: String },

    #[error("sush: fork failed: {source}")]
    ForkFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("sush: pipe failed: {source}")]
    PipeFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("sush: dup2 failed: {source}")]
    DupFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("sush: waitpid failed: {source}")]
    WaitFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("sush: queue: command may not use pipes or redirections")]
    QueueReject,

    #[error("sush: output: job {id} is still queued")]
    OutputStillQueued { id: u64 },

    #[error("sush: output: job {id} is still running")]
    OutputStillRunning { id: u64 },

    #[error("sush: cancel: job {id} already finished; see: output {id}")]
    CancelAlreadyDone { id: u64 },

    #[error("sush: no such job: {id}")]
    NoSuchJob { id: u64 },
}
