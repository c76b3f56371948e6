//! Child process supervision and output capture.
//!
//! The supervisor owns the watched process for its entire lifetime:
//! - Spawning it directly (no shell) with stdout/stderr piped
//! - Draining both streams into the [`LogStore`], one task per stream
//! - Writing every chunk through to the host terminal
//! - Recording exactly one terminal state when the child is gone
//!
//! Nothing here ever shuts the host down. Spawn failures, nonzero exits and
//! signals end the child only; the query surface keeps running.
//!
//! The current [`ChildState`] is published on a `tokio::sync::watch`
//! channel so callers can observe the lifecycle without touching the
//! process handle.

use serde::Serialize;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::lines::LineSplitter;
use crate::store::{LogStore, Origin};

/// Bytes requested per read from a child pipe.
const READ_CHUNK_SIZE: usize = 8192;

/// How long to keep draining after the child exits. Grandchildren that
/// inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Exit code used when the command cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code used when the command is not executable.
pub const EXIT_PERMISSION_DENIED: i32 = 126;

/// Why a spawn attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SpawnFailure {
    NotFound,
    PermissionDenied,
    Other(String),
}

impl SpawnFailure {
    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnFailure::NotFound,
            io::ErrorKind::PermissionDenied => SpawnFailure::PermissionDenied,
            _ => SpawnFailure::Other(err.to_string()),
        }
    }
}

/// Lifecycle of the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChildState {
    NotStarted,
    Running { pid: Option<u32> },
    ExitedZero,
    ExitedNonZero { code: i32 },
    ExitedBySignal { signal: i32, name: String },
    SpawnFailed { reason: SpawnFailure },
}

impl ChildState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChildState::NotStarted | ChildState::Running { .. })
    }

    /// Exit code the host should propagate when it exits with the child.
    ///
    /// `None` while the child has not reached a terminal state.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ChildState::NotStarted | ChildState::Running { .. } => None,
            ChildState::ExitedZero => Some(0),
            ChildState::ExitedNonZero { code } => Some(*code),
            ChildState::ExitedBySignal { .. } => Some(1),
            ChildState::SpawnFailed { reason } => Some(match reason {
                SpawnFailure::NotFound => EXIT_NOT_FOUND,
                SpawnFailure::PermissionDenied => EXIT_PERMISSION_DENIED,
                SpawnFailure::Other(_) => 1,
            }),
        }
    }

    fn from_exit_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return if code == 0 {
                ChildState::ExitedZero
            } else {
                ChildState::ExitedNonZero { code }
            };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ChildState::ExitedBySignal {
                    signal,
                    name: signal_name(signal),
                };
            }
        }

        ChildState::ExitedNonZero { code: 1 }
    }
}

/// Where drained bytes are echoed on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Passthrough {
    /// Child stdout to host stdout, child stderr to host stderr.
    #[default]
    Terminal,
    /// Both streams to host stderr (host stdout carries a protocol).
    StderrOnly,
    /// Capture only.
    Off,
}

impl Passthrough {
    fn writer_for(self, origin: Origin) -> Option<EchoWriter> {
        match (self, origin) {
            (Passthrough::Off, _) => None,
            (Passthrough::Terminal, Origin::Stdout) => Some(Box::new(tokio::io::stdout())),
            _ => Some(Box::new(tokio::io::stderr())),
        }
    }
}

/// Configuration for the supervised command.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Connect the child's stdin to the host's stdin.
    pub inherit_stdin: bool,
    pub passthrough: Passthrough,
    /// Log that the server keeps running once the child is gone.
    pub announce_continue: bool,
}

impl SupervisorConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            inherit_stdin: true,
            passthrough: Passthrough::Terminal,
            announce_continue: true,
        }
    }

    /// Give the child a null stdin.
    pub fn no_stdin(mut self) -> Self {
        self.inherit_stdin = false;
        self
    }

    pub fn passthrough(mut self, passthrough: Passthrough) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Skip the "continues running" status line.
    pub fn quiet_on_exit(mut self) -> Self {
        self.announce_continue = false;
        self
    }

    /// Shell-quoted command line for status messages.
    pub fn display_command(&self) -> String {
        let parts = std::iter::once(self.command.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(parts).unwrap_or_else(|_| {
            std::iter::once(self.command.clone())
                .chain(self.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

/// Supervises one child process and feeds its output into a [`LogStore`].
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    store: Arc<LogStore>,
    state: watch::Sender<ChildState>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, store: Arc<LogStore>) -> Self {
        let (state, _) = watch::channel(ChildState::NotStarted);
        Self {
            config,
            store,
            state,
        }
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ChildState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ChildState {
        self.state.borrow().clone()
    }

    /// Run the supervisor on the current tokio runtime.
    pub fn start(self) -> SupervisorHandle {
        let state = self.subscribe();
        let task = tokio::spawn(self.run());
        SupervisorHandle { state, task }
    }

    /// Spawn the child, drain its output and wait for it to finish.
    ///
    /// Returns the recorded terminal state. Never fails: every outcome is a
    /// [`ChildState`].
    pub async fn run(self) -> ChildState {
        log::info!("Starting child process: {}", self.config.display_command());

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.config.inherit_stdin {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = SpawnFailure::from_io(&e);
                if let SpawnFailure::Other(_) = reason {
                    log::debug!("spawn error for {}: {e:?}", self.config.command);
                }
                return self.finish(ChildState::SpawnFailed { reason });
            }
        };

        self.record(ChildState::Running { pid: child.id() });

        let passthrough = self.config.passthrough;
        let mut drains = Vec::with_capacity(4);
        if let Some(stdout) = child.stdout.take() {
            let (echo, writer) = spawn_echo(passthrough.writer_for(Origin::Stdout));
            drains.push(tokio::spawn(drain(stdout, Origin::Stdout, Arc::clone(&self.store), echo)));
            drains.extend(writer);
        }
        if let Some(stderr) = child.stderr.take() {
            let (echo, writer) = spawn_echo(passthrough.writer_for(Origin::Stderr));
            drains.push(tokio::spawn(drain(stderr, Origin::Stderr, Arc::clone(&self.store), echo)));
            drains.extend(writer);
        }

        let status = child.wait().await;

        // Capture and echo tasks alike; echo tasks end once their drain does.
        let drained = async {
            for drain in drains {
                let _ = drain.await;
            }
        };
        if tokio::time::timeout(DRAIN_GRACE, drained).await.is_err() {
            log::warn!("Child output not fully drained after exit; no longer waiting for it");
        }

        let state = match status {
            Ok(status) => ChildState::from_exit_status(status),
            Err(e) => {
                log::error!("Failed to wait for child process: {e}");
                ChildState::ExitedNonZero { code: 1 }
            }
        };
        self.finish(state)
    }

    fn finish(&self, state: ChildState) -> ChildState {
        self.record(state.clone());
        report(&self.config, &state);
        state
    }

    // Terminal states are final.
    fn record(&self, next: ChildState) {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Handle to a supervisor running in the background.
pub struct SupervisorHandle {
    state: watch::Receiver<ChildState>,
    task: JoinHandle<ChildState>,
}

impl SupervisorHandle {
    /// Wait until the child reaches a terminal state.
    pub async fn wait(self) -> ChildState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                log::error!("Supervisor task failed: {e}");
                self.state.borrow().clone()
            }
        }
    }
}

type EchoWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Start a task that writes chunks through to `writer`.
///
/// Returns the chunk queue and the task. A stalled writer only holds up its
/// own queue, never capture into the store.
fn spawn_echo(
    writer: Option<EchoWriter>,
) -> (Option<mpsc::UnboundedSender<Vec<u8>>>, Option<JoinHandle<()>>) {
    let Some(mut writer) = writer else {
        return (None, None);
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let task = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = write_through(&mut writer, &chunk).await {
                log::debug!("Stopped echoing child output: {e}");
                break;
            }
        }
    });
    (Some(tx), Some(task))
}

/// Copy one child stream into the store until EOF.
///
/// Each chunk is captured before it is queued for echo.
async fn drain<R>(
    mut reader: R,
    origin: Origin,
    store: Arc<LogStore>,
    mut echo: Option<mpsc::UnboundedSender<Vec<u8>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::warn!("Error reading child {origin}: {e}");
                break;
            }
        };
        let chunk = &buf[..n];

        for line in splitter.push(chunk) {
            store.append(origin, &line);
        }

        // Echo task gone (write failed); keep capturing.
        if echo.as_ref().is_some_and(|tx| tx.send(chunk.to_vec()).is_err()) {
            echo = None;
        }
    }

    if let Some(tail) = splitter.finish() {
        log::debug!(
            "Discarding {} bytes of unterminated {origin} output",
            tail.len()
        );
    }
}

async fn write_through(writer: &mut EchoWriter, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

fn report(config: &SupervisorConfig, state: &ChildState) {
    match state {
        ChildState::NotStarted | ChildState::Running { .. } => return,
        ChildState::ExitedZero => log::info!("Child process exited successfully"),
        ChildState::ExitedNonZero { code } => {
            log::warn!("Child process exited with code: {code}")
        }
        ChildState::ExitedBySignal { name, .. } => {
            log::warn!("Child process killed by signal: {name}")
        }
        ChildState::SpawnFailed { reason } => match reason {
            SpawnFailure::NotFound => log::error!("Command not found: {}", config.command),
            SpawnFailure::PermissionDenied => {
                log::error!("Permission denied: {}", config.command)
            }
            SpawnFailure::Other(msg) => log::error!("Failed to start child process: {msg}"),
        },
    }
    if config.announce_continue {
        log::info!("MCP server continues running");
    }
}

/// Conventional name for a signal number.
#[cfg(unix)]
pub fn signal_name(signal: i32) -> String {
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        _ => return format!("signal {signal}"),
    };
    name.to_string()
}

#[cfg(not(unix))]
pub fn signal_name(signal: i32) -> String {
    format!("signal {signal}")
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildState::NotStarted => write!(f, "not started"),
            ChildState::Running { pid: Some(pid) } => write!(f, "running (pid {pid})"),
            ChildState::Running { pid: None } => write!(f, "running"),
            ChildState::ExitedZero => write!(f, "exited with code 0"),
            ChildState::ExitedNonZero { code } => write!(f, "exited with code {code}"),
            ChildState::ExitedBySignal { name, .. } => write!(f, "killed by {name}"),
            ChildState::SpawnFailed { reason } => match reason {
                SpawnFailure::NotFound => write!(f, "command not found"),
                SpawnFailure::PermissionDenied => write!(f, "permission denied"),
                SpawnFailure::Other(msg) => write!(f, "failed to start: {msg}"),
            },
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(command: &str, args: &[&str]) -> SupervisorConfig {
        SupervisorConfig::new(command, args.iter().map(|s| s.to_string()).collect())
            .no_stdin()
            .passthrough(Passthrough::Off)
    }

    mod config {
        use super::*;

        #[test]
        fn builder_defaults() {
            let config = SupervisorConfig::new("npm", vec!["run".into(), "dev".into()]);
            assert!(config.inherit_stdin);
            assert_eq!(config.passthrough, Passthrough::Terminal);
            assert!(config.announce_continue);
        }

        #[test]
        fn builder_overrides() {
            let config = SupervisorConfig::new("npm", vec![])
                .no_stdin()
                .passthrough(Passthrough::StderrOnly)
                .quiet_on_exit();
            assert!(!config.inherit_stdin);
            assert_eq!(config.passthrough, Passthrough::StderrOnly);
            assert!(!config.announce_continue);
        }

        #[test]
        fn display_command_quotes_arguments() {
            let config = SupervisorConfig::new("echo", vec!["Hello World".into()]);
            assert_eq!(config.display_command(), "echo 'Hello World'");
        }
    }

    mod child_state {
        use super::*;

        #[test]
        fn terminal_states() {
            assert!(!ChildState::NotStarted.is_terminal());
            assert!(!ChildState::Running { pid: Some(1) }.is_terminal());
            assert!(ChildState::ExitedZero.is_terminal());
            assert!(ChildState::ExitedNonZero { code: 2 }.is_terminal());
            assert!(ChildState::SpawnFailed {
                reason: SpawnFailure::NotFound
            }
            .is_terminal());
        }

        #[test]
        fn exit_code_mapping() {
            assert_eq!(ChildState::Running { pid: None }.exit_code(), None);
            assert_eq!(ChildState::ExitedZero.exit_code(), Some(0));
            assert_eq!(ChildState::ExitedNonZero { code: 3 }.exit_code(), Some(3));
            assert_eq!(
                ChildState::ExitedBySignal {
                    signal: 15,
                    name: "SIGTERM".into()
                }
                .exit_code(),
                Some(1)
            );
            let failed = |reason| ChildState::SpawnFailed { reason };
            assert_eq!(failed(SpawnFailure::NotFound).exit_code(), Some(127));
            assert_eq!(failed(SpawnFailure::PermissionDenied).exit_code(), Some(126));
            assert_eq!(failed(SpawnFailure::Other("x".into())).exit_code(), Some(1));
        }

        #[test]
        fn spawn_failure_from_io_kind() {
            let not_found = io::Error::from(io::ErrorKind::NotFound);
            let denied = io::Error::from(io::ErrorKind::PermissionDenied);
            let other = io::Error::new(io::ErrorKind::Other, "boom");
            assert_eq!(SpawnFailure::from_io(&not_found), SpawnFailure::NotFound);
            assert_eq!(SpawnFailure::from_io(&denied), SpawnFailure::PermissionDenied);
            assert_eq!(
                SpawnFailure::from_io(&other),
                SpawnFailure::Other("boom".to_string())
            );
        }

        #[test]
        fn serializes_tagged() {
            let json = serde_json::to_value(ChildState::ExitedNonZero { code: 1 }).unwrap();
            assert_eq!(json["state"], "exited_non_zero");
            assert_eq!(json["code"], 1);
        }

        #[test]
        #[cfg(unix)]
        fn signal_names() {
            assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
            assert_eq!(signal_name(libc::SIGKILL), "SIGKILL");
            assert_eq!(signal_name(200), "signal 200");
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn supervise(config: SupervisorConfig) -> (ProcessSupervisor, Arc<LogStore>) {
            let store = Arc::new(LogStore::new(100));
            (ProcessSupervisor::new(config, Arc::clone(&store)), store)
        }

        #[tokio::test]
        async fn captures_echo_output() {
            let (supervisor, store) = supervise(quiet("echo", &["Hello World"]));
            let state = supervisor.run().await;

            assert_eq!(state, ChildState::ExitedZero);
            let entries = store.snapshot();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].origin, Origin::Stdout);
            assert_eq!(entries[0].content, "Hello World");
        }

        #[tokio::test]
        async fn captures_stderr_separately() {
            let (supervisor, store) =
                supervise(quiet("sh", &["-c", "echo out; echo err 1>&2"]));
            supervisor.run().await;

            let entries = store.snapshot();
            assert_eq!(entries.len(), 2);
            let err = entries.iter().find(|e| e.origin == Origin::Stderr).unwrap();
            assert_eq!(err.content, "err");
            let out = entries.iter().find(|e| e.origin == Origin::Stdout).unwrap();
            assert_eq!(out.content, "out");
        }

        #[tokio::test]
        async fn preserves_per_stream_order() {
            let (supervisor, store) =
                supervise(quiet("sh", &["-c", "for i in 1 2 3 4 5; do echo line$i; done"]));
            supervisor.run().await;

            let lines: Vec<_> = store.snapshot().into_iter().map(|e| e.content).collect();
            assert_eq!(lines, vec!["line1", "line2", "line3", "line4", "line5"]);
        }

        #[tokio::test]
        async fn records_nonzero_exit() {
            let (supervisor, _) = supervise(quiet("sh", &["-c", "exit 1"]));
            assert_eq!(supervisor.run().await, ChildState::ExitedNonZero { code: 1 });
        }

        #[tokio::test]
        async fn records_signal() {
            let (supervisor, _) = supervise(quiet("sh", &["-c", "kill -TERM $$"]));
            let state = supervisor.run().await;
            assert_eq!(
                state,
                ChildState::ExitedBySignal {
                    signal: libc::SIGTERM,
                    name: "SIGTERM".to_string()
                }
            );
        }

        #[tokio::test]
        async fn missing_command_is_not_found() {
            let (supervisor, store) =
                supervise(quiet("definitely-not-a-real-command-xyz123", &[]));
            let state = supervisor.run().await;

            assert_eq!(
                state,
                ChildState::SpawnFailed {
                    reason: SpawnFailure::NotFound
                }
            );
            assert!(store.is_empty());
        }

        #[tokio::test]
        async fn non_executable_file_is_permission_denied() {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("script.sh");
            std::fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

            let (supervisor, _) = supervise(quiet(script.to_str().unwrap(), &[]));
            assert_eq!(
                supervisor.run().await,
                ChildState::SpawnFailed {
                    reason: SpawnFailure::PermissionDenied
                }
            );
        }

        #[tokio::test]
        async fn unterminated_tail_is_dropped() {
            let (supervisor, store) = supervise(quiet("printf", &["done\\npartial"]));
            supervisor.run().await;

            let lines: Vec<_> = store.snapshot().into_iter().map(|e| e.content).collect();
            assert_eq!(lines, vec!["done"]);
        }

        #[tokio::test]
        async fn stalled_echo_does_not_block_capture() {
            // Nobody reads the other end, so writes stall after 4 bytes.
            let (stalled, _unread) = tokio::io::duplex(4);
            let (echo, _writer) = spawn_echo(Some(Box::new(stalled)));
            let store = Arc::new(LogStore::new(100));
            let output: &[u8] = b"first line\nsecond line\nthird line\n";

            tokio::time::timeout(
                Duration::from_secs(5),
                drain(output, Origin::Stdout, Arc::clone(&store), echo),
            )
            .await
            .unwrap();

            let lines: Vec<_> = store.snapshot().into_iter().map(|e| e.content).collect();
            assert_eq!(lines, vec!["first line", "second line", "third line"]);
        }

        #[tokio::test]
        async fn echo_receives_every_chunk() {
            let (sink, mut reader) = tokio::io::duplex(1024);
            let (echo, writer) = spawn_echo(Some(Box::new(sink)));
            let store = Arc::new(LogStore::new(100));
            let output: &[u8] = b"one\ntwo\n";

            drain(output, Origin::Stderr, Arc::clone(&store), echo).await;
            writer.unwrap().await.unwrap();

            let mut echoed = Vec::new();
            reader.read_to_end(&mut echoed).await.unwrap();
            assert_eq!(echoed, b"one\ntwo\n");
        }

        #[tokio::test]
        async fn handle_reports_terminal_state() {
            let (supervisor, _) = supervise(quiet("true", &[]));
            let mut rx = supervisor.subscribe();
            let handle = supervisor.start();

            assert_eq!(handle.wait().await, ChildState::ExitedZero);
            rx.changed().await.ok();
            assert!(rx.borrow().is_terminal());
        }

        #[tokio::test]
        async fn terminal_state_is_recorded_once() {
            let (supervisor, _) = supervise(quiet("true", &[]));
            supervisor.record(ChildState::ExitedNonZero { code: 9 });
            supervisor.record(ChildState::ExitedZero);
            assert_eq!(supervisor.state(), ChildState::ExitedNonZero { code: 9 });
        }
    }
}
