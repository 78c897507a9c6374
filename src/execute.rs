//! Shell execution for targets and `+` env commands.
//!
//! Every command runs as `bash -e -c <script>` with an explicit environment.
//! Target commands stream into [`OutputSink`]s and can be cancelled through a
//! [`CancelToken`]; env commands are captured synchronously.

use crate::sink::OutputSink;
use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Captured result of a synchronous shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Run `script` to completion and capture its output.
pub fn capture_shell(
    script: &str,
    envs: Option<&BTreeMap<String, String>>,
) -> std::io::Result<CommandOutput> {
    let mut cmd = std::process::Command::new("bash");
    cmd.arg("-e").arg("-c").arg(script);
    if let Some(envs) = envs {
        cmd.env_clear().envs(envs);
    }
    let out = cmd.stdin(Stdio::null()).output()?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        status: exit_code(out.status),
    })
}

/// Map a process exit status to an integer, `128 + signal` for signalled
/// processes.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

/// Cancellation shared between the signal listener and running targets.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `token` on the first HUP, INT, TERM or QUIT.
#[cfg(unix)]
pub fn spawn_signal_listener(token: CancelToken) -> JoinHandle<()> {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let listeners = (
            signal(SignalKind::hangup()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        );
        let (mut hup, mut int, mut term, mut quit) = match listeners {
            (Ok(hup), Ok(int), Ok(term), Ok(quit)) => (hup, int, term, quit),
            _ => {
                warn!("unable to install signal handlers, cancellation disabled");
                return;
            }
        };
        tokio::select! {
            _ = hup.recv() => debug!("received SIGHUP"),
            _ = int.recv() => debug!("received SIGINT"),
            _ = term.recv() => debug!("received SIGTERM"),
            _ = quit.recv() => debug!("received SIGQUIT"),
        }
        token.cancel();
    })
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("received ctrl-c");
            token.cancel();
        }
    })
}

async fn copy_to_sink<R: tokio::io::AsyncRead + Unpin>(mut reader: R, sink: OutputSink) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = sink.write_all(&buf[..n]) {
                    warn!("unable to write command output: {}", e);
                    break;
                }
            }
            Err(e) => {
                warn!("unable to read command output: {}", e);
                break;
            }
        }
    }
}

/// Run `script` with stdin inherited and output streamed to the sinks.
///
/// The child is killed if `cancel` fires before it exits; the returned status
/// is whatever the child really exited with.
pub async fn run_shell(
    script: &str,
    envs: &BTreeMap<String, String>,
    stdout: &OutputSink,
    stderr: &OutputSink,
    cancel: &CancelToken,
) -> std::io::Result<i32> {
    let mut child = tokio::process::Command::new("bash")
        .arg("-e")
        .arg("-c")
        .arg(script)
        .env_clear()
        .envs(envs)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let out_task = child
        .stdout
        .take()
        .map(|s| tokio::spawn(copy_to_sink(s, stdout.clone())));
    let err_task = child
        .stderr
        .take()
        .map(|s| tokio::spawn(copy_to_sink(s, stderr.clone())));

    let finished = tokio::select! {
        status = child.wait() => Some(status?),
        _ = cancel.cancelled() => None,
    };

    let (status, killed) = match finished {
        Some(status) => (status, false),
        None => {
            debug!("cancelling running command");
            child.start_kill()?;
            (child.wait().await?, true)
        }
    };

    for task in [out_task, err_task].into_iter().flatten() {
        if killed {
            // Grandchildren may still hold the pipes open.
            task.abort();
        } else {
            let _ = task.await;
        }
    }
    Ok(exit_code(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_env() -> BTreeMap<String, String> {
        let mut envs = BTreeMap::new();
        envs.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());
        envs
    }

    #[test]
    fn test_capture_shell_multiline() {
        let script = r#"echo "prep1"
echo "prep2" && \
    echo "prep3"
if [ 1 != 0 ]; then
    echo "prep4"
fi
"#;
        let out = capture_shell(script, None).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "prep1\nprep2\nprep3\nprep4\n");
    }

    #[test]
    fn test_capture_shell_status_and_envs() {
        assert_eq!(capture_shell("exit 2", None).unwrap().status, 2);

        let mut envs = path_env();
        envs.insert("HI".into(), "hi".into());
        envs.insert("RON".into(), "ron".into());
        let out = capture_shell("echo $HI $RON", Some(&envs)).unwrap();
        assert_eq!(out.stdout, "hi ron\n");
    }

    #[test]
    fn test_capture_shell_command_not_found() {
        let out = capture_shell("_vermouth", Some(&path_env())).unwrap();
        assert_eq!(out.status, 127);
        assert!(out.stderr.contains("_vermouth"));
    }

    #[tokio::test]
    async fn test_run_shell_streams_to_sinks() {
        let stdout = OutputSink::memory();
        let stderr = OutputSink::memory();
        let status = run_shell(
            "echo out; echo err >&2; exit 3",
            &path_env(),
            &stdout,
            &stderr,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(status, 3);
        assert_eq!(stdout.contents(), "out\n");
        assert_eq!(stderr.contents(), "err\n");
    }

    #[tokio::test]
    async fn test_run_shell_cancel_kills_child() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let sink = OutputSink::memory();
        let status = run_shell("sleep 5", &path_env(), &sink, &sink, &token)
            .await
            .unwrap();
        assert_ne!(status, 0);
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
        assert!(token.is_cancelled());
    }
}
