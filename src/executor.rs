//! Runs the assistant CLI for one request and classifies the outcome.

use crate::environment::LaunchEnv;
use crate::request::ExecutionRequest;
use crate::result::{round_secs, ErrorKind, ExecutionResult};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Binary launched when none is configured.
pub const DEFAULT_BINARY: &str = "claude";

/// Reported as `model` when the request did not pick one.
pub const DEFAULT_MODEL_LABEL: &str = "default";

/// How long a killed child gets to be reaped before it is reported as leaked.
pub const REAP_GRACE: Duration = Duration::from_secs(5);

/// Launches the assistant binary with a fixed environment.
#[derive(Debug, Clone)]
pub struct Executor {
    binary: String,
    env: LaunchEnv,
}

impl Executor {
    pub fn new(binary: impl Into<String>, env: LaunchEnv) -> Self {
        Self {
            binary: binary.into(),
            env,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Whether the binary resolves on the launch environment's `PATH`.
    ///
    /// Touches the filesystem; call from a blocking context.
    pub fn is_available(&self) -> bool {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(&self.binary, self.env.search_path(), cwd).is_ok()
    }

    /// Arguments passed after the binary name.
    pub fn command_args(request: &ExecutionRequest) -> Vec<String> {
        let mut args = vec!["-p".to_string(), request.prompt.clone()];
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }

    /// Run one request to completion, deadline or launch failure.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("execute", %request_id);
        async {
            let result = self.run(request).await;
            match &result {
                ExecutionResult::Success {
                    execution_time_secs,
                    ..
                } => info!(execution_time_secs, "Execution succeeded"),
                ExecutionResult::Failure {
                    error_kind,
                    exit_code,
                    ..
                } => warn!(%error_kind, ?exit_code, "Execution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        info!(
            binary = %self.binary,
            prompt = %request.prompt_preview(),
            model = ?request.model,
            timeout_secs = request.timeout_secs,
            "Launching"
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::command_args(request))
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(binary = %self.binary, "Binary not found");
                return ExecutionResult::failure(
                    ErrorKind::Execution,
                    format!("{} not found", self.binary),
                );
            }
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "Launch failed");
                return ExecutionResult::failure(
                    ErrorKind::Execution,
                    format!("failed to launch {}: {}", self.binary, e),
                );
            }
        };
        // The child leads its own group; the id stays valid for killpg after the
        // leader has been reaped.
        let pgid = child.id();
        let start = Instant::now();
        debug!(pid = ?pgid, "Child spawned");

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            terminate(&mut child, pgid).await;
            return ExecutionResult::failure(
                ErrorKind::Internal,
                "child output streams unavailable",
            );
        };

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (status, _, _) = tokio::try_join!(
                child.wait(),
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
            )?;
            Ok::<_, io::Error>((status, out, err))
        };
        let outcome = timeout(request.timeout(), collect).await;

        match outcome {
            Ok(Ok((status, out, err))) => {
                debug!(?status, stdout_len = out.len(), stderr_len = err.len(), "Child exited");
                classify_exit(request, status, out, err, start.elapsed())
            }
            Ok(Err(e)) => {
                terminate(&mut child, pgid).await;
                ExecutionResult::failure(ErrorKind::Internal, e.to_string())
            }
            Err(_) => {
                warn!(timeout_secs = request.timeout_secs, "Deadline elapsed, killing child");
                terminate(&mut child, pgid).await;
                ExecutionResult::failure(
                    ErrorKind::Timeout,
                    format!("Timeout after {}s", request.timeout_secs),
                )
            }
        }
    }
}

/// Map a finished child to a result.
fn classify_exit(
    request: &ExecutionRequest,
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    elapsed: Duration,
) -> ExecutionResult {
    if status.success() {
        return match String::from_utf8(stdout) {
            Ok(output) => ExecutionResult::Success {
                output: output.trim().to_string(),
                execution_time_secs: round_secs(elapsed.as_secs_f64()),
                model_used: request
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MODEL_LABEL.to_string()),
            },
            Err(e) => ExecutionResult::failure(
                ErrorKind::Internal,
                format!("output is not valid UTF-8: {}", e),
            ),
        };
    }

    // Signal deaths report the negated signal number.
    let exit_code = status.code().or_else(|| status.signal().map(|sig| -sig));
    let stderr = String::from_utf8_lossy(&stderr);
    let message = match stderr.trim() {
        "" => "Failed",
        msg => msg,
    };
    ExecutionResult::Failure {
        error_message: message.to_string(),
        error_kind: ErrorKind::Execution,
        exit_code,
    }
}

/// SIGKILL the child's process group and reap the leader within [`REAP_GRACE`].
///
/// The group is signalled even when the leader has already exited, since
/// background helpers it started may still hold the output pipes.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            Ok(()) => {}
            Err(Errno::ESRCH) => debug!(pgid, "Process group already gone"),
            Err(e) => {
                warn!(pgid, error = %e, "killpg failed, killing child only");
                if let Err(e) = child.start_kill() {
                    warn!(pgid, error = %e, "kill failed");
                }
            }
        }
    }

    // Returns the cached status when the leader was reaped already.
    match timeout(REAP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "Child reaped"),
        Ok(Err(e)) => error!(error = %e, "Failed to reap killed child"),
        Err(_) => error!(
            pid = ?pgid,
            grace_secs = REAP_GRACE.as_secs(),
            "Killed child did not exit, process leaked"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    /// Stand-in CLI: checks for `-p`, exports `--model` as FAKE_MODEL and
    /// evaluates the prompt as shell.
    fn fake_cli() -> PathBuf {
        static DIR: OnceLock<TempDir> = OnceLock::new();
        let dir = DIR.get_or_init(|| {
            let dir = tempfile::Builder::new()
                .prefix("executor-fake-cli-")
                .tempdir()
                .unwrap();
            let script = "#!/bin/sh\n\
                [ \"$1\" = \"-p\" ] || { echo \"expected -p\" >&2; exit 64; }\n\
                prompt=\"$2\"\n\
                shift 2\n\
                if [ \"$1\" = \"--model\" ]; then FAKE_MODEL=\"$2\"; export FAKE_MODEL; fi\n\
                eval \"$prompt\"\n";
            // A helper process writes the file, so no writable fd of ours can
            // be inherited by a concurrently forked child (ETXTBSY on exec).
            let status = std::process::Command::new("/bin/sh")
                .args(["-c", "printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"", "sh"])
                .arg(script)
                .arg(dir.path().join("claude"))
                .status()
                .unwrap();
            assert!(status.success(), "writing fake cli failed: {}", status);
            dir
        });
        dir.path().join("claude")
    }

    /// Poll until `pid` is gone or a zombie awaiting init.
    fn exits_within(pid: i32, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            let gone = nix::sys::signal::kill(Pid::from_raw(pid), None).is_err();
            let zombie = fs::read_to_string(format!("/proc/{}/stat", pid))
                .ok()
                .and_then(|stat| stat.rsplit_once(") ").map(|(_, rest)| rest.starts_with('Z')))
                .unwrap_or(false);
            if gone || zombie {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn executor() -> Executor {
        let env = LaunchEnv::from_vars(
            vec![("PATH".to_string(), "/usr/bin:/bin".to_string())],
            Path::new("/tmp/gateway-data"),
        );
        Executor::new(fake_cli().to_string_lossy(), env)
    }

    fn request(prompt: &str, timeout_secs: i64) -> ExecutionRequest {
        ExecutionRequest::new(prompt, None, timeout_secs)
    }

    #[test]
    fn test_command_args() {
        let req = ExecutionRequest::new("hi", None, 10);
        assert_eq!(Executor::command_args(&req), vec!["-p", "hi"]);

        let req = ExecutionRequest::new("hi", Some("opus".to_string()), 10);
        assert_eq!(
            Executor::command_args(&req),
            vec!["-p", "hi", "--model", "opus"]
        );
    }

    #[tokio::test]
    async fn test_success_trims_output() {
        let result = executor().execute(&request("printf '  hello \\n\\n'", 10)).await;
        match result {
            ExecutionResult::Success {
                output,
                model_used,
                execution_time_secs,
            } => {
                assert_eq!(output, "hello");
                assert_eq!(model_used, "default");
                assert!(execution_time_secs >= 0.0);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_is_forwarded() {
        let req = ExecutionRequest::new("echo \"$FAKE_MODEL\"", Some("opus".to_string()), 10);
        match executor().execute(&req).await {
            ExecutionResult::Success {
                output, model_used, ..
            } => {
                assert_eq!(output, "opus");
                assert_eq!(model_used, "opus");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_child_sees_launch_env() {
        match executor().execute(&request("echo \"$HOME $XDG_CACHE_HOME\"", 10)).await {
            ExecutionResult::Success { output, .. } => {
                assert_eq!(output, "/tmp/gateway-data/home /tmp/gateway-data/.cache");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let result = executor()
            .execute(&request("echo ' bad arg ' >&2; exit 2", 10))
            .await;
        assert_eq!(
            result,
            ExecutionResult::Failure {
                error_message: "bad arg".to_string(),
                error_kind: ErrorKind::Execution,
                exit_code: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let result = executor().execute(&request("exit 3", 10)).await;
        assert_eq!(
            result,
            ExecutionResult::Failure {
                error_message: "Failed".to_string(),
                error_kind: ErrorKind::Execution,
                exit_code: Some(3),
            }
        );
    }

    #[tokio::test]
    async fn test_signal_death_reports_negated_signal() {
        let result = executor().execute(&request("kill -9 $$", 10)).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Execution));
        match result {
            ExecutionResult::Failure { exit_code, .. } => assert_eq!(exit_code, Some(-9)),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_internal() {
        let result = executor().execute(&request("printf '\\377\\376'", 10)).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Internal));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let prompt = format!("echo $$ > {}; sleep 5", pid_file.display());

        let started = Instant::now();
        let result = executor().execute(&request(&prompt, 1)).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(
            result,
            ExecutionResult::failure(ErrorKind::Timeout, "Timeout after 1s")
        );

        let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(nix::sys::signal::kill(Pid::from_raw(pid), None).is_err());
    }

    #[tokio::test]
    async fn test_timeout_kills_group_after_leader_exits() {
        // Leader exits at once; its background sleep holds stdout open.
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let prompt = format!("sleep 30 & echo $! > {}; exit 0", pid_file.display());

        let result = executor().execute(&request(&prompt, 1)).await;
        assert_eq!(
            result,
            ExecutionResult::failure(ErrorKind::Timeout, "Timeout after 1s")
        );

        let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(exits_within(pid, Duration::from_secs(2)), "sleep {} survived", pid);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let exec = Executor::new("definitely-not-a-real-binary-xyz", LaunchEnv::default());
        let result = exec.execute(&request("hello", 5)).await;
        assert_eq!(
            result,
            ExecutionResult::failure(
                ErrorKind::Execution,
                "definitely-not-a-real-binary-xyz not found"
            )
        );
        assert!(!exec.is_available());
    }

    #[test]
    fn test_availability_uses_launch_path() {
        let dir = fake_cli().parent().unwrap().to_string_lossy().into_owned();
        let env = LaunchEnv::from_vars(vec![("PATH".to_string(), dir)], Path::new("/data"));
        assert!(Executor::new("claude", env).is_available());

        let env = LaunchEnv::from_vars(
            vec![("PATH".to_string(), "/nonexistent".to_string())],
            Path::new("/data"),
        );
        assert!(!Executor::new("claude", env).is_available());
    }
}
