use claude_gateway::{AppState, Executor, LaunchEnv, ServerConfig};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FAKE_CLI: &str = "#!/bin/sh\n\
    [ \"$1\" = \"-p\" ] || { echo \"expected -p\" >&2; exit 64; }\n\
    prompt=\"$2\"\n\
    shift 2\n\
    if [ \"$1\" = \"--model\" ]; then FAKE_MODEL=\"$2\"; export FAKE_MODEL; fi\n\
    eval \"$prompt\"\n";

/// Directory holding a fake `claude` that evaluates its `-p` argument as shell
/// and exports `--model` as FAKE_MODEL.
pub fn fake_cli_dir() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::Builder::new()
            .prefix("gateway-fake-cli-")
            .tempdir()
            .unwrap();
        // Written by a helper process so no writable fd of ours can leak into
        // a concurrently forked child and make the exec fail with ETXTBSY.
        let status = Command::new("/bin/sh")
            .args(["-c", "printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"", "sh"])
            .arg(FAKE_CLI)
            .arg(dir.path().join("claude"))
            .status()
            .unwrap();
        assert!(status.success(), "writing fake cli failed: {}", status);
        dir
    })
    .path()
}

/// State whose `claude` resolves to the fake CLI via PATH.
pub fn state_with_fake_cli(config: ServerConfig) -> AppState {
    let path = format!("{}:/usr/bin:/bin", fake_cli_dir().display());
    let env = LaunchEnv::from_vars(
        vec![("PATH".to_string(), path)],
        Path::new("/tmp/gateway-data"),
    );
    AppState::new(config, Executor::new("claude", env))
}

/// State whose PATH has no `claude` on it.
pub fn state_without_cli() -> AppState {
    let env = LaunchEnv::from_vars(
        vec![("PATH".to_string(), "/nonexistent-gateway-bin".to_string())],
        Path::new("/tmp/gateway-data"),
    );
    AppState::new(ServerConfig::default(), Executor::new("claude", env))
}

/// Wait up to `within` for `pid` to exit. A zombie counts as exited: an
/// orphaned process is reaped by init, not by the test.
pub fn exits_within(pid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if kill(Pid::from_raw(pid), None).is_err() || is_zombie(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn is_zombie(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(") ")
                .map(|(_, rest)| rest.starts_with('Z'))
        })
        .unwrap_or(false)
}
