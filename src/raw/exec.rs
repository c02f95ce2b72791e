//! Bounded subprocess execution.
//!
//! The child is spawned directly (no shell) with a fixed argument vector and
//! polled with `try_wait` until it exits, the deadline passes, or the cancel
//! token is set. The last two kill it.
//!
//! On unix the child leads its own process group, and the whole group is
//! killed: a wrapper script's children die with it, and anything left behind
//! after a normal exit is killed too. Collecting stderr is bounded by the
//! same deadline, since a straggler holding the pipe would otherwise keep the
//! call waiting.

use crate::cancel::CancelToken;
use crate::error::{ExternalToolError, Result, TranscodeError};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Longest stderr excerpt kept in a [`ExternalToolError::NonZeroExit`].
const STDERR_LIMIT: usize = 4096;

/// Run `executable` with `args` in `cwd` and wait at most `timeout`.
///
/// `program` is the logical name used in errors and logs.
pub fn run_with_timeout(
    program: &str,
    executable: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<()> {
    log::debug!("running {} {}", executable.display(), args.join(" "));

    let mut command = Command::new(executable);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| ExternalToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    // Drained on a separate thread so a chatty child cannot fill the pipe and stall.
    let stderr_rx = child.stderr.take().map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill_and_reap(program, &mut child);
                return Err(ExternalToolError::Spawn {
                    program: program.to_string(),
                    source,
                }
                .into());
            }
        }
        if cancel.is_cancelled() {
            kill_and_reap(program, &mut child);
            log::debug!("{program} cancelled after {:?}", start.elapsed());
            return Err(TranscodeError::Cancelled);
        }
        if start.elapsed() >= timeout {
            kill_and_reap(program, &mut child);
            return Err(ExternalToolError::Timeout {
                program: program.to_string(),
                timeout,
            }
            .into());
        }
        thread::sleep(POLL_INTERVAL);
    };

    // The leader is gone; whatever it left running in its group goes too.
    kill_group(program, &child);

    // One poll interval of grace so an exit right at the deadline still reports stderr.
    let remaining = timeout.saturating_sub(start.elapsed()).max(POLL_INTERVAL);
    let stderr = match stderr_rx {
        Some(rx) => match rx.recv_timeout(remaining) {
            Ok(buf) => excerpt(&buf),
            Err(_) => {
                log::warn!("{program} exited but its stderr stayed open; not waiting for it");
                String::new()
            }
        },
        None => String::new(),
    };

    if status.success() {
        if !stderr.is_empty() {
            log::debug!("{program} stderr: {stderr}");
        }
        log::debug!("{program} finished in {:?}", start.elapsed());
        Ok(())
    } else {
        Err(ExternalToolError::NonZeroExit {
            program: program.to_string(),
            code: status.code(),
            stderr,
        }
        .into())
    }
}

fn kill_and_reap(program: &str, child: &mut Child) {
    kill_group(program, child);
    if let Err(e) = child.kill() {
        // Already dead from the group kill
        log::debug!("kill {program}: {e}");
    }
    if let Err(e) = child.wait() {
        log::warn!("failed to reap {program}: {e}");
    }
}

/// SIGKILL every process in the child's group. No-op off unix.
#[cfg(unix)]
fn kill_group(program: &str, child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg takes plain integers; `pgid` is the group this child
    // created at spawn.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("failed to kill {program} process group: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_program: &str, _child: &Child) {}

fn excerpt(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    let text = text.trim();
    match text.char_indices().nth(STDERR_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_helpers::write_script;
    use tempfile::TempDir;

    fn run(script: &Path, cwd: &Path, timeout: Duration, cancel: &CancelToken) -> Result<()> {
        run_with_timeout("fake", script, &["one".to_string()], cwd, timeout, cancel)
    }

    #[test]
    fn success_runs_in_cwd_with_args() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "ok", r#"printf '%s' "$1" > marker"#);

        run(&script, tmp.path(), Duration::from_secs(10), &CancelToken::new()).unwrap();

        assert_eq!(std::fs::read_to_string(tmp.path().join("marker")).unwrap(), "one");
    }

    #[test]
    fn nonzero_exit_carries_code_and_stderr() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "fail", "echo boom >&2\nexit 3");

        let err = run(&script, tmp.path(), Duration::from_secs(10), &CancelToken::new())
            .unwrap_err();
        match err {
            TranscodeError::ExternalTool(ExternalToolError::NonZeroExit { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[test]
    fn deadline_kills_child() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "slow", "exec sleep 5");

        let start = Instant::now();
        let err = run(&script, tmp.path(), Duration::from_millis(200), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(
            err,
            TranscodeError::ExternalTool(ExternalToolError::Timeout { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn cancel_kills_child() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "slow", "exec sleep 5");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let start = Instant::now();
        let err = run(&script, tmp.path(), Duration::from_secs(30), &cancel).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, TranscodeError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    fn wait_until_gone(pid: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if !is_running(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn background_child_holding_stderr_does_not_block() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "detach", "sleep 6 &\nexit 0");

        let start = Instant::now();
        run(&script, tmp.path(), Duration::from_millis(300), &CancelToken::new()).unwrap();

        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[test]
    fn deadline_without_exec_still_times_out() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "slow", "sleep 6");

        let start = Instant::now();
        let err = run(&script, tmp.path(), Duration::from_millis(300), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(
            err,
            TranscodeError::ExternalTool(ExternalToolError::Timeout { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn deadline_kills_grandchildren() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "wrapper", "sleep 30 &\necho $! > sleeper.pid\nwait");

        let err = run(&script, tmp.path(), Duration::from_millis(500), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::ExternalTool(ExternalToolError::Timeout { .. })
        ));

        let pid = std::fs::read_to_string(tmp.path().join("sleeper.pid")).unwrap();
        assert!(wait_until_gone(pid.trim()), "sleeper {} outlived the timeout", pid.trim());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn cancel_kills_grandchildren() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "wrapper", "sleep 30 &\necho $! > sleeper.pid\nwait");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });

        let err = run(&script, tmp.path(), Duration::from_secs(30), &cancel).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, TranscodeError::Cancelled));

        let pid = std::fs::read_to_string(tmp.path().join("sleeper.pid")).unwrap();
        assert!(wait_until_gone(pid.trim()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stragglers_are_killed_after_normal_exit() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "detach", "sleep 30 &\necho $! > sleeper.pid\nexit 0");

        run(&script, tmp.path(), Duration::from_secs(5), &CancelToken::new()).unwrap();

        let pid = std::fs::read_to_string(tmp.path().join("sleeper.pid")).unwrap();
        assert!(wait_until_gone(pid.trim()));
    }

    #[test]
    fn missing_executable_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let err = run(
            &tmp.path().join("absent"),
            tmp.path(),
            Duration::from_secs(1),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::ExternalTool(ExternalToolError::Spawn { .. })
        ));
    }

    #[test]
    fn excerpt_truncates_long_output() {
        let long = "x".repeat(STDERR_LIMIT + 10);
        let out = excerpt(long.as_bytes());
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), STDERR_LIMIT + 1);
    }
}
