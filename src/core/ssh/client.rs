use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::render::RenderedCommand;
use crate::target::Target;
use crate::template::{ExecuteOn, EXIT_TIMEOUT};

/// Default per-command timeout. A configuration knob, not a per-run one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// ssh exits 255 for its own failures (unreachable host, auth refused),
/// never for the remote command's exit status.
const SSH_CONNECTION_EXIT: i32 = 255;

/// Outcome of running one command to completion on a target.
///
/// A non-zero `exit_code` is ordinary data, not an error; only transport
/// failures surface as `Err` from [`SshClient::execute`].
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs rendered commands against one target over SSH.
///
/// Connection identity is `(host, port, container-id-or-none)`; a client is
/// never shared across targets or across concurrent runs. Command text is
/// piped to the remote shell's stdin so multi-line scripts run unmodified;
/// `lxc` placement wraps the remote shell in `lxc-attach`.
pub struct SshClient {
    target: Target,
    timeout: Duration,
    /// When true, commands run in a local shell instead of over SSH.
    /// Set automatically when the target host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

impl SshClient {
    pub fn new(target: Target) -> Self {
        Self::with_timeout(target, DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(target: Target, timeout: Duration) -> Self {
        let is_local = is_local_host(&target.host);
        if is_local {
            log_status!("ssh", "Target '{}' is localhost, using local execution", target.host);
        }
        Self {
            target,
            timeout,
            is_local,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_ssh_args(&self, execute_on: ExecuteOn) -> Result<Vec<String>> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-q".to_string(),
        ];

        if self.target.port != 22 {
            args.push("-p".to_string());
            args.push(self.target.port.to_string());
        }

        args.push(self.target.host.clone());

        if execute_on == ExecuteOn::Lxc {
            let container_id = self.target.container_id.as_ref().ok_or_else(|| {
                Error::target_invalid("lxc command requested but target has no containerId")
            })?;
            args.extend([
                "lxc-attach".to_string(),
                "-n".to_string(),
                container_id.clone(),
                "--".to_string(),
                "/bin/sh".to_string(),
            ]);
        }

        Ok(args)
    }

    /// Run one rendered command to completion, or until the per-command
    /// timeout elapses. Blocks the caller; the pipeline depends on that.
    pub fn execute(&self, command: &RenderedCommand) -> Result<CommandOutcome> {
        let child = if self.is_local {
            Command::new("sh")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
        } else {
            let args = self.build_ssh_args(command.execute_on)?;
            Command::new("ssh")
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
        };

        let mut child = child.map_err(|e| self.connect_failed(format!("spawn ssh: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A vanished child before stdin is written is a transport
            // failure; report it as such rather than an IO error.
            if let Err(e) = stdin.write_all(command.text.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.connect_failed(format!("write command: {}", e)));
            }
        }

        let outcome = self.wait_with_timeout(&mut child)?;

        if !self.is_local && outcome.exit_code == SSH_CONNECTION_EXIT {
            return Err(self.connect_failed(outcome.stderr.trim().to_string()));
        }

        Ok(outcome)
    }

    /// Poll the child until it exits or the deadline passes. std has no
    /// native timed wait, so this loops on `try_wait` while reader threads
    /// drain stdout/stderr; a timed-out child is killed and its partial
    /// output kept.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<CommandOutcome> {
        use std::io::Read;
        use std::thread;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let mut timed_out = false;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        break child.wait().ok();
                    }
                    thread::sleep(Duration::from_millis(25));
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.connect_failed(format!("wait for command: {}", e)));
                }
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_reader.join().unwrap_or_default()).to_string();
        let stderr = String::from_utf8_lossy(&stderr_reader.join().unwrap_or_default()).to_string();

        let exit_code = if timed_out {
            EXIT_TIMEOUT
        } else {
            status.and_then(|s| s.code()).unwrap_or(-1)
        };

        Ok(CommandOutcome {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }

    fn connect_failed(&self, cause: String) -> Error {
        Error::ssh_connect_failed(
            self.target.host.clone(),
            self.target.port,
            self.target.container_id.clone(),
            cause,
        )
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderedCommand;

    fn local_client() -> SshClient {
        SshClient::new(Target::new("localhost", 22, None))
    }

    fn rendered(text: &str) -> RenderedCommand {
        RenderedCommand {
            text: text.to_string(),
            display: text.to_string(),
            execute_on: ExecuteOn::Proxmox,
        }
    }

    #[test]
    fn localhost_runs_locally_and_captures_output() {
        let outcome = local_client().execute(&rendered("echo hello")).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[test]
    fn multi_line_script_runs_through_stdin() {
        let outcome = local_client()
            .execute(&rendered("A=provost\necho \"$A\""))
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "provost");
    }

    #[test]
    fn nonzero_exit_is_an_outcome_not_an_error() {
        let outcome = local_client().execute(&rendered("exit 3")).unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
    }

    #[test]
    fn timeout_kills_and_keeps_partial_output() {
        let client =
            SshClient::with_timeout(Target::new("localhost", 22, None), Duration::from_millis(200));
        let outcome = client
            .execute(&rendered("echo partial; exec sleep 30"))
            .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, EXIT_TIMEOUT);
        assert_eq!(outcome.stdout.trim(), "partial");
    }

    #[test]
    fn lxc_args_wrap_remote_shell_in_lxc_attach() {
        let client = SshClient::new(Target::new("pve.lan", 22, Some("101".to_string())));
        let args = client.build_ssh_args(ExecuteOn::Lxc).unwrap();
        let tail: Vec<&str> = args.iter().map(|s| s.as_str()).rev().take(5).collect();
        assert_eq!(tail, vec!["/bin/sh", "--", "101", "-n", "lxc-attach"]);
    }

    #[test]
    fn lxc_without_container_id_is_invalid() {
        let client = SshClient::new(Target::new("pve.lan", 22, None));
        let err = client.build_ssh_args(ExecuteOn::Lxc).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::TargetInvalid);
    }

    #[test]
    fn nondefault_port_adds_p_flag() {
        let client = SshClient::new(Target::new("pve.lan", 2222, None));
        let args = client.build_ssh_args(ExecuteOn::Proxmox).unwrap();
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));

        let default_port = SshClient::new(Target::new("pve.lan", 22, None));
        let args = default_port.build_ssh_args(ExecuteOn::Proxmox).unwrap();
        assert!(!args.iter().any(|a| a == "-p"));
    }
}
