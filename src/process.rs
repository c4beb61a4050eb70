use crate::error::Result;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of one supervised subprocess invocation
#[derive(Debug)]
pub struct SupervisedOutput {
    /// Captured standard output, lossily decoded
    pub stdout: String,
    /// Captured standard error, lossily decoded
    pub stderr: String,
    /// Whether the invocation hit its wall-clock limit and was killed
    pub timed_out: bool,
    /// Whether the process exited with a zero status (diagnostic only)
    pub exit_ok: bool,
}

/// Runs a subprocess with an explicit argument list, environment overrides,
/// and a hard wall-clock limit.
///
/// The ambient process environment is inherited but never mutated; overrides
/// apply to the child only. On timeout the child is killed and a
/// `SupervisedOutput` with `timed_out` set is returned rather than an error,
/// leaving the success policy to the caller.
pub async fn run_supervised(
    program: &Path,
    args: &[OsString],
    env_overrides: &[(String, OsString)],
    limit: Duration,
) -> Result<SupervisedOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env_overrides {
        command.env(key, value);
    }

    match timeout(limit, command.output()).await {
        Ok(output) => {
            let output = output?;
            Ok(SupervisedOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
                exit_ok: output.status.success(),
            })
        }
        Err(_) => Ok(SupervisedOutput {
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
            exit_ok: false,
        }),
    }
}
