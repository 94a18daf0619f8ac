//! Small process-related helpers shared across the workspace.

use std::ffi::OsStr;
use std::process::ExitStatus;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a pipeline stage.
///
/// The child gets `CREATE_NO_WINDOW` on Windows and is killed when its handle is
/// dropped, so a handle lost on an early return never leaves an orphan behind.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Turn a child's stdout into the stdin of the next process.
///
/// The descriptor is handed over as-is: bytes travel through the kernel pipe
/// between the two children and never through this process.
#[cfg(feature = "tokio")]
pub fn chain_stdout(stdout: tokio::process::ChildStdout) -> std::io::Result<std::process::Stdio> {
    stdout.try_into()
}

/// Render an exit status for logs: `code 1`, `signal 9` or `unknown`.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }

    "unknown".to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn describe_exit_reports_code() {
        let status = tokio_command("sh")
            .args(["-c", "exit 3"])
            .status()
            .await
            .unwrap();
        assert_eq!(describe_exit(&status), "code 3");
    }

    #[tokio::test]
    async fn describe_exit_reports_signal() {
        let mut child = tokio_command("sleep").arg("30").spawn().unwrap();
        child.kill().await.unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(describe_exit(&status), "signal 9");
    }

    #[tokio::test]
    async fn chained_stdout_feeds_next_process() {
        let mut producer = tokio_command("sh")
            .args(["-c", "printf hello"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdin = chain_stdout(producer.stdout.take().unwrap()).unwrap();

        let output = tokio_command("cat")
            .stdin(stdin)
            .stdout(Stdio::piped())
            .output()
            .await
            .unwrap();

        producer.wait().await.unwrap();
        assert_eq!(output.stdout, b"hello");
    }
}
