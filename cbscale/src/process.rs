//! External tool invocation with a deadline
//!
//! Output pipes are drained on reader threads while the child runs, so a
//! chatty tool cannot block on a full pipe before the deadline is checked.

use std::{
    io::Read,
    process::{Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Captured result of a child that exited before its deadline
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion, killing it once `timeout` has elapsed.
///
/// A child that cannot be started is an [`Error::ExternalCall`] for `label`;
/// one that outlives `timeout` is killed and reported as
/// [`Error::OperationTimeout`].
pub fn run_with_timeout(command: &mut Command, label: &str, timeout: Duration) -> Result<ProcessOutput> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::external(
                label,
                format!("failed to execute {:?}: {e}", command.get_program()),
            )
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!("{label} still running after {timeout:?}, killing it");
            // The child may exit on its own between the wait and the kill.
            let _ = child.kill();
            let _ = child.wait();
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            return Err(Error::timeout(label, millis));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Io(e));
        }
    };
    debug!("{label} exited with {status}");

    Ok(ProcessOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
