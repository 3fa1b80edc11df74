//! Remote execution and file transfer.
//!
//! Every call opens its own session and tears it down before returning,
//! whatever the outcome. Callers never hold a session across operations.

mod ssh;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use ssh::SshChannel;

/// Captured output of a command that ran to completion on the remote side.
///
/// Remote exit codes are not interpreted: a command that printed to stderr
/// still yields an `ExecOutput`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// True when stdout has any non-whitespace content.
    pub fn has_stdout(&self) -> bool {
        !self.stdout.trim().is_empty()
    }
}

/// Abstraction over remote command execution and file placement.
///
/// Implemented by `SshChannel` for real hosts and by scripted channels in
/// tests.
pub trait RemoteChannel: Send + Sync + 'static {
    /// Run one command, waiting at most `timeout` for it to finish.
    fn execute(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ExecOutput>> + Send;

    /// Copy a local file to `remote_path` on the host.
    fn upload(
        &self,
        host: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create or replace `remote_path` with `content`.
    fn write_remote_file(
        &self,
        host: &str,
        remote_path: &str,
        content: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Quote a value for inclusion in a POSIX shell command line.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_are_left_alone() {
        assert_eq!(shell_quote("/home/kali/kick.log"), "/home/kali/kick.log");
        assert_eq!(shell_quote("us-nyc"), "us-nyc");
    }

    #[test]
    fn metacharacters_are_quoted() {
        assert_eq!(shell_quote("python.*kick.py"), "'python.*kick.py'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
