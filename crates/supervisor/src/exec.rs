use serde_json::Value;

/// Output of a one-shot worker subcommand.
///
/// Workers print JSON for machine-readable subcommands and plain text for the
/// rest, so callers get whichever the output turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutput {
    Data(Value),
    Text(String),
}

/// Failure modes of a one-shot worker subcommand.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("worker command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("worker command `{command}` timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("failed to run worker command")]
    Io(#[from] std::io::Error),
}

impl ExecOutput {
    /// Parses captured stdout, preferring JSON when it decodes.
    #[must_use]
    pub fn from_stdout(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::Data(value),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_stdout_becomes_data() {
        let output = ExecOutput::from_stdout("{\"profit\": 1.5}\n");
        assert_eq!(output, ExecOutput::Data(json!({"profit": 1.5})));
    }

    #[test]
    fn plain_stdout_becomes_text() {
        let output = ExecOutput::from_stdout("  3 trades closed  \n");
        assert_eq!(output, ExecOutput::Text("3 trades closed".to_string()));
    }
}
