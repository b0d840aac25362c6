use colored::*;
use std::fmt::Display;
use v2mgr_core::{ManagerInitError, OperationError, RpcFailure};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// Outcome of `sync-protos`: how many files landed where.
pub struct SyncReport<'a>(pub usize, pub &'a std::path::Path);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<RpcFailure> for FormattedString {
    fn from(failure: RpcFailure) -> Self {
        FormattedString(format!(
            "{} code={:?} ({}) details={:?}",
            "gRPC Failed:".red().bold(),
            failure.code(),
            failure.code,
            failure.details
        ))
    }
}

impl From<ManagerInitError> for FormattedString {
    fn from(err: ManagerInitError) -> Self {
        error_block("Setup Failed:", err)
    }
}

impl From<OperationError> for FormattedString {
    fn from(err: OperationError) -> Self {
        error_block("Operation Failed:", err)
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line.
        error_block("Sync Failed:", format!("{err:#}"))
    }
}

impl From<SyncReport<'_>> for FormattedString {
    fn from(SyncReport(count, dest): SyncReport<'_>) -> Self {
        if count == 0 {
            return FormattedString("No .proto files found.".yellow().to_string());
        }

        FormattedString(format!(
            "Copied {} schema files into {}",
            count.to_string().green(),
            dest.display().to_string().green()
        ))
    }
}

fn error_block(title: &str, err: impl Display) -> FormattedString {
    FormattedString(format!("{}\n\n'{}'", title.red().bold(), err))
}
