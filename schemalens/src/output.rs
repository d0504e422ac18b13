//! JSON output for command results.

use crate::cli::OutputArgs;
use anyhow::Context;
use serde::Serialize;
use std::io::Write;

/// Serializes `value` as compact or pretty JSON.
///
/// # Errors
/// Returns an error if the value cannot be serialized.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("JSON serialization failed")
}

/// Writes `value` to the output file, or to stdout when none is set.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub async fn emit<T: Serialize>(value: &T, args: &OutputArgs) -> anyhow::Result<()> {
    let mut json = render(value, args.pretty)?;
    json.push('\n');

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            tracing::info!("Output written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(json.as_bytes())
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
