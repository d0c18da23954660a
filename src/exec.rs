//! Subprocess capture and failure rendering for the control binaries.
//!
//! Cluster operations shell out to `pg_ctl` and `initdb`. Output is always
//! captured rather than inherited so failures can be attached to the error
//! the caller sees, truncated to keep diagnostics readable.

use std::borrow::Cow;
use std::io;
use std::process::{Command, Output, Stdio};
use tracing::debug;

const LOG_TARGET: &str = "pgdev::exec";

pub(crate) const OUTPUT_CHAR_LIMIT: usize = 2_048;
const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Runs the command to completion, capturing stdout and stderr.
///
/// The returned [`Output`] carries the exit status for the caller to
/// interpret; a non-zero exit is not an error at this layer. Launch
/// failures (missing binary, permissions) surface as [`io::Error`].
pub(crate) fn run_capture(cmd: &mut Command) -> io::Result<Output> {
    debug!(target: LOG_TARGET, command = ?cmd, "running control binary");
    let output = cmd.stdin(Stdio::null()).output()?;
    debug!(target: LOG_TARGET, status = ?output.status, "control binary finished");
    Ok(output)
}

/// Renders a subprocess failure with truncated stdout and stderr attached.
pub(crate) fn render_failure(context: &str, output: &Output) -> String {
    let code = output
        .status
        .code()
        .map_or_else(|| "killed by signal".to_owned(), |code| code.to_string());
    let stdout = truncate_output(String::from_utf8_lossy(&output.stdout));
    let stderr = truncate_output(String::from_utf8_lossy(&output.stderr));
    format!("{context}: exit status {code}\nstdout: {stdout}\nstderr: {stderr}")
}

fn truncate_output(text: Cow<'_, str>) -> String {
    let mut out = String::with_capacity(OUTPUT_CHAR_LIMIT + TRUNCATION_SUFFIX.len());
    let mut chars = text.chars();
    for _ in 0..OUTPUT_CHAR_LIMIT {
        match chars.next() {
            Some(ch) => out.push(ch),
            None => return text.into_owned(),
        }
    }
    if chars.next().is_none() {
        return text.into_owned();
    }
    out.push_str(TRUNCATION_SUFFIX);
    out
}
