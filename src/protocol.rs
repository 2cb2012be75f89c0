//! Verbs and reply parsing of the OPUS pipe line protocol.
//!
//! Requests are single lines. Successful replies carry an `OK` line followed
//! by a value line, e.g. `OK\n42\n`; anything else is the instrument's error
//! text.

/// Connectivity probe; any reply proves the pipe is alive.
pub const PROBE: &str = "s_pipe";

/// Fetch the peak value of the last scan.
pub const READ_PEAK: &str = "READ_PKA";

/// `MACRO_RESULTS` code reported once a macro has finished.
pub const MACRO_DONE: i64 = 1;

/// `MACRO_RESULTS` code reported while a macro is still running.
pub const MACRO_RUNNING: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Instrument did not acknowledge the command, it responded with: {0:?}")]
    NotAcknowledged(String),

    #[error("Acknowledged reply carries no value: {0:?}")]
    MissingValue(String),

    #[error("Unrecognized macro status code {0:?}")]
    UnknownStatus(String),
}

pub fn run_macro(name: &str) -> String {
    format!("RUN_MACRO {name}")
}

pub fn macro_results(id: &str) -> String {
    format!("MACRO_RESULTS {id}")
}

pub fn kill_macro(id: &str) -> String {
    format!("KILL_MACRO {id}")
}

/// Extract the value line of an acknowledged reply.
///
/// The `OK` token is matched case-insensitively on its own line; the value is
/// the line that follows it. `OK` embedded in other text does not count, and
/// lines before the `OK` line are skipped, so for the usual `OK\n<value>\n`
/// reply the value is the second line.
pub fn parse_reply(response: &str) -> Result<&str, ProtocolError> {
    let mut lines = response.lines().map(str::trim);
    if !lines.any(|line| line.eq_ignore_ascii_case("OK")) {
        return Err(ProtocolError::NotAcknowledged(response.to_string()));
    }
    match lines.next() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ProtocolError::MissingValue(response.to_string())),
    }
}

/// Parse a `MACRO_RESULTS` reply into its status code.
pub fn parse_macro_status(response: &str) -> Result<i64, ProtocolError> {
    let value = parse_reply(response)?;
    value
        .parse()
        .map_err(|_| ProtocolError::UnknownStatus(value.to_string()))
}
