//! JSON-lines tool server

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use sheetrelay::tools::answer;
use sheetrelay::{Executor, OperationError, Outcome, ToolCall, ToolResponse};
use tracing::{debug, info, warn};

/// Answer one [`ToolCall`] per input line until the input ends.
///
/// Lines that do not parse get an `invalid_request` answer with id 0.
/// Returns the number of calls answered.
pub fn serve(executor: &Executor<'_>, input: impl BufRead, mut output: impl Write) -> Result<usize> {
    let mut answered = 0;
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => {
                debug!(id = call.id, tool = call.request.name(), "tool call");
                answer(executor, call)
            }
            Err(e) => {
                warn!(error = %e, "unparseable request");
                ToolResponse {
                    id: 0,
                    outcome: Outcome::failed(&OperationError::invalid(format!(
                        "malformed tool call: {e}"
                    ))),
                }
            }
        };

        serde_json::to_writer(&mut output, &response).context("Failed to encode response")?;
        writeln!(output).context("Failed to write response")?;
        output.flush().context("Failed to write response")?;
        answered += 1;
    }
    info!(answered, "input closed");
    Ok(answered)
}
