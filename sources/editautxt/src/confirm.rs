//! Asks the operator, twice, whether the LOCKSS daemon is stopped. `au.txt` is read once and
//! written once, and nothing stops a running daemon from changing it in between.

use crate::error::{self, Result};
use snafu::{ensure, ResultExt};
use std::io::{BufRead, Write};

pub(crate) fn ask_daemon_stopped<R, W>(input: &mut R, output: &mut W) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    write!(output, "Are you sure the LOCKSS daemon is stopped? [yn] ")
        .and_then(|_| output.flush())
        .context(error::PromptWriteSnafu)?;
    let response = read_response(input)?;
    ensure!(response.as_deref() == Some("y"), error::DeclinedSnafu);

    writeln!(output, "Are you REALLY sure the LOCKSS daemon is stopped?")
        .and_then(|_| writeln!(output, "Type yes only if you are absolutely certain."))
        .and_then(|_| output.flush())
        .context(error::PromptWriteSnafu)?;
    let response = read_response(input)?;
    ensure!(response.as_deref() == Some("yes"), error::DeclinedSnafu);

    debug!("Operator confirmed the daemon is stopped");
    Ok(())
}

/// Reads one line of input without its terminator, or `None` at end of input.
fn read_response<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context(error::PromptReadSnafu)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}
