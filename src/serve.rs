use std::io::{BufRead, Write};

use anyhow::Result;

use crate::concurrency::TreeLockService;
use crate::json_output::JsonOutput;
use crate::operation::Request;

/// Answer one JSON request per input line until EOF.
///
/// Each non-blank line yields exactly one output line. A malformed line is
/// answered with an error object and the loop keeps going. Returns the
/// number of lines answered.
pub fn serve_lines<R: BufRead, W: Write>(service: &TreeLockService, reader: R, mut writer: W) -> Result<usize> {
    let mut answered = 0;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(line) {
            Ok(request) => match request.into_mutation() {
                Some((op, body)) => JsonOutput::response(&service.handle(op, &body)),
                None => JsonOutput::tree(&service.snapshot()),
            },
            Err(e) => {
                log::warn!("Malformed request line: {}", e);
                JsonOutput::error(&e.to_string(), "malformed_request")
            }
        };

        writeln!(writer, "{}", reply)?;
        writer.flush()?;
        answered += 1;
    }

    Ok(answered)
}
