//! Terminal prompt for interactive runs.

use super::policy::{Decision, DecisionSource};
use datamosh_h264::NalUnit;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use tracing::warn;

/// Asks on `output` and reads one line from `input` per decision.
///
/// A failed read or end of input keeps the I-frame, so a closed terminal
/// never destroys frames.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<StdinLock<'static>, Stdout> {
    /// Prompt on the process's standard input and output.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, unit: &NalUnit) -> io::Result<Option<String>> {
        match unit.timestamp.and_then(|t| t.as_secs_f64()) {
            Some(secs) => write!(
                self.output,
                "Nullify I-frame at {:.2} seconds? (y/n/a): ",
                secs
            )?,
            None => write!(
                self.output,
                "Nullify I-frame at offset {} ({} bytes)? (y/n/a): ",
                unit.offset, unit.length
            )?,
        }
        self.output.flush()?;

        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(answer))
    }
}

impl<R: BufRead, W: Write> DecisionSource for Prompt<R, W> {
    fn decide(&mut self, unit: &NalUnit) -> Decision {
        match self.ask(unit) {
            Ok(Some(answer)) => Decision::from_answer(&answer),
            Ok(None) => {
                warn!(offset = unit.offset, "No answer on input, keeping I-frame");
                Decision::No
            }
            Err(e) => {
                warn!(offset = unit.offset, error = %e, "Error reading answer, keeping I-frame");
                Decision::No
            }
        }
    }
}
