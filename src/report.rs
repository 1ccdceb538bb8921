//! Report assembly. Pure: violations in, document out; the only failure
//! mode is the output sink.

use std::fmt::Write as _;
use std::io;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::engine::Violation;

#[derive(Debug, Serialize)]
pub struct Report {
    pub violations: Vec<Violation>,
}

impl Report {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }

    pub fn write_to<W: io::Write>(&self, mut sink: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut sink, self).context("failed to write report")?;
        sink.write_all(b"\n").context("failed to write report")?;
        Ok(())
    }

    /// One human-readable line per violation, e.g.
    /// `OSHA 29 CFR 1926.100: Head protection required (confidence 0.91)`.
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            return "No violations confirmed.".to_string();
        }
        let mut out = String::new();
        for v in &self.violations {
            let _ = write!(out, "{} {}", v.standard, v.citation);
            if let Some(description) = &v.description {
                let _ = write!(out, ": {}", description);
            }
            let _ = writeln!(out, " (confidence {:.2})", v.confidence);
        }
        out
    }
}
