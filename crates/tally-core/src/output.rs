//! Report serialization.
//!
//! Count reports go out either as a single JSON document (optionally
//! pretty-printed) or as JSON Lines, one report per line, so that several
//! runs can be appended to the same file.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::types::CountReport;

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per report
    #[default]
    Json,
    /// One compact JSON object per line
    Jsonl,
}

/// Writes [`CountReport`]s to any `Write` sink.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    /// Serialize one report followed by a newline.
    pub fn write(&mut self, report: &CountReport) -> io::Result<()> {
        let pretty = self.pretty && self.format == OutputFormat::Json;
        if pretty {
            serde_json::to_writer_pretty(&mut self.writer, report).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Detection;

    fn report(count: usize) -> CountReport {
        CountReport {
            source: None,
            text: "apple".to_string(),
            exemplars: 1,
            label: "Detected instances predicted with text and 1 visual exemplar.".to_string(),
            count,
            detections: (0..count)
                .map(|i| Detection {
                    bbox: [0.1 * i as f32, 0.2, 0.05, 0.05],
                    score: 0.9,
                })
                .collect(),
            logits: None,
            note: Some("orchard".to_string()),
        }
    }

    #[test]
    fn test_write_json() {
        let mut buffer = Vec::new();
        let mut writer = ReportWriter::new(&mut buffer, OutputFormat::Json, false);
        writer.write(&report(2)).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("\"count\":2"));
        assert!(output.contains("\"note\":\"orchard\""));
    }

    #[test]
    fn test_jsonl_ignores_pretty() {
        let mut buffer = Vec::new();
        let mut writer = ReportWriter::new(&mut buffer, OutputFormat::Jsonl, true);
        writer.write(&report(1)).unwrap();
        writer.write(&report(3)).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: CountReport = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.count, 3);
    }

    #[test]
    fn test_pretty_json_spans_lines() {
        let mut pretty = Vec::new();
        ReportWriter::new(&mut pretty, OutputFormat::Json, true)
            .write(&report(0))
            .unwrap();
        assert!(String::from_utf8(pretty).unwrap().lines().count() > 1);

        let mut compact = Vec::new();
        ReportWriter::new(&mut compact, OutputFormat::Json, false)
            .write(&report(0))
            .unwrap();
        assert_eq!(String::from_utf8(compact).unwrap().lines().count(), 1);
    }
}
