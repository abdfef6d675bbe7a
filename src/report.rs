use crate::error::LineError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// A row that produced no triples, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub input: String,
    pub line: u64,
    pub kind: &'static str,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(input: &Path, error: &LineError) -> Self {
        Self {
            input: input.display().to_string(),
            line: error.line,
            kind: error.error.kind(),
            message: error.error.to_string(),
        }
    }
}

/// CSV report of rejected rows: `input,line,kind,message`.
pub struct ErrorReport {
    writer: csv::Writer<BufWriter<File>>,
    written: u64,
}

impl ErrorReport {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create error report: {:?}", path))?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer
            .write_record(["input", "line", "kind", "message"])
            .context("Failed to write error report header")?;
        Ok(Self { writer, written: 0 })
    }

    pub fn write(&mut self, record: &ErrorRecord) -> Result<()> {
        let mut line = itoa::Buffer::new();
        self.writer
            .write_record([
                record.input.as_str(),
                line.format(record.line),
                record.kind,
                record.message.as_str(),
            ])
            .context("Failed to write error report row")?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush().context("Failed to flush error report")?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.csv");
        let error = LineError::new(
            12,
            ConvertError::malformed_value("quantity", "12abc", "bad, really bad"),
        );

        let mut report = ErrorReport::create(&path).unwrap();
        report
            .write(&ErrorRecord::new(Path::new("batch.qs"), &error))
            .unwrap();
        assert_eq!(report.finish().unwrap(), 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "line");
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "batch.qs");
        assert_eq!(&rows[0][1], "12");
        assert_eq!(&rows[0][2], "MalformedValue");
        assert!(rows[0][3].contains("bad, really bad"));
    }

    #[test]
    fn empty_report_has_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.csv");
        ErrorReport::create(&path).unwrap().finish().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "input,line,kind,message\n");
    }
}
