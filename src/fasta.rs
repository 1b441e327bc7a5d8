use std::io::BufRead;

use anyhow::{Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: Vec<u8>,
    pub sequence: Vec<u8>,
}

/// Streams records out of a FASTA file without holding the whole file.
///
/// `#` lines are comments. Sequence lines are upper-cased and joined. Lines
/// that appear before the first header are dropped.
pub struct FastaReader<R> {
    reader: R,
    line: Vec<u8>,
    pending_name: Option<Vec<u8>>,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            pending_name: None,
            line_number: 0,
            done: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<FastaRecord>> {
        let mut sequence = Vec::new();

        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .with_context(|| format!("failed to read FASTA line {}", self.line_number + 1))?;
            if read == 0 {
                self.done = true;
                return Ok(self.pending_name.take().map(|name| FastaRecord { name, sequence }));
            }
            self.line_number += 1;

            if self.line.starts_with(b"#") {
                continue;
            }
            let line = self.line.trim_ascii();

            if let Some(header) = line.strip_prefix(b">") {
                let next_name = header.to_vec();
                if let Some(name) = self.pending_name.replace(next_name) {
                    return Ok(Some(FastaRecord { name, sequence }));
                }
            } else if self.pending_name.is_some() {
                sequence.extend(line.iter().map(u8::to_ascii_uppercase));
            }
        }
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<FastaRecord> {
        FastaReader::new(input.as_bytes())
            .collect::<Result<Vec<_>>>()
            .expect("parse fasta")
    }

    #[test]
    fn joins_multiline_sequences() {
        let records = parse(">first desc\nACD\nefg\n>second\nKLM\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, b"first desc");
        assert_eq!(records[0].sequence, b"ACDEFG");
        assert_eq!(records[1].name, b"second");
        assert_eq!(records[1].sequence, b"KLM");
    }

    #[test]
    fn skips_comments_and_leading_sequence() {
        let records = parse("ORPHAN\n# comment\n>a\n  AC \r\n# another\nDE");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, b"ACDE");
    }

    #[test]
    fn keeps_records_without_residues() {
        let records = parse(">empty\n>full\nA\n");
        assert_eq!(records[0].sequence, b"");
        assert_eq!(records[1].sequence, b"A");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("# only a comment\n").is_empty());
    }
}
