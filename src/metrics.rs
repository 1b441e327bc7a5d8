use std::fmt;
use std::io::{self, Write};

use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-residue mean loss and accuracy over minibatches of varying size.
///
/// Updates are incremental so the running values never hold large sums.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningMean {
    count: usize,
    loss: f64,
    accuracy: f64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// `batch_loss` is the mean over the batch's `residues`, `correct` a count.
    pub fn update(&mut self, residues: usize, batch_loss: f64, correct: usize) {
        if residues == 0 {
            return;
        }
        let weight = residues as f64;
        self.count += residues;
        let n = self.count as f64;
        self.loss += weight * (batch_loss - self.loss) / n;
        self.accuracy += (correct as f64 - weight * self.accuracy) / n;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn metrics(&self) -> EpochMetrics {
        EpochMetrics {
            log_p: self.loss,
            perplexity: self.loss.exp(),
            accuracy: self.accuracy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochMetrics {
    /// Mean negative log-likelihood per residue.
    pub log_p: f64,
    pub perplexity: f64,
    pub accuracy: f64,
}

pub fn epoch_digits(num_epochs: usize) -> usize {
    if num_epochs == 0 {
        1
    } else {
        num_epochs.ilog10() as usize + 1
    }
}

/// Tab separated training curve, one row per epoch and split.
pub struct ReportWriter<W: Write> {
    sink: W,
    digits: usize,
}

impl<W: Write> ReportWriter<W> {
    pub const HEADER: &'static str = "epoch\tsplit\tlog_p\tperplexity\taccuracy";

    pub fn new(sink: W, num_epochs: usize) -> Self {
        Self {
            sink,
            digits: epoch_digits(num_epochs),
        }
    }

    pub fn digits(&self) -> usize {
        self.digits
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(self.sink, "{}", Self::HEADER).context("failed to write report header")?;
        self.sink.flush().context("failed to flush report")
    }

    pub fn write_row(&mut self, epoch: usize, split: Split, metrics: &EpochMetrics) -> Result<()> {
        writeln!(
            self.sink,
            "{epoch:0width$}\t{split}\t{}\t{}\t{}",
            metrics.log_p,
            metrics.perplexity,
            metrics.accuracy,
            width = self.digits,
        )
        .context("failed to write report row")?;
        self.sink.flush().context("failed to flush report")
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

const PROGRESS_CLEAR_WIDTH: usize = 80;

/// Carriage-return progress line for one phase of an epoch, on stderr unless
/// another sink is given.
pub struct Progress<W: Write = io::Stderr> {
    sink: W,
    epoch: usize,
    num_epochs: usize,
    split: Split,
    total: usize,
    interval: usize,
    seen: usize,
    printed: bool,
}

impl Progress {
    /// An `interval` of 0 disables output.
    pub fn new(
        epoch: usize,
        num_epochs: usize,
        split: Split,
        total: usize,
        interval: usize,
    ) -> Self {
        Progress::with_sink(io::stderr(), epoch, num_epochs, split, total, interval)
    }
}

impl<W: Write> Progress<W> {
    pub fn with_sink(
        sink: W,
        epoch: usize,
        num_epochs: usize,
        split: Split,
        total: usize,
        interval: usize,
    ) -> Self {
        Self {
            sink,
            epoch,
            num_epochs,
            split,
            total,
            interval,
            seen: 0,
            printed: false,
        }
    }

    pub fn advance(&mut self, sequences: usize, running: &RunningMean) {
        let before = self.seen;
        self.seen += sequences;
        if self.interval == 0 || !crosses_interval(before, self.seen, self.interval) {
            return;
        }
        let fraction = if self.total == 0 {
            1.0
        } else {
            self.seen as f64 / self.total as f64
        };
        // progress output is best effort
        let _ = write!(
            self.sink,
            "# [{}/{}] {} {:.1}% loss={:.5}, acc={:.5}\r",
            self.epoch,
            self.num_epochs,
            self.split,
            fraction * 100.0,
            running.loss(),
            running.accuracy(),
        );
        let _ = self.sink.flush();
        self.printed = true;
    }

    pub fn finish(mut self) {
        if self.printed {
            let _ = write!(self.sink, "{}\r", " ".repeat(PROGRESS_CLEAR_WIDTH));
            let _ = self.sink.flush();
        }
    }
}

fn crosses_interval(before: usize, after: usize, interval: usize) -> bool {
    before / interval < after / interval
}
