//! Training loggers for CPO.
//!
//! Provides different logging backends for per-iteration records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::metrics::history::IterationRecord;

/// Logger trait for different logging backends.
pub trait MetricsLogger {
    /// Log one iteration.
    fn log(&mut self, record: &IterationRecord);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Logger that drops everything.
#[derive(Debug, Default)]
pub struct NullLogger;

impl MetricsLogger for NullLogger {
    fn log(&mut self, _record: &IterationRecord) {}

    fn flush(&mut self) {}
}

/// Console logger with pretty formatting.
pub struct ConsoleLogger {
    log_interval: usize,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a new console logger.
    ///
    /// # Arguments
    ///
    /// * `log_interval` - Iterations between log entries
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            start_time: Instant::now(),
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>6} {:>10} {:>8} {:>10} {:>8} {:>10} {:>10} {:>6} {:>8} {:>10}",
            "Iter", "EnvSteps", "Episodes", "Return", "Cost", "VLoss", "CLoss", "Step", "Branch", "KL"
        );
        println!("{}", "-".repeat(96));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, record: &IterationRecord) {
        if record.iteration % self.log_interval != 0 {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let step = if record.update.accepted {
            format!("{:.3}", record.update.step_size)
        } else {
            "rej".to_string()
        };

        println!(
            "{:>6} {:>10} {:>8} {:>10.3} {:>8.3} {:>10.4} {:>10.4} {:>6} {:>8} {:>10.2e}",
            record.iteration,
            record.env_steps,
            record.episodes,
            record.avg_return,
            record.avg_cost,
            record.value_loss,
            record.cost_value_loss,
            step,
            format!("{:?}", record.update.branch),
            record.update.kl,
        );
    }

    fn flush(&mut self) {
        println!(
            "Finished in {:.1}s",
            self.start_time.elapsed().as_secs_f32()
        );
    }
}

/// CSV file logger for analysis.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    /// Create a new CSV logger.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "iteration,env_steps,episodes,batch_len,avg_return,avg_cost,value_loss,cost_value_loss,accepted,step_size,branch,kl,q,cg_iterations,elapsed_secs"
        )?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, record: &IterationRecord) {
        let elapsed = self.start_time.elapsed().as_secs_f32();

        if let Err(e) = writeln!(
            self.writer,
            "{},{},{},{},{:.4},{:.4},{:.6},{:.6},{},{:.6},{:?},{:.6e},{:.6e},{},{:.2}",
            record.iteration,
            record.env_steps,
            record.episodes,
            record.batch_len,
            record.avg_return,
            record.avg_cost,
            record.value_loss,
            record.cost_value_loss,
            record.update.accepted,
            record.update.step_size,
            record.update.branch,
            record.update.kl,
            record.update.q,
            record.update.cg_iterations,
            elapsed
        ) {
            log::warn!("Failed to write CSV record: {}", e);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, record: &IterationRecord) {
        for logger in &mut self.loggers {
            logger.log(record);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
