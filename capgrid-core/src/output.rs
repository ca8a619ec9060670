//! Output sinks for scan cycles and delta frames
//!
//! Output is push-only: the engine hands a finished cycle to the sink and
//! moves on. There is no acknowledgement and no back-pressure.
//!
//! ## CSV Framings
//!
//! Per record, one line per channel:
//!
//! ```text
//! Timestamp,Row_index,Column_index,Node_Value      (grids)
//! 1250,0,3,101.2764
//!
//! Timestamp,Channel_index,Node_Value               (single mux / direct)
//! 1250,3,101.2764
//! ```
//!
//! Per cycle, one line per sweep in scan order, stamped with the time of the
//! last reading:
//!
//! ```text
//! Timestamp,CH0,CH1,CH2,CH3
//! 1250,101.2764,99.8120,100.0043,102.5511
//! ```
//!
//! Delta frames use one line per tracked channel:
//!
//! ```text
//! timestamp,channel,current,delta,ratio
//! 11300,R2C5,106.3180,5.0417,0.049783
//! ```
//!
//! Values are picofarads with four decimals when the scanner converts, raw
//! codes otherwise.

use core::fmt::{self, Write};

use crate::calibration::DeltaFrame;
use crate::reading::{Channel, Measurement};
use crate::scanner::ScanCycle;

/// Consumer of scan output
pub trait OutputSink {
    /// Called once per completed sweep
    fn emit_cycle(&mut self, cycle: &ScanCycle);

    /// Called once per post-calibration delta frame
    fn emit_deltas(&mut self, frame: &DeltaFrame) {
        let _ = frame;
    }
}

impl<O: OutputSink + ?Sized> OutputSink for &mut O {
    fn emit_cycle(&mut self, cycle: &ScanCycle) {
        (**self).emit_cycle(cycle)
    }

    fn emit_deltas(&mut self, frame: &DeltaFrame) {
        (**self).emit_deltas(frame)
    }
}

/// Line granularity of the scan CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Framing {
    /// One line per channel reading
    #[default]
    PerRecord,
    /// One line per full sweep
    PerCycle,
}

/// Output surface settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputConfig {
    /// Line granularity of scan output
    pub framing: Framing,
    /// Write a column header before the first line
    pub header: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { framing: Framing::PerRecord, header: true }
    }
}

/// Newline-terminated CSV over any `core::fmt::Write`
pub struct CsvSink<W> {
    writer: W,
    config: OutputConfig,
    scan_header_written: bool,
    delta_header_written: bool,
    write_errors: u32,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, config: OutputConfig) -> Self {
        Self {
            writer,
            config,
            scan_header_written: false,
            delta_header_written: false,
            write_errors: 0,
        }
    }

    /// Lines that failed to write
    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn record(&mut self, result: fmt::Result) {
        if result.is_err() {
            self.write_errors = self.write_errors.saturating_add(1);
            log_warn!("CSV line dropped, {} so far", self.write_errors);
        }
    }

    fn write_cycle(&mut self, cycle: &ScanCycle) -> fmt::Result {
        let Some(first) = cycle.measurements().first() else {
            return Ok(());
        };
        let grid = first.channel.as_cell().is_some();

        match self.config.framing {
            Framing::PerRecord => {
                if self.config.header && !self.scan_header_written {
                    if grid {
                        self.writer.write_str("Timestamp,Row_index,Column_index,Node_Value\n")?;
                    } else {
                        self.writer.write_str("Timestamp,Channel_index,Node_Value\n")?;
                    }
                    self.scan_header_written = true;
                }
                for m in cycle.iter() {
                    write!(self.writer, "{},", m.timestamp_ms)?;
                    match m.channel {
                        Channel::Cell { row, col } => write!(self.writer, "{},{},", row, col)?,
                        Channel::Index(index) => write!(self.writer, "{},", index)?,
                    }
                    write_value(&mut self.writer, m)?;
                    self.writer.write_char('\n')?;
                }
            }
            Framing::PerCycle => {
                if self.config.header && !self.scan_header_written {
                    self.writer.write_str("Timestamp")?;
                    for m in cycle.iter() {
                        write!(self.writer, ",{}", m.channel)?;
                    }
                    self.writer.write_char('\n')?;
                    self.scan_header_written = true;
                }
                let stamp = cycle.iter().map(|m| m.timestamp_ms).max().unwrap_or(0);
                write!(self.writer, "{}", stamp)?;
                for m in cycle.iter() {
                    self.writer.write_char(',')?;
                    write_value(&mut self.writer, m)?;
                }
                self.writer.write_char('\n')?;
            }
        }
        Ok(())
    }

    fn write_deltas(&mut self, frame: &DeltaFrame) -> fmt::Result {
        if self.config.header && !self.delta_header_written {
            self.writer.write_str("timestamp,channel,current,delta,ratio\n")?;
            self.delta_header_written = true;
        }
        for d in frame.iter() {
            writeln!(
                self.writer,
                "{},{},{:.4},{:.4},{:.6}",
                d.timestamp_ms, d.channel, d.current, d.delta, d.ratio
            )?;
        }
        Ok(())
    }
}

fn write_value<W: Write>(writer: &mut W, m: &Measurement) -> fmt::Result {
    match m.capacitance_pf {
        Some(pf) => write!(writer, "{:.4}", pf),
        None => write!(writer, "{}", m.raw),
    }
}

impl<W: Write> OutputSink for CsvSink<W> {
    fn emit_cycle(&mut self, cycle: &ScanCycle) {
        let result = self.write_cycle(cycle);
        self.record(result);
    }

    fn emit_deltas(&mut self, frame: &DeltaFrame) {
        let result = self.write_deltas(frame);
        self.record(result);
    }
}

/// `core::fmt::Write` over a `std::io::Write` (requires std)
#[cfg(feature = "std")]
pub struct IoWriter<W>(pub W);

#[cfg(feature = "std")]
impl<W: std::io::Write> Write for IoWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Sink that keeps everything it is given (requires std)
///
/// Useful for tests and for host tools that post-process a run.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Every emitted scan cycle, oldest first
    pub cycles: std::vec::Vec<ScanCycle>,
    /// Every emitted delta frame, oldest first
    pub frames: std::vec::Vec<DeltaFrame>,
}

#[cfg(feature = "std")]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "std")]
impl OutputSink for MemorySink {
    fn emit_cycle(&mut self, cycle: &ScanCycle) {
        self.cycles.push(cycle.clone());
    }

    fn emit_deltas(&mut self, frame: &DeltaFrame) {
        self.frames.push(frame.clone());
    }
}
