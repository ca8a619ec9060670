//! Simulated 8×8 Grid Example
//!
//! Runs the complete monitor loop against a simulated touch panel: two 8:1
//! select muxes, one LC tank sensor and a clock that only advances when the
//! engine waits.
//!
//! ## What You'll Learn
//!
//! - Implementing `CapacitanceSensor` and `Multiplexer` for your hardware
//! - Building a `CapacitanceMonitor` from a `SystemConfig` preset
//! - Reading the baseline after calibration
//! - Streaming delta frames as CSV and reacting to touch events
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_simulated_grid
//! ```

use std::cell::Cell;
use std::rc::Rc;

use capgrid_core::{
    config::{SystemConfig, TouchConfig},
    convert::LcTank,
    device::{CapacitanceSensor, DeviceConfig, DeviceError},
    monitor::CapacitanceMonitor,
    mux::{Multiplexer, SelectBits},
    output::{IoWriter, OutputSink},
    reading::Channel,
    time::SimulatedClock,
    touch::TouchEvent,
    ScanResult,
};

/// Selected cell and the cell a finger is resting on
#[derive(Default)]
struct Panel {
    row: Cell<u8>,
    col: Cell<u8>,
    finger: Cell<Option<(u8, u8)>>,
}

impl Panel {
    /// Electrode capacitance in pF: a gentle gradient, +6 pF under a finger
    fn picofarads(&self) -> f64 {
        let (row, col) = (self.row.get(), self.col.get());
        let mut pf = 100.0 + f64::from(row) * 0.5 + f64::from(col) * 0.25;
        if self.finger.get() == Some((row, col)) {
            pf += 6.0;
        }
        pf
    }
}

struct PanelSensor {
    panel: Rc<Panel>,
    tank: LcTank,
}

impl CapacitanceSensor for PanelSensor {
    fn configure(&mut self, config: &DeviceConfig) -> bool {
        println!("  device configured, channel mask {:#06b}", config.channel_mask);
        true
    }

    fn read_channel(&mut self, _channel: u8) -> Result<u32, DeviceError> {
        self.tank
            .code_for_picofarads(self.panel.picofarads())
            .map(|raw| raw.code())
            .ok_or(DeviceError::NotReady)
    }
}

struct PanelMux {
    panel: Rc<Panel>,
    row: bool,
}

impl Multiplexer for PanelMux {
    fn set_select_lines(&mut self, lines: SelectBits) -> ScanResult<()> {
        if self.row {
            self.panel.row.set(lines.bits());
        } else {
            self.panel.col.set(lines.bits());
        }
        Ok(())
    }
}

fn main() -> ScanResult<()> {
    println!("Capgrid Simulated Grid Example");
    println!("==============================\n");

    let panel = Rc::new(Panel::default());

    // Grid preset with touch detection on
    let mut config = SystemConfig::grid_8x8();
    config.touch = Some(TouchConfig::default());

    let tank = config.scan.converter.unwrap_or_default();
    let sensor = PanelSensor { panel: Rc::clone(&panel), tank };
    let row_mux = PanelMux { panel: Rc::clone(&panel), row: true };
    let col_mux = PanelMux { panel: Rc::clone(&panel), row: false };

    println!("Bringing up the scanner:");
    let mut monitor = CapacitanceMonitor::new(sensor, row_mux, col_mux, SimulatedClock::new(0), &config)?;
    println!("  {} cells planned\n", monitor.scanner().plan().len());

    println!(
        "Calibrating ({} sweeps, {} ms apart):",
        config.calibration.target_samples(),
        config.calibration.interval_ms
    );
    let baseline = monitor.calibrate()?;
    for entry in baseline.channels().iter().take(4) {
        println!("  {}: {:.4} pF (spread {:.4})", entry.channel, entry.value, entry.spread);
    }
    println!("  ... {} channels in total\n", baseline.channels().len());

    // Press R3C5 for three sweeps, then lift
    let touched = Channel::cell(3, 5);
    let mut sink = config.csv_sink(IoWriter(std::io::stdout()));
    let mut shown = false;

    println!("Monitoring:");
    for sweep in 0..8 {
        panel.finger.set(if (2..5).contains(&sweep) { Some((3, 5)) } else { None });

        let frame = monitor.next_frame()?;
        if !shown && frame.deltas.get(touched).is_some_and(|d| d.ratio > 0.0) {
            // One frame in full so the CSV shape is visible
            sink.emit_deltas(&frame.deltas);
            shown = true;
        }

        for event in &frame.events {
            match event {
                TouchEvent::Pressed(channel) => println!("  sweep {}: {} pressed", sweep, channel),
                TouchEvent::Released(channel) => println!("  sweep {}: {} released", sweep, channel),
            }
        }
    }

    println!("\n  {} sweeps completed, {} write errors", monitor.scanner().cycles_completed(), sink.write_errors());
    Ok(())
}
