//! Simulated sensor board for integration tests
//!
//! Provides:
//! - A board with row/column mux state and a per-electrode capacitance map
//! - An oscillator model that keeps reporting the previous electrode until
//!   it has had `lock_us` to re-lock on the new load
//! - A clock whose delays advance board time
//! - An event log of every select-line change and device read

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use capgrid_core::convert::LcTank;
use capgrid_core::device::{CapacitanceSensor, DeviceConfig, DeviceError};
use capgrid_core::mux::{Multiplexer, SelectBits};
use capgrid_core::time::{TimeSource, Timestamp};
use capgrid_core::ScanResult;
use embedded_hal::delay::DelayNs;

/// Electrode key: (device channel, row or single-mux bits, column bits)
pub type Electrode = (u8, u8, u8);

/// Capacitance of any electrode not set explicitly (pF)
pub const DEFAULT_PF: f64 = 100.0;

/// Something that happened on the board, stamped in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEvent {
    Row { bits: u8, at_us: u64 },
    Col { bits: u8, at_us: u64 },
    Read { channel: u8, at_us: u64 },
}

struct BoardState {
    now_ns: u64,
    tank: LcTank,
    lock_us: u64,
    electrodes: HashMap<Electrode, f64>,
    row: u8,
    col: u8,
    switched_at_ns: u64,
    previous: (u8, u8),
    configure_ok: bool,
    configured_with: Option<DeviceConfig>,
    failures_left: u32,
    events: Vec<BoardEvent>,
}

impl BoardState {
    fn pf(&self, key: Electrode) -> f64 {
        self.electrodes.get(&key).copied().unwrap_or(DEFAULT_PF)
    }

    fn code(&self, pf: f64) -> u32 {
        self.tank.code_for_picofarads(pf).map(|r| r.code()).unwrap_or(0)
    }

    fn switch(&mut self, row: u8, col: u8) {
        if (row, col) != (self.row, self.col) {
            self.previous = (self.row, self.col);
            self.row = row;
            self.col = col;
            self.switched_at_ns = self.now_ns;
        }
    }
}

/// Handle to the shared simulated board
#[derive(Clone)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    /// Board with the default LC tank and a 2 ms oscillator lock time
    pub fn new() -> Self {
        Self::with_lock_time(2_000)
    }

    pub fn with_lock_time(lock_us: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(BoardState {
                now_ns: 0,
                tank: LcTank::default(),
                lock_us,
                electrodes: HashMap::new(),
                row: 0,
                col: 0,
                switched_at_ns: 0,
                previous: (0, 0),
                configure_ok: true,
                configured_with: None,
                failures_left: 0,
                events: Vec::new(),
            })),
        }
    }

    /// Set the capacitance of one electrode (pF)
    pub fn set_pf(&self, electrode: Electrode, pf: f64) {
        self.state.borrow_mut().electrodes.insert(electrode, pf);
    }

    /// Make `configure()` report an unusable device
    pub fn refuse_configuration(&self) {
        self.state.borrow_mut().configure_ok = false;
    }

    pub fn configured_with(&self) -> Option<DeviceConfig> {
        self.state.borrow().configured_with
    }

    /// Fail the next `count` device reads with a bus error
    pub fn fail_reads(&self, count: u32) {
        self.state.borrow_mut().failures_left = count;
    }

    pub fn events(&self) -> Vec<BoardEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn reads(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, BoardEvent::Read { .. })).count()
    }

    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_ns / 1_000
    }

    /// Code a settled read of `pf` returns
    pub fn code_for(&self, pf: f64) -> u32 {
        self.state.borrow().code(pf)
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor { board: self.clone() }
    }

    pub fn row_mux(&self) -> SimMux {
        SimMux { board: self.clone(), axis: Axis::Row }
    }

    pub fn col_mux(&self) -> SimMux {
        SimMux { board: self.clone(), axis: Axis::Col }
    }

    pub fn clock(&self) -> SimClock {
        SimClock { board: self.clone() }
    }
}

pub struct SimSensor {
    board: SimBoard,
}

impl CapacitanceSensor for SimSensor {
    fn configure(&mut self, config: &DeviceConfig) -> bool {
        let mut state = self.board.state.borrow_mut();
        state.configured_with = Some(*config);
        state.configure_ok
    }

    fn read_channel(&mut self, channel: u8) -> Result<u32, DeviceError> {
        let mut state = self.board.state.borrow_mut();
        let at_us = state.now_ns / 1_000;
        state.events.push(BoardEvent::Read { channel, at_us });

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(DeviceError::Bus);
        }

        let locked = state.now_ns - state.switched_at_ns >= state.lock_us * 1_000;
        let (row, col) = if locked { (state.row, state.col) } else { state.previous };
        let pf = state.pf((channel, row, col));
        Ok(state.code(pf))
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Row,
    Col,
}

pub struct SimMux {
    board: SimBoard,
    axis: Axis,
}

impl Multiplexer for SimMux {
    fn set_select_lines(&mut self, lines: SelectBits) -> ScanResult<()> {
        let mut state = self.board.state.borrow_mut();
        let at_us = state.now_ns / 1_000;
        let bits = lines.bits();
        match self.axis {
            Axis::Row => {
                state.events.push(BoardEvent::Row { bits, at_us });
                let col = state.col;
                state.switch(bits, col);
            }
            Axis::Col => {
                state.events.push(BoardEvent::Col { bits, at_us });
                let row = state.row;
                state.switch(row, bits);
            }
        }
        Ok(())
    }
}

pub struct SimClock {
    board: SimBoard,
}

impl TimeSource for SimClock {
    fn now(&self) -> Timestamp {
        self.board.state.borrow().now_ns / 1_000_000
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.board.state.borrow_mut().now_ns += u64::from(ns);
    }
}
