//! Multiplexer addressing
//!
//! Maps a logical [`Channel`] onto the select-line pattern of the analog
//! multiplexer(s) in front of the converter. Three wiring regimes exist:
//!
//! ```text
//! Single:  electrodes 0..n ──► n:1 mux ──► device CHx
//! Grid:    rows ──► row mux ─┐
//!                            ├─► device CHx   (cell = row × column)
//!          cols ──► col mux ─┘
//! Direct:  electrode k ──────────► device CHk (no mux)
//! ```
//!
//! Select patterns follow the SN74HC4051 convention `C B A == S2 S1 S0`, so
//! bit 0 of the pattern drives S0.
//!
//! Addressing is pure; the [`Multiplexer`] trait is the only thing that
//! touches hardware, and it is driven by the channel reader.

use embedded_hal::digital::{OutputPin, PinState};

use crate::constants::sensors::{DEVICE_CHANNELS, MAX_SELECT_LINES};
use crate::errors::{ScanError, ScanResult};
use crate::reading::Channel;

/// What to do with an index that does not fit the select bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressPolicy {
    /// Refuse the channel before scanning starts
    #[default]
    Reject,
    /// Keep only the low select bits, wrapping the index onto the bus
    Mask,
}

/// Wiring of the electrodes to the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Topology {
    /// One n-line multiplexer in front of a single device channel
    Single {
        /// Number of select lines (mux is 2^n:1)
        select_lines: u8,
        /// Electrodes actually populated, scanned as indices `0..channels`
        channels: u16,
        /// Device channel the mux output feeds
        device_channel: u8,
    },
    /// Orthogonal row and column multiplexers forming a 2-D grid
    Grid {
        /// Select lines of the row mux
        row_lines: u8,
        /// Select lines of the column mux
        col_lines: u8,
        /// Populated rows
        rows: u8,
        /// Populated columns
        cols: u8,
        /// Device channel the grid feeds
        device_channel: u8,
    },
    /// Electrodes wired straight to device channels `0..channels`
    Direct {
        /// Number of device channels in use
        channels: u8,
    },
}

impl Topology {
    /// Number of channels one full sweep covers
    pub fn channel_count(&self) -> usize {
        match *self {
            Self::Single { channels, .. } => channels as usize,
            Self::Grid { rows, cols, .. } => rows as usize * cols as usize,
            Self::Direct { channels } => channels as usize,
        }
    }

    /// Channel at position `position` of the physical sweep order
    ///
    /// Grids sweep row-major: every column of row 0, then row 1, and so on.
    pub fn channel_at(&self, position: usize) -> Option<Channel> {
        if position >= self.channel_count() {
            return None;
        }
        Some(match *self {
            Self::Single { .. } | Self::Direct { .. } => Channel::Index(position as u16),
            Self::Grid { cols, .. } => {
                let cols = cols as usize;
                Channel::cell((position / cols) as u8, (position % cols) as u8)
            }
        })
    }

    /// Device channels this wiring reads from, as a CHx bit mask
    pub fn device_channel_mask(&self) -> u8 {
        match *self {
            Self::Single { device_channel, .. } | Self::Grid { device_channel, .. } => {
                1u8.checked_shl(device_channel as u32).unwrap_or(0)
            }
            Self::Direct { channels } => {
                (1u16.checked_shl(channels as u32).unwrap_or(0).wrapping_sub(1)) as u8
            }
        }
    }

    /// Check widths and populated counts against the address space
    ///
    /// Under [`AddressPolicy::Reject`] every populated position must be
    /// addressable; under [`AddressPolicy::Mask`] overflow wraps and is allowed.
    pub fn validate(&self, policy: AddressPolicy) -> ScanResult<()> {
        match *self {
            Self::Single { select_lines, channels, device_channel } => {
                check_width(select_lines)?;
                check_device_channel(device_channel)?;
                if channels == 0 {
                    return Err(ScanError::InvalidConfig { reason: "no channels configured" });
                }
                check_fits(channels - 1, select_lines, policy)
            }
            Self::Grid { row_lines, col_lines, rows, cols, device_channel } => {
                check_width(row_lines)?;
                check_width(col_lines)?;
                check_device_channel(device_channel)?;
                if rows == 0 || cols == 0 {
                    return Err(ScanError::InvalidConfig { reason: "grid has no rows or columns" });
                }
                check_fits(rows as u16 - 1, row_lines, policy)?;
                check_fits(cols as u16 - 1, col_lines, policy)
            }
            Self::Direct { channels } => {
                if channels == 0 {
                    return Err(ScanError::InvalidConfig { reason: "no channels configured" });
                }
                if channels > DEVICE_CHANNELS {
                    return Err(ScanError::AddressOutOfRange {
                        index: channels as u16 - 1,
                        capacity: DEVICE_CHANNELS as u16,
                    });
                }
                Ok(())
            }
        }
    }
}

fn check_width(lines: u8) -> ScanResult<()> {
    if lines == 0 || lines > MAX_SELECT_LINES {
        return Err(ScanError::InvalidConfig { reason: "select line count must be 1..=8" });
    }
    Ok(())
}

fn check_device_channel(channel: u8) -> ScanResult<()> {
    if channel >= DEVICE_CHANNELS {
        return Err(ScanError::InvalidConfig { reason: "device channel must be 0..=3" });
    }
    Ok(())
}

fn check_fits(highest: u16, lines: u8, policy: AddressPolicy) -> ScanResult<()> {
    select(highest, lines, policy).map(|_| ())
}

/// Levels for one multiplexer's select lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelectBits {
    bits: u8,
    width: u8,
}

impl SelectBits {
    /// All lines low, the power-on state of the muxes
    pub const fn zero(width: u8) -> Self {
        Self { bits: 0, width }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// Level of select line `line` (0 = S0, the LSB)
    pub fn level(&self, line: u8) -> bool {
        line < self.width && (self.bits >> line) & 1 == 1
    }
}

/// Encode `index` on a `lines`-wide select bus
fn select(index: u16, lines: u8, policy: AddressPolicy) -> ScanResult<SelectBits> {
    check_width(lines)?;
    let capacity = 1u16 << lines;
    let index = if index < capacity {
        index
    } else {
        match policy {
            AddressPolicy::Reject => {
                return Err(ScanError::AddressOutOfRange { index, capacity });
            }
            AddressPolicy::Mask => index & (capacity - 1),
        }
    };
    Ok(SelectBits { bits: index as u8, width: lines })
}

/// Physical address of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// Single multiplexer pattern
    Single {
        /// Select levels
        lines: SelectBits,
        /// Device channel behind the mux
        device_channel: u8,
    },
    /// Row and column patterns, set and settled one after the other
    Grid {
        /// Row mux levels
        row: SelectBits,
        /// Column mux levels
        col: SelectBits,
        /// Device channel behind the grid
        device_channel: u8,
    },
    /// No multiplexer; read the device channel directly
    Direct {
        /// Device channel to read
        device_channel: u8,
    },
}

impl Address {
    /// Device channel the final read goes to
    pub fn device_channel(&self) -> u8 {
        match *self {
            Self::Single { device_channel, .. }
            | Self::Grid { device_channel, .. }
            | Self::Direct { device_channel } => device_channel,
        }
    }
}

/// Map a channel to its select-line pattern(s)
///
/// Flat indices are accepted on grids and split row-major using the
/// configured column count.
pub fn address(channel: Channel, topology: &Topology, policy: AddressPolicy) -> ScanResult<Address> {
    match (*topology, channel) {
        (Topology::Single { select_lines, device_channel, .. }, Channel::Index(index)) => {
            Ok(Address::Single {
                lines: select(index, select_lines, policy)?,
                device_channel,
            })
        }
        (Topology::Grid { row_lines, col_lines, device_channel, .. }, Channel::Cell { row, col }) => {
            Ok(Address::Grid {
                row: select(row as u16, row_lines, policy)?,
                col: select(col as u16, col_lines, policy)?,
                device_channel,
            })
        }
        (Topology::Grid { row_lines, col_lines, cols, device_channel, .. }, Channel::Index(index)) => {
            if cols == 0 {
                return Err(ScanError::InvalidConfig { reason: "grid has no rows or columns" });
            }
            let cols = cols as u16;
            Ok(Address::Grid {
                row: select(index / cols, row_lines, policy)?,
                col: select(index % cols, col_lines, policy)?,
                device_channel,
            })
        }
        (Topology::Direct { channels }, Channel::Index(index)) => {
            // Nothing to wrap onto without select lines.
            if index >= channels as u16 {
                return Err(ScanError::AddressOutOfRange { index, capacity: channels as u16 });
            }
            Ok(Address::Direct { device_channel: index as u8 })
        }
        (_, Channel::Cell { .. }) => Err(ScanError::InvalidConfig {
            reason: "grid cell requested on a topology without a column mux",
        }),
    }
}

/// Select-line capability of one analog multiplexer
///
/// Combinational and effectively immediate; the caller provides settle time.
pub trait Multiplexer {
    /// Drive the select lines to `lines`
    fn set_select_lines(&mut self, lines: SelectBits) -> ScanResult<()>;
}

impl<M: Multiplexer + ?Sized> Multiplexer for &mut M {
    fn set_select_lines(&mut self, lines: SelectBits) -> ScanResult<()> {
        (**self).set_select_lines(lines)
    }
}

/// Placeholder for an axis with no multiplexer fitted
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMux;

impl Multiplexer for NoMux {
    fn set_select_lines(&mut self, _lines: SelectBits) -> ScanResult<()> {
        Ok(())
    }
}

/// Multiplexer driven by `N` GPIO outputs, `pins[0]` on S0
pub struct PinMux<P, const N: usize> {
    pins: [P; N],
}

impl<P: OutputPin, const N: usize> PinMux<P, N> {
    pub fn new(pins: [P; N]) -> Self {
        Self { pins }
    }

    /// Give the pins back
    pub fn release(self) -> [P; N] {
        self.pins
    }
}

impl<P: OutputPin, const N: usize> Multiplexer for PinMux<P, N> {
    fn set_select_lines(&mut self, lines: SelectBits) -> ScanResult<()> {
        if lines.width() as usize > N {
            return Err(ScanError::InvalidConfig { reason: "select pattern wider than pin bank" });
        }
        for (line, pin) in self.pins.iter_mut().enumerate() {
            pin.set_state(PinState::from(lines.level(line as u8)))
                .map_err(|_| ScanError::SelectLineFault)?;
        }
        Ok(())
    }
}
