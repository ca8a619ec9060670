//! Grid scanner
//!
//! Sweeps every configured channel once per cycle, in the physical
//! addressing order, and emits the sweep as one [`ScanCycle`].
//!
//! ## State Machine
//!
//! ```text
//!            scan_cycle()
//!   Idle ───────────────► Scanning(0) ─► Scanning(1) ─► … ─► Scanning(n-1)
//!    ▲                                                            │
//!    │ cycle pacing                                               ▼
//!    └──────────────────────────────────────────────────── CycleComplete
//! ```
//!
//! A cycle is only handed out once every channel has been read. A failure
//! part way drops the partial sweep and returns the scanner to `Idle`.
//!
//! ## Addressing Regimes
//!
//! The same scanner handles one n:1 multiplexer, orthogonal row/column
//! multiplexers, and direct device channels; the difference lives entirely
//! in the [`Topology`] and the addresses precomputed in the [`ScanPlan`].
//! Every address is resolved before the first read, so an out-of-range
//! channel stops the system at startup rather than mid-sweep.

use heapless::Vec;

use crate::config::ScanConfig;
use crate::constants::buffers::MAX_CHANNELS;
use crate::constants::time::{CYCLE_PACING_MS, NODE_PACING_MS};
use crate::convert::LcTank;
use crate::device::CapacitanceSensor;
use crate::errors::{ScanError, ScanResult};
use crate::mux::{address, Address, AddressPolicy, Multiplexer, Topology};
use crate::output::OutputSink;
use crate::reader::ChannelReader;
use crate::reading::{Channel, Measurement};
use crate::time::{Clock, Timestamp};

/// Pauses between readings and between sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pacing {
    /// After each accepted node reading (ms)
    pub node_ms: u32,
    /// After each complete sweep (ms)
    pub cycle_ms: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self { node_ms: NODE_PACING_MS, cycle_ms: CYCLE_PACING_MS }
    }
}

/// Where the scanner is in its sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    /// Waiting for the next sweep
    Idle,
    /// Reading the channel at this plan position
    Scanning(usize),
    /// Last sweep finished and was handed out
    CycleComplete,
}

/// A channel and its precomputed address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntry {
    /// Logical channel
    pub channel: Channel,
    /// Select pattern resolved at startup
    pub address: Address,
}

/// Ordered, validated list of channels to sweep
#[derive(Debug, Clone)]
pub struct ScanPlan {
    topology: Topology,
    entries: Vec<PlanEntry, MAX_CHANNELS>,
}

impl ScanPlan {
    /// Every populated channel of `topology` in physical order
    pub fn full(topology: &Topology, policy: AddressPolicy) -> ScanResult<Self> {
        topology.validate(policy)?;
        let mut entries = Vec::new();
        for position in 0..topology.channel_count() {
            let channel = topology.channel_at(position).ok_or(ScanError::InvalidConfig {
                reason: "sweep position outside topology",
            })?;
            Self::push(&mut entries, topology, policy, channel)?;
        }
        Ok(Self { topology: *topology, entries })
    }

    /// A caller-chosen subset, swept in the given order
    pub fn from_channels(
        topology: &Topology,
        policy: AddressPolicy,
        channels: &[Channel],
    ) -> ScanResult<Self> {
        if channels.is_empty() {
            return Err(ScanError::InvalidConfig { reason: "no channels configured" });
        }
        let mut entries: Vec<PlanEntry, MAX_CHANNELS> = Vec::new();
        for &channel in channels {
            // Two names for one electrode resolve to the same address.
            let resolved = address(channel, topology, policy)?;
            if entries.iter().any(|entry| entry.address == resolved) {
                return Err(ScanError::InvalidConfig { reason: "electrode listed twice" });
            }
            Self::push(&mut entries, topology, policy, channel)?;
        }
        Ok(Self { topology: *topology, entries })
    }

    fn push(
        entries: &mut Vec<PlanEntry, MAX_CHANNELS>,
        topology: &Topology,
        policy: AddressPolicy,
        channel: Channel,
    ) -> ScanResult<()> {
        let address = address(channel, topology, policy)?;
        entries
            .push(PlanEntry { channel, address })
            .map_err(|_| ScanError::InvalidConfig { reason: "more channels than MAX_CHANNELS" })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.entries.iter().map(|entry| entry.channel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One complete sweep: every planned channel exactly once, in plan order
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCycle {
    sequence: u32,
    measurements: Vec<Measurement, MAX_CHANNELS>,
}

impl ScanCycle {
    /// Rebuild a cycle from recorded measurements, e.g. for replay
    pub fn from_measurements(sequence: u32, measurements: &[Measurement]) -> ScanResult<Self> {
        let measurements = Vec::from_slice(measurements)
            .map_err(|_| ScanError::InvalidConfig { reason: "more channels than MAX_CHANNELS" })?;
        Ok(Self { sequence, measurements })
    }

    /// Zero-based count of sweeps completed before this one
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measurement for `channel`, if it is part of the sweep
    pub fn get(&self, channel: Channel) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.channel == channel)
    }
}

/// Sweeps the configured channel set
pub struct GridScanner<S, R, C, K> {
    reader: ChannelReader<S, R, C, K>,
    plan: ScanPlan,
    converter: Option<LcTank>,
    pacing: Pacing,
    state: ScanState,
    epoch: Timestamp,
    completed: u32,
}

impl<S, R, C, K> GridScanner<S, R, C, K>
where
    S: CapacitanceSensor,
    R: Multiplexer,
    C: Multiplexer,
    K: Clock,
{
    /// Configure the device and prepare a sweep of every populated channel
    ///
    /// Fails with [`ScanError::DeviceNotReady`] if the device rejects its
    /// configuration; no scanner exists afterwards, so nothing is ever scanned.
    pub fn new(sensor: S, row_mux: R, col_mux: C, clock: K, config: &ScanConfig) -> ScanResult<Self> {
        let plan = ScanPlan::full(&config.topology, config.address_policy)?;
        Self::with_plan(sensor, row_mux, col_mux, clock, config, plan)
    }

    /// Like [`GridScanner::new`] but sweeping a caller-built plan
    pub fn with_plan(
        sensor: S,
        row_mux: R,
        col_mux: C,
        clock: K,
        config: &ScanConfig,
        plan: ScanPlan,
    ) -> ScanResult<Self> {
        config.validate()?;
        if plan.topology() != &config.topology {
            return Err(ScanError::InvalidConfig { reason: "scan plan built for another topology" });
        }

        let epoch = clock.now();
        let mut reader = ChannelReader::new(
            sensor,
            row_mux,
            col_mux,
            clock,
            config.timing,
            config.read_failure,
        );

        if !reader.configure(&config.device) {
            log_warn!("sensor rejected configuration {:?}", config.device);
            return Err(ScanError::DeviceNotReady);
        }
        log_info!("sensor configured, {} channels planned", plan.len());

        reader.park(&config.topology)?;
        reader.clock_mut().delay_ms(config.startup_settle_ms);

        Ok(Self {
            reader,
            plan,
            converter: config.converter,
            pacing: config.pacing,
            state: ScanState::Idle,
            epoch,
            completed: 0,
        })
    }

    /// Run one full sweep
    pub fn scan_cycle(&mut self) -> ScanResult<ScanCycle> {
        let mut measurements = Vec::new();

        for position in 0..self.plan.len() {
            self.state = ScanState::Scanning(position);
            let entry = self.plan.entries[position];

            let measurement = match self.measure(&entry) {
                Ok(measurement) => measurement,
                Err(err) => {
                    self.state = ScanState::Idle;
                    return Err(err);
                }
            };
            // Plan length is bounded by the same capacity.
            let _ = measurements.push(measurement);

            self.reader.clock_mut().delay_ms(self.pacing.node_ms);
        }

        let cycle = ScanCycle { sequence: self.completed, measurements };
        self.completed = self.completed.wrapping_add(1);
        self.state = ScanState::CycleComplete;
        log_debug!("cycle {} complete, {} channels", cycle.sequence, cycle.len());
        Ok(cycle)
    }

    fn measure(&mut self, entry: &PlanEntry) -> ScanResult<Measurement> {
        let raw = self.reader.read(&entry.address)?;
        let timestamp_ms = self.elapsed_ms();
        let capacitance_pf = match &self.converter {
            Some(tank) => Some(tank.to_picofarads(raw)?),
            None => None,
        };
        Ok(Measurement { timestamp_ms, channel: entry.channel, raw, capacitance_pf })
    }

    /// Pause between sweeps and return to `Idle`
    pub fn pace_cycle(&mut self) {
        self.reader.clock_mut().delay_ms(self.pacing.cycle_ms);
        self.state = ScanState::Idle;
    }

    /// Sweep and emit to `sink`, forever when `cycles` is `None`
    ///
    /// Returns the number of cycles emitted. Any error ends the loop.
    pub fn run<O: OutputSink + ?Sized>(&mut self, sink: &mut O, cycles: Option<u32>) -> ScanResult<u32> {
        let mut emitted = 0;
        while cycles.map_or(true, |limit| emitted < limit) {
            let cycle = self.scan_cycle()?;
            sink.emit_cycle(&cycle);
            emitted += 1;
            self.pace_cycle();
        }
        Ok(emitted)
    }

    /// Milliseconds since the scanner was created
    pub fn elapsed_ms(&self) -> Timestamp {
        self.reader.clock().now().saturating_sub(self.epoch)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    pub fn converter(&self) -> Option<&LcTank> {
        self.converter.as_ref()
    }

    /// Sweeps completed so far
    pub fn cycles_completed(&self) -> u32 {
        self.completed
    }

    pub fn clock(&self) -> &K {
        self.reader.clock()
    }

    pub fn clock_mut(&mut self) -> &mut K {
        self.reader.clock_mut()
    }

    pub fn release(self) -> (S, R, C, K) {
        self.reader.release()
    }
}
