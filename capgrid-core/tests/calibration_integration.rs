//! Integration tests for baseline calibration, deltas and touch detection

mod common;

use capgrid_core::{
    calibration::{BaselineCalibrator, CalibrationConfig, CalibrationPhase},
    config::{ScanConfig, SystemConfig, TouchConfig},
    monitor::CapacitanceMonitor,
    output::{CsvSink, OutputConfig},
    reading::{Channel, Measurement, RawReading, ValueDomain},
    scanner::{GridScanner, ScanCycle},
    touch::TouchEvent,
    ScanError,
};

use common::SimBoard;

fn measurement(channel: Channel, code: u32, pf: f64) -> Measurement {
    Measurement {
        timestamp_ms: 0,
        channel,
        raw: RawReading::new(code).unwrap(),
        capacitance_pf: Some(pf),
    }
}

fn cycle_of(sequence: u32, values: &[(Channel, f64)]) -> ScanCycle {
    let measurements: Vec<Measurement> =
        values.iter().map(|&(channel, pf)| measurement(channel, 1, pf)).collect();
    ScanCycle::from_measurements(sequence, &measurements).unwrap()
}

fn schedule(samples: u32) -> CalibrationConfig {
    CalibrationConfig { interval_ms: 50, duration_ms: 50 * samples + 30, domain: ValueDomain::Capacitance }
}

#[test]
fn calibrates_exactly_at_target_sample_count() {
    let board = SimBoard::new();
    let mut scanner = GridScanner::new(
        board.sensor(),
        board.row_mux(),
        board.col_mux(),
        board.clock(),
        &ScanConfig::direct_4(),
    )
    .unwrap();

    // floor(230 / 50) == 4
    let config = schedule(4);
    assert_eq!(config.target_samples(), 4);
    let mut calibrator =
        BaselineCalibrator::<16>::new(&config, scanner.plan().channels()).unwrap();

    for collected in 1..4 {
        let cycle = scanner.scan_cycle().unwrap();
        assert_eq!(calibrator.push_cycle(&cycle), Ok(false));
        assert_eq!(calibrator.phase(), CalibrationPhase::Collecting { collected });
        assert_eq!(calibrator.baseline().err(), Some(ScanError::BaselineNotYetSet));
    }

    let cycle = scanner.scan_cycle().unwrap();
    assert_eq!(calibrator.push_cycle(&cycle), Ok(true));
    assert_eq!(calibrator.phase(), CalibrationPhase::Calibrated);

    let baseline = calibrator.baseline().unwrap();
    assert_eq!(baseline.samples(), 4);
    assert_eq!(baseline.channels().len(), 4);
    for entry in baseline.channels() {
        assert!((entry.value - common::DEFAULT_PF).abs() < 1e-3);
        assert_eq!(entry.spread, 0.0);
    }
}

#[test]
fn baseline_never_changes_after_calibration() {
    let ch = Channel::Index(0);
    let mut calibrator = BaselineCalibrator::<8>::new(&schedule(3), [ch]).unwrap();
    for (i, pf) in [100.0, 102.0, 98.0].into_iter().enumerate() {
        calibrator.push_cycle(&cycle_of(i as u32, &[(ch, pf)])).unwrap();
    }
    let frozen = calibrator.baseline().unwrap().clone();
    assert_eq!(frozen.get(ch).map(|b| b.value), Some(100.0));

    for i in 3..20 {
        assert_eq!(calibrator.push_cycle(&cycle_of(i, &[(ch, 500.0)])), Ok(false));
    }
    assert_eq!(calibrator.baseline().unwrap(), &frozen);
}

#[test]
fn median_baseline_uses_upper_middle_and_ignores_spikes() {
    let ch = Channel::Index(0);

    let mut odd = BaselineCalibrator::<8>::new(&schedule(5), [ch]).unwrap();
    for (i, pf) in [100.0, 101.0, 5000.0, 99.0, 100.5].into_iter().enumerate() {
        odd.push_cycle(&cycle_of(i as u32, &[(ch, pf)])).unwrap();
    }
    assert_eq!(odd.baseline().unwrap().get(ch).map(|b| b.value), Some(100.5));

    let mut even = BaselineCalibrator::<8>::new(&schedule(4), [ch]).unwrap();
    for (i, pf) in [4.0, 2.0, 6.0, 8.0].into_iter().enumerate() {
        even.push_cycle(&cycle_of(i as u32, &[(ch, pf)])).unwrap();
    }
    let entry = *even.baseline().unwrap().get(ch).unwrap();
    assert_eq!(entry.value, 6.0);
    assert!((entry.spread - 5.0f64.sqrt()).abs() < 1e-12);
}

#[test]
fn capacitance_increase_gives_positive_ratio() {
    let ch = Channel::cell(1, 1);
    let mut calibrator = BaselineCalibrator::<4>::new(&schedule(1), [ch]).unwrap();
    calibrator.push_cycle(&cycle_of(0, &[(ch, 100.0)])).unwrap();

    let touched = measurement(ch, 1, 110.0);
    let delta = calibrator.delta(&touched).unwrap();
    assert!((delta.delta - 10.0).abs() < 1e-12);
    assert!((delta.ratio - 0.1).abs() < 1e-12);
    assert!(delta.ratio > 0.0);

    let lifted = measurement(ch, 1, 95.0);
    assert!(calibrator.delta(&lifted).unwrap().ratio < 0.0);
}

#[test]
fn negative_baseline_keeps_ratio_sign() {
    let ch = Channel::Index(0);
    let mut calibrator = BaselineCalibrator::<4>::new(&schedule(1), [ch]).unwrap();
    calibrator.push_cycle(&cycle_of(0, &[(ch, -5.0)])).unwrap();
    assert_eq!(calibrator.baseline().unwrap().get(ch).map(|b| b.value), Some(-5.0));

    let more = calibrator.delta(&measurement(ch, 1, -3.0)).unwrap();
    assert!((more.delta - 2.0).abs() < 1e-12);
    assert!((more.ratio - 0.4).abs() < 1e-12);

    let less = calibrator.delta(&measurement(ch, 1, -6.0)).unwrap();
    assert!(less.ratio < 0.0);
    assert_eq!(less.baseline, -5.0);
}

#[test]
fn raw_domain_flips_sign_so_touch_stays_positive() {
    let board = SimBoard::new();
    let ch = Channel::Index(0);
    let base_code = board.code_for(100.0);
    let touched_code = board.code_for(110.0);
    assert!(touched_code < base_code, "frequency falls as capacitance rises");

    let config = CalibrationConfig { domain: ValueDomain::Raw, ..schedule(1) };
    let mut calibrator = BaselineCalibrator::<4>::new(&config, [ch]).unwrap();
    let base = ScanCycle::from_measurements(0, &[measurement(ch, base_code, 100.0)]).unwrap();
    calibrator.push_cycle(&base).unwrap();

    let delta = calibrator.delta(&measurement(ch, touched_code, 110.0)).unwrap();
    assert!(delta.delta < 0.0);
    assert!(delta.ratio > 0.0);
    assert_eq!(delta.baseline, base_code as f64);
}

#[test]
fn recalibration_is_explicit() {
    let ch = Channel::Index(0);
    let mut calibrator = BaselineCalibrator::<8>::new(&schedule(2), [ch]).unwrap();
    calibrator.push_cycle(&cycle_of(0, &[(ch, 100.0)])).unwrap();
    calibrator.push_cycle(&cycle_of(1, &[(ch, 100.0)])).unwrap();
    assert!(calibrator.is_calibrated());

    calibrator.recalibrate();
    assert_eq!(calibrator.phase(), CalibrationPhase::Collecting { collected: 0 });
    assert_eq!(calibrator.deltas(&cycle_of(2, &[(ch, 100.0)])).err(), Some(ScanError::BaselineNotYetSet));

    calibrator.push_cycle(&cycle_of(3, &[(ch, 120.0)])).unwrap();
    calibrator.push_cycle(&cycle_of(4, &[(ch, 120.0)])).unwrap();
    assert_eq!(calibrator.baseline().unwrap().get(ch).map(|b| b.value), Some(120.0));
}

#[test]
fn incomplete_cycle_is_refused_without_corrupting_windows() {
    let a = Channel::Index(0);
    let b = Channel::Index(1);
    let mut calibrator = BaselineCalibrator::<8>::new(&schedule(2), [a, b]).unwrap();

    assert!(calibrator.push_cycle(&cycle_of(0, &[(a, 100.0)])).is_err());
    assert_eq!(calibrator.phase(), CalibrationPhase::Collecting { collected: 0 });

    calibrator.push_cycle(&cycle_of(1, &[(a, 100.0), (b, 90.0)])).unwrap();
    calibrator.push_cycle(&cycle_of(2, &[(a, 100.0), (b, 90.0)])).unwrap();
    assert_eq!(calibrator.baseline().unwrap().get(b).map(|e| e.value), Some(90.0));
}

/// Four direct channels, ten calibration sweeps 100 ms apart
fn quick_system() -> SystemConfig {
    let mut config = SystemConfig::direct_4();
    config.scan.pacing.node_ms = 0;
    config.calibration.interval_ms = 100;
    config.calibration.duration_ms = 1_000;
    config
}

#[test]
fn preset_calibration_fits_its_window() {
    for config in [SystemConfig::grid_8x8(), SystemConfig::single_mux_8(), SystemConfig::direct_4()] {
        let board = SimBoard::new();
        let mut monitor =
            CapacitanceMonitor::new(board.sensor(), board.row_mux(), board.col_mux(), board.clock(), &config)
                .unwrap();

        let started_us = board.now_us();
        let samples = monitor.calibrate().unwrap().samples();
        let elapsed_us = board.now_us() - started_us;

        assert_eq!(samples, config.calibration.target_samples());
        assert!(
            elapsed_us <= u64::from(config.calibration.duration_ms) * 1_000,
            "{} µs for a {} ms window",
            elapsed_us,
            config.calibration.duration_ms
        );
    }
}

#[test]
fn sweep_longer_than_interval_is_refused() {
    let board = SimBoard::new();
    let mut config = SystemConfig::grid_8x8();
    config.calibration.interval_ms = 50;
    config.calibration.duration_ms = 10_000;

    let result =
        CapacitanceMonitor::new(board.sensor(), board.row_mux(), board.col_mux(), board.clock(), &config);
    assert!(matches!(result, Err(ScanError::InvalidConfig { .. })));
    assert_eq!(board.reads(), 0);
}

#[test]
fn monitor_calibrates_before_reporting() {
    let board = SimBoard::new();
    let config = quick_system();
    let mut monitor =
        CapacitanceMonitor::new(board.sensor(), board.row_mux(), board.col_mux(), board.clock(), &config)
            .unwrap();
    assert!(!monitor.calibrator().is_calibrated());

    let frame = monitor.next_frame().unwrap();
    assert!(monitor.calibrator().is_calibrated());
    assert_eq!(monitor.calibrator().baseline().unwrap().samples(), 10);
    // Ten calibration sweeps precede the first reported one.
    assert_eq!(frame.cycle.sequence(), 10);
    assert_eq!(frame.deltas.len(), 4);
    assert!(frame.deltas.iter().all(|d| d.delta.abs() < 1e-9));

    board.set_pf((1, 0, 0), 110.0);
    let frame = monitor.next_frame().unwrap();
    let touched = frame.deltas.get(Channel::Index(1)).unwrap();
    assert!((touched.ratio - 0.1).abs() < 1e-4);
    assert_eq!(frame.deltas.get(Channel::Index(0)).map(|d| d.delta.abs() < 1e-9), Some(true));
}

#[test]
fn calibration_sweeps_start_one_interval_apart() {
    let board = SimBoard::new();
    let config = SystemConfig::baseline_single();

    let mut monitor =
        CapacitanceMonitor::new(board.sensor(), board.row_mux(), board.col_mux(), board.clock(), &config)
            .unwrap();
    let baseline = monitor.calibrate().unwrap();

    assert_eq!(baseline.samples(), 200);
    let entry = baseline.get(Channel::Index(0)).unwrap();
    assert_eq!(entry.value, board.code_for(common::DEFAULT_PF) as f64);

    // 200 ms startup, sweeps at 50 ms steps, last sweep takes 10 + 2 × 5 ms
    assert_eq!(board.now_us(), (200 + 199 * 50 + 20) * 1_000);
}

#[test]
fn touch_events_follow_debounce_and_hysteresis() {
    let board = SimBoard::new();
    let mut config = quick_system();
    config.touch = Some(TouchConfig { detect_ratio: 0.05, release_ratio: 0.03, debounce: 2 });

    let mut monitor =
        CapacitanceMonitor::new(board.sensor(), board.row_mux(), board.col_mux(), board.clock(), &config)
            .unwrap();
    assert!(monitor.next_frame().unwrap().events.is_empty());

    let ch = Channel::Index(2);
    board.set_pf((2, 0, 0), 110.0);
    assert!(monitor.next_frame().unwrap().events.is_empty(), "debouncing");
    assert_eq!(monitor.next_frame().unwrap().events.as_slice(), &[TouchEvent::Pressed(ch)]);
    assert!(monitor.touch().unwrap().is_active(ch));

    // Inside the hysteresis band
    board.set_pf((2, 0, 0), 104.0);
    assert!(monitor.next_frame().unwrap().events.is_empty());
    assert!(monitor.touch().unwrap().is_active(ch));

    board.set_pf((2, 0, 0), 100.0);
    assert_eq!(monitor.next_frame().unwrap().events.as_slice(), &[TouchEvent::Released(ch)]);
    assert_eq!(monitor.touch().unwrap().active().count(), 0);
}

#[test]
fn monitor_recalibration_takes_new_baseline() {
    let board = SimBoard::new();
    let mut monitor = CapacitanceMonitor::new(
        board.sensor(),
        board.row_mux(),
        board.col_mux(),
        board.clock(),
        &quick_system(),
    )
    .unwrap();
    monitor.next_frame().unwrap();

    board.set_pf((0, 0, 0), 120.0);
    let drifted = monitor.next_frame().unwrap();
    assert!(drifted.deltas.get(Channel::Index(0)).unwrap().ratio > 0.1);

    monitor.recalibrate();
    let fresh = monitor.next_frame().unwrap();
    assert!(fresh.deltas.get(Channel::Index(0)).unwrap().delta.abs() < 1e-9);
}

#[test]
fn monitor_run_writes_delta_csv() {
    let board = SimBoard::new();
    let mut monitor = CapacitanceMonitor::new(
        board.sensor(),
        board.row_mux(),
        board.col_mux(),
        board.clock(),
        &quick_system(),
    )
    .unwrap();

    let mut sink = CsvSink::new(String::new(), OutputConfig::default());
    assert_eq!(monitor.run(&mut sink, Some(2)), Ok(2));

    let text = sink.into_inner();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "timestamp,channel,current,delta,ratio");
    assert_eq!(lines.len(), 1 + 2 * 4);
    assert!(lines[1].contains(",CH0,"));
    assert!(lines[1].ends_with(",0.000000"));
}

#[test]
fn monitor_never_starts_on_unready_device() {
    let board = SimBoard::new();
    board.refuse_configuration();

    let result = CapacitanceMonitor::new(
        board.sensor(),
        board.row_mux(),
        board.col_mux(),
        board.clock(),
        &quick_system(),
    );
    assert!(matches!(result, Err(ScanError::DeviceNotReady)));
    assert_eq!(board.reads(), 0);
}
