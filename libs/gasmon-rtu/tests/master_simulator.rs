//! Master against the in-memory slave: timeouts, cancellation, status lines

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use gasmon_rtu::constants::READ_TIMEOUT;
use gasmon_rtu::{Fault, ModbusMaster, Parity, RtuError, RtuSlaveSimulator, SerialSettings};

fn settings() -> SerialSettings {
    SerialSettings::new("/dev/ttySIM0", 19200, Parity::Even)
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn silent_slave_fails_after_one_read_deadline() {
    let sim = RtuSlaveSimulator::new(1);
    sim.push_fault(Fault::Silent);
    let mut master = ModbusMaster::with_factory(Arc::new(sim.clone()));
    master.open(&settings()).unwrap();

    let started = tokio::time::Instant::now();
    let err = master.read_input_registers(1, 0, 2).await.unwrap_err();
    let waited = started.elapsed();

    assert_eq!(
        err,
        RtuError::Timeout {
            received: 0,
            expected: 9
        }
    );
    assert!(master.status().starts_with("Error in read event"));
    assert!(waited >= READ_TIMEOUT && waited < READ_TIMEOUT * 2);

    // No retry happened
    assert_eq!(sim.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn wrong_unit_address_times_out() {
    let sim = RtuSlaveSimulator::new(5);
    let mut master = ModbusMaster::with_factory(Arc::new(sim));
    master.open(&settings()).unwrap();

    let err = master.diagnostics(6, 0, 0xABCD).await.unwrap_err();
    assert!(matches!(err, RtuError::Timeout { .. }));
}

#[tokio::test]
async fn master_recovers_after_failed_exchange() {
    let sim = RtuSlaveSimulator::new(1);
    sim.set_input_f32(0, 1.5);
    sim.push_fault(Fault::CorruptCrc);
    let mut master = ModbusMaster::with_factory(Arc::new(sim));
    master.open(&settings()).unwrap();

    assert_eq!(
        master.read_input_registers(1, 0, 2).await.unwrap_err(),
        RtuError::Crc
    );
    let data = master.read_input_registers(1, 0, 2).await.unwrap();
    assert_eq!(data, 1.5f32.to_be_bytes().to_vec());
}

#[tokio::test]
async fn read_io_error_reported_as_read_event() {
    let sim = RtuSlaveSimulator::new(1);
    sim.set_input_f32(0, 1.5);
    sim.push_fault(Fault::IoError("device reports framing error".into()));
    let mut master = ModbusMaster::with_factory(Arc::new(sim.clone()));
    master.open(&settings()).unwrap();

    let err = master.read_input_registers(1, 0, 2).await.unwrap_err();
    assert_eq!(err, RtuError::Io("device reports framing error".into()));
    assert_eq!(
        master.status(),
        "Error in read event: device reports framing error"
    );

    // The port stays usable for the next exchange
    assert!(master.is_open());
    let data = master.read_input_registers(1, 0, 2).await.unwrap();
    assert_eq!(data, 1.5f32.to_be_bytes().to_vec());
    assert_eq!(sim.requests().len(), 2);
}

#[tokio::test]
async fn write_io_error_reported_as_write_event() {
    let sim = RtuSlaveSimulator::new(1);
    sim.push_fault(Fault::WriteError("cable unplugged".into()));
    let mut master = ModbusMaster::with_factory(Arc::new(sim.clone()));
    master.open(&settings()).unwrap();

    let err = master.diagnostics(1, 0, 0xABCD).await.unwrap_err();
    assert_eq!(err, RtuError::WriteIo("cable unplugged".into()));
    assert_eq!(master.status(), "Error in write event: cable unplugged");
    assert!(sim.requests().is_empty());

    assert!(master
        .write_multiple_registers(1, 4, &[0x0102])
        .await
        .is_ok());
    assert_eq!(master.status(), "Write successful");
    assert_eq!(sim.holding_register(4), Some(0x0102));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancelled_session_still_closes_port() {
    let sim = RtuSlaveSimulator::new(1);
    sim.push_fault(Fault::Silent);
    let mut master = ModbusMaster::with_factory(Arc::new(sim.clone()));

    let poll = async {
        let mut session = master.session(&settings()).unwrap();
        session.read_input_registers(1, 0, 2).await
    };
    // Give up well before the read deadline
    let outcome = tokio::time::timeout(Duration::from_millis(100), poll).await;
    assert!(outcome.is_err());

    assert_eq!(sim.open_links(), 0);
    assert!(!master.is_open());
}

// ============================================================================
// Port lifecycle
// ============================================================================

#[tokio::test]
async fn open_failure_reports_port_and_reason() {
    let sim = RtuSlaveSimulator::new(1);
    sim.fail_open("permission denied");
    let mut master = ModbusMaster::with_factory(Arc::new(sim.clone()));

    assert!(master.open(&settings()).is_err());
    assert_eq!(
        master.status(),
        "Error opening /dev/ttySIM0: permission denied"
    );

    sim.allow_open();
    master.open(&settings()).unwrap();
    assert_eq!(master.status(), "/dev/ttySIM0 opened successfully");
    assert!(master.open(&settings()).is_err());
    assert_eq!(master.status(), "/dev/ttySIM0 already opened");
}
