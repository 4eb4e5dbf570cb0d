//! Operator diagnostics: port check, loopback check, raw commands
//!
//! Each call opens the port, does its work and closes it again.

use gasmon_rtu::frame::to_hex;
use gasmon_rtu::{ModbusMaster, SerialSettings};
use tracing::info;

/// FC08 "return query data" subfunction
pub const LOOPBACK_SUBFUNCTION: u16 = 0x0000;
/// Word echoed back by a healthy slave
pub const LOOPBACK_PATTERN: u16 = 0xABCD;

/// Result of a diagnostic run as shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticOutcome {
    pub ok: bool,
    pub status: String,
}

impl DiagnosticOutcome {
    fn new(ok: bool, status: impl Into<String>) -> Self {
        Self {
            ok,
            status: status.into(),
        }
    }
}

/// Open and close the port with the configured line settings
pub fn test_port(master: &mut ModbusMaster, settings: &SerialSettings) -> DiagnosticOutcome {
    if master.open(settings).is_err() {
        return DiagnosticOutcome::new(false, master.status());
    }
    let ok = master.close().is_ok();
    info!("Port test {}: {}", settings.port, if ok { "ok" } else { "failed" });
    DiagnosticOutcome::new(ok, master.status())
}

/// FC08 loopback of [`LOOPBACK_PATTERN`].
///
/// Passes only if the exchange, the close and the echoed word all check out.
pub async fn test_communication(
    master: &mut ModbusMaster,
    settings: &SerialSettings,
    slave: u8,
) -> DiagnosticOutcome {
    let mut session = match master.session(settings) {
        Ok(session) => session,
        Err(e) => return DiagnosticOutcome::new(false, e.status()),
    };

    let echo = session
        .diagnostics(slave, LOOPBACK_SUBFUNCTION, LOOPBACK_PATTERN)
        .await;
    let status = session.status().to_string();
    let closed = session.close().is_ok();

    match echo {
        Ok(word) if closed && u16::from_be_bytes(word) == LOOPBACK_PATTERN => {
            info!("Loopback with unit {} ok", slave);
            DiagnosticOutcome::new(true, status)
        },
        Ok(word) if closed => DiagnosticOutcome::new(
            false,
            format!(
                "Echo mismatch: sent {}, got {}",
                to_hex(&LOOPBACK_PATTERN.to_be_bytes()),
                to_hex(&word)
            ),
        ),
        Ok(_) => DiagnosticOutcome::new(false, master.status()),
        Err(_) => DiagnosticOutcome::new(false, status),
    }
}

/// Run one read-style function and render the reply.
///
/// Success gives upper-case hex pairs (`"41 A0 1E 1F"`); failure gives the
/// master's status line.
pub async fn run_command(
    master: &mut ModbusMaster,
    settings: &SerialSettings,
    slave: u8,
    function: u8,
    start: u16,
    length: u16,
) -> DiagnosticOutcome {
    let mut session = match master.session(settings) {
        Ok(session) => session,
        Err(e) => return DiagnosticOutcome::new(false, e.status()),
    };

    let result = session.execute(function, slave, start, length).await;
    let status = session.status().to_string();
    // Close outcome does not change what the command returned
    let _ = session.close();

    match result {
        Ok(bytes) => DiagnosticOutcome::new(true, to_hex(&bytes)),
        Err(_) => DiagnosticOutcome::new(false, status),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use gasmon_rtu::{Fault, Parity, RtuSlaveSimulator};
    use std::sync::Arc;

    fn setup() -> (RtuSlaveSimulator, ModbusMaster, SerialSettings) {
        let sim = RtuSlaveSimulator::new(1);
        let master = ModbusMaster::with_factory(Arc::new(sim.clone()));
        (sim, master, SerialSettings::new("sim0", 19200, Parity::None))
    }

    #[test]
    fn test_port_ok_and_failure() {
        let (sim, mut master, settings) = setup();
        let outcome = test_port(&mut master, &settings);
        assert!(outcome.ok);
        assert_eq!(outcome.status, "sim0 opened successfully");

        sim.fail_open("busy");
        let outcome = test_port(&mut master, &settings);
        assert!(!outcome.ok);
        assert_eq!(outcome.status, "Error opening sim0: busy");
    }

    #[tokio::test]
    async fn test_communication_loopback() {
        let (sim, mut master, settings) = setup();
        let outcome = test_communication(&mut master, &settings, 1).await;
        assert!(outcome.ok, "{}", outcome.status);
        assert_eq!(outcome.status, "Read successful");
        assert_eq!(sim.open_links(), 0);

        let request = &sim.requests()[0];
        assert_eq!(&request[..6], &[0x01, 0x08, 0x00, 0x00, 0xAB, 0xCD]);
    }

    #[tokio::test]
    async fn test_communication_crc_failure() {
        let (sim, mut master, settings) = setup();
        sim.push_fault(Fault::CorruptCrc);
        let outcome = test_communication(&mut master, &settings, 1).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.status, "CRC error");
        assert_eq!(sim.open_links(), 0);
    }

    #[tokio::test]
    async fn test_run_command_hex_output() {
        let (sim, mut master, settings) = setup();
        sim.set_input_register(0, 0x41A0);
        sim.set_input_register(1, 0x1E1F);

        let outcome = run_command(&mut master, &settings, 1, 4, 0, 2).await;
        assert!(outcome.ok);
        assert_eq!(outcome.status, "41 A0 1E 1F");

        let echo = run_command(&mut master, &settings, 1, 8, 0, 0x1234).await;
        assert_eq!(echo.status, "12 34");
    }

    #[tokio::test]
    async fn test_run_command_failures_report_status() {
        let (sim, mut master, settings) = setup();

        let unsupported = run_command(&mut master, &settings, 1, 5, 0, 1).await;
        assert!(!unsupported.ok);
        assert_eq!(unsupported.status, "Unsupported function code: 5");
        assert!(sim.requests().is_empty());

        sim.set_discrete_input(0, true);
        sim.push_fault(Fault::ByteCount(7));
        let mismatch = run_command(&mut master, &settings, 1, 2, 0, 8).await;
        assert!(!mismatch.ok);
        assert!(mismatch.status.starts_with("Byte count mismatch"));
        assert_eq!(sim.open_links(), 0);
    }
}
