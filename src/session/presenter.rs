//! Pairing presenters.
//!
//! The session driver hands every pairing credential to a
//! [`PairingPresenter`]; how it reaches a human is up to the adapter.

use std::io::Write;

pub trait PairingPresenter: Send + Sync {
    fn present(&self, pairing_code: &str);
}

/// Prints the pairing payload and linking instructions to stderr.
#[derive(Debug, Default)]
pub struct TerminalPresenter;

impl PairingPresenter for TerminalPresenter {
    fn present(&self, pairing_code: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\nPairing code generated. Link this device to continue:\n");
        let _ = writeln!(err, "    {pairing_code}\n");
        let _ = writeln!(err, "1. Open the messaging app on your phone");
        let _ = writeln!(err, "2. Go to Settings > Linked Devices");
        let _ = writeln!(err, "3. Tap \"Link a Device\"");
        let _ = writeln!(err, "4. Scan or enter the code above (render it as a QR code if needed)");
        let _ = writeln!(err, "\nWaiting for connection...\n");
    }
}

/// Emits the pairing payload as a structured log line.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl PairingPresenter for LogPresenter {
    fn present(&self, pairing_code: &str) {
        tracing::warn!(pairing_code, "session needs pairing; scan the code to link this device");
    }
}
