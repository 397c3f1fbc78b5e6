//! Byte sinks for encoded frames.
//!
//! The render loop owns exactly one [`Transport`] and drops it when the loop
//! ends; for the serial port that drop is what closes the device.

use std::error::Error;

/// Fire-and-forget writer for device commands. Acknowledgements are never read.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>>;
}

/// Records each write separately. Used by tests to check command framing.
impl Transport for Vec<Vec<u8>> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
        self.push(bytes.to_vec());
        Ok(())
    }
}

/// Discards everything, counting bytes. Backs `run --dry-run`.
#[derive(Debug, Default)]
pub struct DryRun {
    pub bytes_sent: usize,
}

impl Transport for DryRun {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
        self.bytes_sent += bytes.len();
        tracing::trace!("dry-run: {} bytes", bytes.len());
        Ok(())
    }
}

#[cfg(feature = "hardware")]
pub use serial::SerialTransport;

#[cfg(feature = "hardware")]
mod serial {
    use super::Transport;
    use crate::DeviceConfig;
    use serialport::SerialPort;
    use std::error::Error;
    use std::io::Write;
    use std::time::Duration;

    /// The matrix's USB serial port.
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
        path: String,
    }

    impl SerialTransport {
        pub fn open(config: &DeviceConfig) -> Result<Self, Box<dyn Error>> {
            let port = serialport::new(&config.path, config.baud)
                .timeout(Duration::from_secs(1))
                .open()
                .map_err(|e| format!("failed to open {}: {e}", config.path))?;
            tracing::info!("Opened {} at {} baud", config.path, config.baud);
            Ok(Self {
                port,
                path: config.path.clone(),
            })
        }
    }

    impl Transport for SerialTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
            self.port.write_all(bytes)?;
            Ok(())
        }
    }

    impl Drop for SerialTransport {
        fn drop(&mut self) {
            if let Err(e) = self.port.flush() {
                tracing::warn!("Flushing {} before close failed: {}", self.path, e);
            }
            tracing::info!("Closed {}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recorder_keeps_writes_apart() {
        let mut sink: Vec<Vec<u8>> = Vec::new();
        sink.send(&[1, 2, 3]).unwrap();
        sink.send(&[4]).unwrap();
        assert_eq!(sink, vec![vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn dry_run_counts_bytes() {
        let mut sink = DryRun::default();
        sink.send(&[0; 38]).unwrap();
        sink.send(&[0; 3]).unwrap();
        assert_eq!(sink.bytes_sent, 41);
    }
}
