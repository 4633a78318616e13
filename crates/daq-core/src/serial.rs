//! Serial port plumbing shared by the serial drivers.
//!
//! Requires the `serial` feature:
//!
//! ```toml
//! [dependencies]
//! daq-core = { path = "../daq-core", features = ["serial"] }
//! ```
//!
//! - [`SerialPortIO`]: anything that reads and writes asynchronously
//! - [`SharedPort`]: a boxed port behind a mutex, with line buffering
//! - [`open_serial_async`]: open a port with 8N1 framing off the async runtime
//! - [`drain_serial_buffer`]: discard bytes left over from an earlier exchange
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_core::serial::{open_serial_async, wrap_shared, SerialSettings};
//!
//! let settings = SerialSettings::default();
//! let port = open_serial_async("/dev/ttyUSB0", &settings, "Cornerstone").await?;
//! let shared = wrap_shared(Box::new(port));
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::sync::Mutex;

/// Async serial port I/O.
///
/// Implemented for `tokio_serial::SerialStream` and for
/// `tokio::io::DuplexStream`, which the driver tests use as a fake device.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Shared serial port with buffered line reads.
///
/// ```rust,ignore
/// use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
///
/// async fn send_query(port: &SharedPort, command: &str) -> anyhow::Result<String> {
///     let mut guard = port.lock().await;
///     guard.get_mut().write_all(format!("{}\r\n", command).as_bytes()).await?;
///     let mut response = String::new();
///     guard.read_line(&mut response).await?;
///     Ok(response.trim().to_string())
/// }
/// ```
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Wrap a boxed port for sharing.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Line settings for a serial device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SerialSettings {
    /// Read timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Open a serial port on a blocking thread.
///
/// Framing is 8N1 without flow control. `device_name` only feeds the error
/// message.
///
/// # Errors
///
/// Returns an error if the port cannot be opened or spawn_blocking fails.
pub async fn open_serial_async(
    port_path: &str,
    settings: &SerialSettings,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();
    let baud_rate = settings.baud_rate;
    let timeout = settings.timeout();

    tracing::debug!(port = %port_path, baud_rate, "Opening serial port");

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Read and discard whatever arrives within `timeout_ms`.
///
/// Returns the number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, timeout_ms: u64) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut total_discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    total_discarded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn shared_port_reads_lines() {
        let (mut host, device) = tokio::io::duplex(64);
        let port: SharedPort = wrap_shared(Box::new(device));
        let reader = port.clone();

        host.write_all(b"gowave 500\r\n500.000\r\n").await.unwrap();

        let mut guard = reader.lock().await;
        let mut line = String::new();
        guard.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "gowave 500");
        line.clear();
        guard.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "500.000");
    }

    #[tokio::test]
    async fn drain_discards_stale_bytes() {
        let (mut host, mut device) = tokio::io::duplex(64);
        host.write_all(b"stale data 12345").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let discarded = drain_serial_buffer(&mut device, 50).await;
        assert_eq!(discarded, 16);

        let again = drain_serial_buffer(&mut device, 20).await;
        assert_eq!(again, 0);
    }

    #[test]
    fn settings_defaults() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout(), Duration::from_secs(2));

        let parsed: SerialSettings = toml::from_str("baud_rate = 19200").unwrap();
        assert_eq!(parsed.baud_rate, 19200);
        assert_eq!(parsed.timeout_ms, 2000);
    }
}
