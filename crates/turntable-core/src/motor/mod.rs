//! Serial link to the relay microcontroller that switches the turntable motor.
//!
//! The motor has no encoder. Rotation is an on-pulse of a given duration:
//! relay on, wait, relay off. The wait is the dominant latency of a session
//! and observes a [`StopSignal`] so an operator stop never has to sit out a
//! long rotation.

mod serial;

pub use serial::{
    list_ports, PortInfo, SerialChannel, SerialEndpoint, SerialOpener, SimulatedSerial,
    SystemSerial, ACK, RELAY_OFF, RELAY_ON,
};

use crate::error::{CommandError, ConnectError, RotationError};
use crate::stop::StopSignal;
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Delay after opening the port before commands are valid; most boards reset
/// when the port opens.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

type SharedChannel = Arc<Mutex<Box<dyn SerialChannel>>>;

// ---------------------------------------------------------------------------
// MotorLinkState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorLinkState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

impl fmt::Display for MotorLinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MotorLinkState::Disconnected => "disconnected",
            MotorLinkState::Connecting => "connecting",
            MotorLinkState::Connected => "connected",
            MotorLinkState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// MotorLink
// ---------------------------------------------------------------------------

/// Serial transport calls block (port open, write, acknowledgement read up
/// to the port timeout), so they run on tokio's blocking pool.
pub struct MotorLink {
    opener: Arc<dyn SerialOpener>,
    endpoint: Option<SerialEndpoint>,
    channel: Option<SharedChannel>,
    state: MotorLinkState,
    settle: Duration,
    /// A relay-on may have reached the board with no relay-off after it.
    relay_closed: bool,
    /// Commands written whose acknowledgement line has not been read.
    unacked: usize,
}

impl MotorLink {
    pub fn new(opener: Arc<dyn SerialOpener>) -> Self {
        Self {
            opener,
            endpoint: None,
            channel: None,
            state: MotorLinkState::Disconnected,
            settle: DEFAULT_SETTLE,
            relay_closed: false,
            unacked: 0,
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> MotorLinkState {
        self.state
    }

    /// Last endpoint a connection was attempted on.
    pub fn endpoint(&self) -> Option<&SerialEndpoint> {
        self.endpoint.as_ref()
    }

    /// Last known state; never probes the hardware.
    pub fn is_connected(&self) -> bool {
        self.state == MotorLinkState::Connected
    }

    /// Open a fresh channel, replacing any previous one, and wait out the
    /// board's reset before reporting connected.
    pub async fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectError> {
        if baud_rate == 0 {
            return Err(ConnectError::InvalidBaudRate(baud_rate));
        }
        self.release_relay();
        self.channel = None;
        self.unacked = 0;
        let endpoint = SerialEndpoint {
            port: port.to_string(),
            baud_rate,
        };
        self.endpoint = Some(endpoint.clone());
        self.state = MotorLinkState::Connecting;

        let opener = Arc::clone(&self.opener);
        let target = endpoint.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&target))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));

        match opened {
            Ok(channel) => {
                tokio::time::sleep(self.settle).await;
                self.channel = Some(Arc::new(Mutex::new(channel)));
                self.relay_closed = false;
                self.state = MotorLinkState::Connected;
                tracing::info!(port, baud_rate, "motor link connected");
                Ok(())
            }
            Err(source) => {
                self.state = MotorLinkState::Disconnected;
                tracing::error!(port, baud_rate, error = %source, "motor link connect failed");
                Err(ConnectError::Open {
                    port: endpoint.port,
                    baud_rate,
                    source,
                })
            }
        }
    }

    /// Close the channel. A no-op when not connected.
    pub fn disconnect(&mut self) {
        self.release_relay();
        if self.channel.take().is_some() {
            tracing::info!("motor link disconnected");
        }
        self.unacked = 0;
        self.state = MotorLinkState::Disconnected;
    }

    pub async fn turn_on(&mut self) -> Result<(), CommandError> {
        self.write(RELAY_ON).await?;
        self.drain_acks().await;
        Ok(())
    }

    pub async fn turn_off(&mut self) -> Result<(), CommandError> {
        self.write(RELAY_OFF).await?;
        self.drain_acks().await;
        Ok(())
    }

    /// Relay on, hold for `duration` (or until `stop` fires), relay off.
    ///
    /// The hold is measured from the moment the relay-on write completes.
    /// Acknowledgements are read only once the relay is open again. If
    /// anything fails after the relay may have closed, a relay-off is still
    /// attempted; an error from that cleanup is logged, not returned. Dropping
    /// the future mid-rotation also opens the relay.
    pub async fn rotate_for_duration(
        &mut self,
        duration: Duration,
        stop: &StopSignal,
    ) -> Result<(), RotationError> {
        if stop.is_stopped() {
            return Err(RotationError::Cancelled { elapsed_ms: 0 });
        }

        let mut guard = RelayGuard { link: self };
        if let Err(e) = guard.link.write(RELAY_ON).await {
            guard.link.cleanup_off().await;
            return Err(e.into());
        }
        let closed_at = Instant::now();

        let cancelled = tokio::select! {
            _ = tokio::time::sleep_until(closed_at + duration) => false,
            _ = stop.stopped() => true,
        };

        if cancelled {
            guard.link.cleanup_off().await;
            let elapsed_ms = closed_at.elapsed().as_millis() as u64;
            tracing::warn!(elapsed_ms, planned_ms = duration.as_millis() as u64, "rotation cancelled");
            return Err(RotationError::Cancelled { elapsed_ms });
        }

        guard.link.write(RELAY_OFF).await?;
        guard.link.drain_acks().await;
        tracing::debug!(duration_ms = duration.as_millis() as u64, "rotation finished");
        Ok(())
    }

    async fn cleanup_off(&mut self) {
        match self.write(RELAY_OFF).await {
            Ok(()) => self.drain_acks().await,
            Err(e) => tracing::warn!(error = %e, "relay-off after failed rotation did not go through"),
        }
    }

    async fn write(&mut self, command: u8) -> Result<(), CommandError> {
        match self.state {
            MotorLinkState::Connected => {}
            MotorLinkState::Faulted => return Err(CommandError::Faulted),
            MotorLinkState::Disconnected | MotorLinkState::Connecting => {
                return Err(CommandError::NotConnected)
            }
        }

        let label = command as char;
        if command == RELAY_ON {
            self.relay_closed = true;
        }
        if let Err(source) = self.transport(move |ch| ch.write_command(command)).await {
            self.channel = None;
            self.state = MotorLinkState::Faulted;
            tracing::error!(command = %label, error = %source, "serial write failed; link faulted");
            return Err(CommandError::Write {
                command: label,
                source,
            });
        }
        if command == RELAY_OFF {
            self.relay_closed = false;
        }
        self.unacked += 1;
        tracing::debug!(command = %label, "sent relay command");
        Ok(())
    }

    /// Read the acknowledgement lines owed for earlier writes. Firmware that
    /// never answers costs one read timeout here.
    async fn drain_acks(&mut self) {
        let owed = std::mem::take(&mut self.unacked);
        if owed == 0 {
            return;
        }
        let lines = self
            .transport(move |ch| {
                let mut lines = Vec::with_capacity(owed);
                for _ in 0..owed {
                    match ch.read_ack()? {
                        Some(line) => lines.push(line),
                        None => break,
                    }
                }
                Ok(lines)
            })
            .await;
        match lines {
            Ok(lines) if lines.is_empty() => tracing::trace!("no acknowledgement line"),
            Ok(lines) => {
                for line in lines.iter().filter(|l| l.as_str() != ACK) {
                    tracing::warn!(response = %line, "unexpected acknowledgement from microcontroller");
                }
            }
            Err(e) => tracing::debug!(error = %e, "reading acknowledgement failed"),
        }
    }

    async fn transport<T, F>(&self, op: F) -> io::Result<T>
    where
        F: FnOnce(&mut Box<dyn SerialChannel>) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(channel) = self.channel.clone() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no open channel"));
        };
        tokio::task::spawn_blocking(move || op(&mut *lock_channel(&channel)))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    /// Synchronous relay-off for paths that cannot await. Waits for any
    /// in-flight transport call to finish first.
    fn release_relay(&mut self) {
        if !self.relay_closed {
            return;
        }
        let result = match self.channel.as_ref() {
            Some(channel) => lock_channel(channel).write_command(RELAY_OFF),
            None => return,
        };
        match result {
            Ok(()) => {
                self.relay_closed = false;
                self.unacked += 1;
                tracing::warn!("rotation abandoned; relay opened");
            }
            Err(e) => tracing::error!(error = %e, "relay-off after abandoned rotation failed"),
        }
    }
}

fn lock_channel(channel: &SharedChannel) -> MutexGuard<'_, Box<dyn SerialChannel>> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens the relay if a rotation is dropped while it may be closed.
struct RelayGuard<'a> {
    link: &'a mut MotorLink,
}

impl Drop for RelayGuard<'_> {
    fn drop(&mut self) {
        self.link.release_relay();
    }
}

impl Drop for MotorLink {
    fn drop(&mut self) {
        self.release_relay();
    }
}

impl fmt::Debug for MotorLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorLink")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("settle", &self.settle)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Recording serial transport for tests: logs every command byte and can be
/// told to fail opens or writes.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct Wire {
        pub commands: Vec<u8>,
        pub opens: usize,
        pub fail_open: bool,
        /// Fail the write of the Nth command (0-based, counted across opens).
        pub fail_write_at: Option<usize>,
        pub failed_writes: usize,
        pub ack: Option<String>,
        /// How long each acknowledgement read blocks before answering.
        pub ack_delay: Duration,
        pub sent_at: Vec<std::time::Instant>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingSerial {
        pub wire: Arc<Mutex<Wire>>,
    }

    impl RecordingSerial {
        pub fn commands(&self) -> Vec<u8> {
            self.wire.lock().unwrap().commands.clone()
        }
    }

    impl SerialOpener for RecordingSerial {
        fn open(&self, _endpoint: &SerialEndpoint) -> io::Result<Box<dyn SerialChannel>> {
            let mut wire = self.wire.lock().unwrap();
            if wire.fail_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
            }
            wire.opens += 1;
            Ok(Box::new(RecordingChannel {
                wire: Arc::clone(&self.wire),
            }))
        }
    }

    struct RecordingChannel {
        wire: Arc<Mutex<Wire>>,
    }

    impl SerialChannel for RecordingChannel {
        fn write_command(&mut self, command: u8) -> io::Result<()> {
            let mut wire = self.wire.lock().unwrap();
            let index = wire.commands.len() + wire.failed_writes;
            if wire.fail_write_at == Some(index) {
                wire.failed_writes += 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            wire.commands.push(command);
            wire.sent_at.push(std::time::Instant::now());
            Ok(())
        }

        fn read_ack(&mut self) -> io::Result<Option<String>> {
            let (ack, delay) = {
                let wire = self.wire.lock().unwrap();
                (wire.ack.clone(), wire.ack_delay)
            };
            std::thread::sleep(delay);
            Ok(ack)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testing::RecordingSerial;
    use super::*;

    async fn connected(serial: &RecordingSerial) -> MotorLink {
        let mut link =
            MotorLink::new(Arc::new(serial.clone())).with_settle_delay(Duration::ZERO);
        link.connect("/dev/ttyACM0", 9600).await.unwrap();
        link
    }

    #[tokio::test]
    async fn connect_sets_state_and_endpoint() {
        let serial = RecordingSerial::default();
        let link = connected(&serial).await;
        assert!(link.is_connected());
        assert_eq!(link.state(), MotorLinkState::Connected);
        assert_eq!(link.endpoint().unwrap().baud_rate, 9600);
    }

    #[tokio::test]
    async fn connect_failure_reports_port() {
        let serial = RecordingSerial::default();
        serial.wire.lock().unwrap().fail_open = true;
        let mut link = MotorLink::new(Arc::new(serial)).with_settle_delay(Duration::ZERO);
        let err = link.connect("/dev/ttyUSB9", 9600).await.unwrap_err();
        assert!(err.to_string().contains("/dev/ttyUSB9"));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn connect_waits_for_settle_delay() {
        let serial = RecordingSerial::default();
        let mut link =
            MotorLink::new(Arc::new(serial)).with_settle_delay(Duration::from_millis(50));
        let started = Instant::now();
        link.connect("p", 9600).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn zero_baud_rate_rejected() {
        let mut link = MotorLink::new(Arc::new(RecordingSerial::default()));
        assert!(matches!(
            link.connect("p", 0).await,
            Err(ConnectError::InvalidBaudRate(0))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        link.disconnect();
        link.disconnect();
        assert_eq!(link.state(), MotorLinkState::Disconnected);
        assert!(matches!(link.turn_on().await, Err(CommandError::NotConnected)));
    }

    #[tokio::test]
    async fn relay_commands_are_single_ascii_bytes() {
        let serial = RecordingSerial::default();
        serial.wire.lock().unwrap().ack = Some("BUSY".into());
        let mut link = connected(&serial).await;
        link.turn_on().await.unwrap();
        link.turn_off().await.unwrap();
        assert_eq!(serial.commands(), vec![b'1', b'0']);
    }

    #[tokio::test]
    async fn write_failure_faults_link_until_reconnect() {
        let serial = RecordingSerial::default();
        serial.wire.lock().unwrap().fail_write_at = Some(0);
        let mut link = connected(&serial).await;

        assert!(matches!(link.turn_on().await, Err(CommandError::Write { .. })));
        assert_eq!(link.state(), MotorLinkState::Faulted);
        assert!(matches!(link.turn_off().await, Err(CommandError::Faulted)));

        link.connect("/dev/ttyACM0", 9600).await.unwrap();
        link.turn_off().await.unwrap();
        assert_eq!(serial.wire.lock().unwrap().opens, 2);
        assert_eq!(serial.commands(), vec![b'0']);
    }

    #[tokio::test]
    async fn rotate_sends_on_then_off() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        let started = Instant::now();
        link.rotate_for_duration(Duration::from_millis(30), &StopSignal::new())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(serial.commands(), vec![b'1', b'0']);
    }

    #[tokio::test]
    async fn rotate_cancelled_still_turns_motor_off() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        let stop = StopSignal::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stopper.stop();
        });

        let started = Instant::now();
        let err = link
            .rotate_for_duration(Duration::from_secs(30), &stop)
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(serial.commands(), vec![b'1', b'0']);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn rotate_with_stop_already_set_sends_nothing() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        let stop = StopSignal::new();
        stop.stop();
        assert!(link
            .rotate_for_duration(Duration::from_secs(1), &stop)
            .await
            .is_err());
        assert!(serial.commands().is_empty());
    }

    #[tokio::test]
    async fn slow_acknowledgement_does_not_lengthen_rotation() {
        let serial = RecordingSerial::default();
        serial.wire.lock().unwrap().ack_delay = Duration::from_millis(100);
        let mut link = connected(&serial).await;
        link.rotate_for_duration(Duration::from_millis(200), &StopSignal::new())
            .await
            .unwrap();

        let wire = serial.wire.lock().unwrap();
        assert_eq!(wire.commands, vec![b'1', b'0']);
        let closed = wire.sent_at[1] - wire.sent_at[0];
        assert!(closed >= Duration::from_millis(200), "relay closed for {closed:?}");
        assert!(closed < Duration::from_millis(280), "relay closed for {closed:?}");
    }

    #[tokio::test]
    async fn dropped_rotation_opens_relay() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            link.rotate_for_duration(Duration::from_secs(10), &StopSignal::new()),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(serial.commands(), vec![b'1', b'0']);
        assert!(link.is_connected());

        drop(link);
        assert_eq!(serial.commands(), vec![b'1', b'0']);
    }

    #[tokio::test]
    async fn dropping_link_with_relay_on_opens_it() {
        let serial = RecordingSerial::default();
        let mut link = connected(&serial).await;
        link.turn_on().await.unwrap();
        drop(link);
        assert_eq!(serial.commands(), vec![b'1', b'0']);
    }

    #[tokio::test]
    async fn rotate_reports_failed_relay_off() {
        let serial = RecordingSerial::default();
        serial.wire.lock().unwrap().fail_write_at = Some(1);
        let mut link = connected(&serial).await;
        let err = link
            .rotate_for_duration(Duration::from_millis(5), &StopSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RotationError::Command(CommandError::Write { command: '0', .. })
        ));
        assert_eq!(link.state(), MotorLinkState::Faulted);
    }
}
