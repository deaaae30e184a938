//! Exclusive, retrying request/response exchanges over one connection.
//!
//! An exchange walks `Sending -> Receiving -> ValidatingStatus -> Done`.
//! Any fault moves it to `Draining`, which discards whatever is left on the
//! line and starts over at `Sending`, until the attempt budget runs out.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{Error, Fault, Result};
use crate::port::Transport;
use crate::proto::command::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sending,
    Receiving { filled: usize },
    ValidatingStatus,
    Draining,
    Done,
}

pub struct CommandChannel {
    name: String,
    transport: Mutex<Box<dyn Transport>>,
    config: ChannelConfig,
}

impl CommandChannel {
    pub fn new(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        config: ChannelConfig,
    ) -> Self {
        Self {
            name: name.into(),
            transport: Mutex::new(transport),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        // A panic mid-exchange leaves the framing unknown; the next exchange
        // drains on its first fault anyway.
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` when the timeout is too large to represent; such exchanges
    /// never time out.
    fn deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.config.timeout)
    }

    /// Runs `cmd` and fills `out` with its payload. `out` must be exactly
    /// `cmd.response_len()` bytes long.
    pub fn execute(&self, cmd: Command, out: &mut [u8]) -> Result<()> {
        if out.len() != cmd.response_len() {
            return Err(Error::LengthMismatch {
                expected: cmd.response_len(),
                got: out.len(),
            });
        }

        let mut port = self.lock();
        let mut attempt = 1u32;
        let mut deadline = self.deadline();
        let mut state = State::Sending;

        while state != State::Done {
            if state == State::Draining {
                self.drain_locked(&mut **port);
                attempt += 1;
                deadline = self.deadline();
                state = State::Sending;
                continue;
            }
            match self.step(&mut **port, state, cmd, out, deadline) {
                Ok(next) => state = next,
                Err(fault) => {
                    if attempt >= self.config.max_attempts {
                        warn!(device = %self.name, ?cmd, attempt, %fault, "exchange failed, no attempts left");
                        return Err(Error::Exchange {
                            device: self.name.clone(),
                            attempts: attempt,
                            fault,
                        });
                    }
                    warn!(device = %self.name, ?cmd, attempt, %fault, "exchange failed, retrying");
                    state = State::Draining;
                }
            }
        }
        Ok(())
    }

    fn step(
        &self,
        port: &mut dyn Transport,
        state: State,
        cmd: Command,
        out: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<State, Fault> {
        match state {
            State::Sending => {
                port.write_all(&[cmd.opcode()])?;
                Ok(State::Receiving { filled: 0 })
            }
            State::Receiving { filled } if filled == out.len() => Ok(State::ValidatingStatus),
            State::Receiving { filled } => {
                let n = self.read_some(port, &mut out[filled..], deadline, filled)?;
                Ok(State::Receiving { filled: filled + n })
            }
            State::ValidatingStatus => {
                let mut status = [0u8; 1];
                self.read_some(port, &mut status, deadline, out.len())?;
                match status[0] {
                    0 => Ok(State::Done),
                    code => Err(Fault::Status(code)),
                }
            }
            State::Draining | State::Done => Ok(state),
        }
    }

    /// One read of at least a byte. Per-read timeouts keep waiting until the
    /// exchange deadline; end-of-stream is a fault.
    fn read_some(
        &self,
        port: &mut dyn Transport,
        buf: &mut [u8],
        deadline: Option<Instant>,
        received: usize,
    ) -> Result<usize, Fault> {
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Fault::Timeout(self.config.timeout));
            }
            match port.read(buf) {
                Ok(0) => {
                    return Err(Fault::Closed {
                        received,
                        expected: buf.len() + received,
                    });
                }
                Ok(n) => return Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(Fault::Io(e)),
            }
        }
    }

    /// Discards stale bytes to resynchronize framing.
    pub fn drain(&self) {
        let mut port = self.lock();
        self.drain_locked(&mut **port);
    }

    fn drain_locked(&self, port: &mut dyn Transport) {
        let mut discarded = 0usize;
        for pass in 0..self.config.drain_iterations {
            match port.discard_pending() {
                Ok(n) => discarded += n,
                Err(e) => debug!(device = %self.name, pass, error = %e, "drain read failed"),
            }
            if !self.config.drain_pause.is_zero() {
                std::thread::sleep(self.config.drain_pause);
            }
        }
        debug!(device = %self.name, discarded, "drained connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{self, MockDevice};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config() -> ChannelConfig {
        ChannelConfig {
            timeout: Duration::from_millis(50),
            max_attempts: 15,
            drain_iterations: 2,
            drain_pause: Duration::ZERO,
        }
    }

    fn channel(dev: &MockDevice, config: ChannelConfig) -> CommandChannel {
        CommandChannel::new("mock", Box::new(dev.connect()), config)
    }

    #[test]
    fn reads_payload_and_status() {
        let dev = MockDevice::new(0);
        let ch = channel(&dev, fast_config());
        let mut out = [0u8; 8];
        ch.execute(Command::Model, &mut out).unwrap();
        assert_eq!(&out, mock::MODEL);
        assert_eq!(dev.written(), b"m");
    }

    #[test]
    fn partial_reads_are_stitched() {
        let dev = MockDevice::new(3).max_read(7);
        let ch = channel(&dev, fast_config());
        let mut out = vec![0u8; 16_000];
        ch.execute(Command::RandomBytes, &mut out).unwrap();
        assert_eq!(out, mock::stream(3, 16_000));
        assert_eq!(dev.count(b'x'), 1);
    }

    #[test]
    fn zero_length_exchange() {
        let dev = MockDevice::new(0);
        let ch = channel(&dev, fast_config());
        ch.execute(Command::SelfDiagnostics, &mut []).unwrap();
        assert_eq!(dev.written(), b"d");
    }

    #[test]
    fn length_mismatch_does_no_io() {
        let dev = MockDevice::new(0);
        let ch = channel(&dev, fast_config());
        let mut out = [0u8; 3];
        let err = ch.execute(Command::Model, &mut out).unwrap_err();
        assert!(err.is_configuration());
        assert!(dev.written().is_empty());
    }

    #[test]
    fn recovers_from_transient_faults() {
        let dev = MockDevice::new(1);
        dev.bad_status_next(2);
        let ch = channel(&dev, fast_config());
        let mut out = vec![0u8; 16_000];
        ch.execute(Command::RandomBytes, &mut out).unwrap();
        assert_eq!(dev.count(b'x'), 3);
        assert_eq!(dev.drains(), 2 * 2);
        // third chunk served, two discarded by the failed attempts
        assert_eq!(out[..16], mock::stream(1, 48_000)[32_000..32_016]);
    }

    #[test]
    fn recovers_from_write_errors() {
        let dev = MockDevice::new(0);
        dev.io_fail_next(3);
        let ch = channel(&dev, fast_config());
        let mut out = [0u8; 4];
        ch.execute(Command::Version, &mut out).unwrap();
        assert_eq!(&out, mock::VERSION);
        assert_eq!(dev.count(b'v'), 4);
    }

    #[test]
    fn exhausted_budget_is_terminal() {
        let dev = MockDevice::new(0);
        dev.bad_status_next(15);
        let ch = channel(&dev, fast_config());
        let mut out = [0u8; 15];
        match ch.execute(Command::SerialNumber, &mut out) {
            Err(Error::Exchange {
                device,
                attempts,
                fault: Fault::Status(1),
            }) => {
                assert_eq!(device, "mock");
                assert_eq!(attempts, 15);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(dev.count(b's'), 15);
    }

    #[test]
    fn last_attempt_within_budget_succeeds() {
        let dev = MockDevice::new(0);
        dev.bad_status_next(14);
        let ch = channel(&dev, fast_config());
        let mut out = [0u8; 15];
        ch.execute(Command::SerialNumber, &mut out).unwrap();
        assert_eq!(&out, mock::SERIAL);
    }

    #[test]
    fn silent_device_times_out() {
        let dev = MockDevice::new(0);
        dev.silent();
        let config = ChannelConfig {
            timeout: Duration::from_millis(20),
            max_attempts: 2,
            ..fast_config()
        };
        let ch = channel(&dev, config);
        let mut out = [0u8; 4];
        let err = ch.execute(Command::Version, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Exchange {
                attempts: 2,
                fault: Fault::Timeout(_),
                ..
            }
        ));
        assert_eq!(dev.count(b'v'), 2);
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        let dev = MockDevice::new(0);
        let config = ChannelConfig {
            timeout: Duration::from_secs(u64::MAX),
            ..fast_config()
        };
        let ch = channel(&dev, config);
        let mut out = [0u8; 8];
        ch.execute(Command::Model, &mut out).unwrap();
        assert_eq!(&out, mock::MODEL);

        dev.bad_status_next(1);
        ch.execute(Command::Model, &mut out).unwrap();
        assert_eq!(dev.count(b'm'), 3);
    }

    #[test]
    fn end_of_stream_is_a_fault() {
        let dev = MockDevice::new(0);
        dev.silent();
        dev.eof();
        let config = ChannelConfig {
            max_attempts: 1,
            ..fast_config()
        };
        let ch = channel(&dev, config);
        let mut out = [0u8; 8];
        let err = ch.execute(Command::Model, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Exchange {
                fault: Fault::Closed {
                    received: 0,
                    expected: 8
                },
                ..
            }
        ));
    }

    #[test]
    fn drain_discards_stale_bytes() {
        let dev = MockDevice::new(0).stale(&[1, 2, 3, 0]);
        let ch = channel(&dev, fast_config());
        ch.drain();
        let mut out = [0u8; 8];
        ch.execute(Command::Model, &mut out).unwrap();
        assert_eq!(&out, mock::MODEL);
        assert!(!dev.interleaved());
    }

    #[test]
    fn concurrent_exchanges_do_not_interleave() {
        let dev = MockDevice::new(5).max_read(3);
        let ch = Arc::new(channel(&dev, fast_config()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ch = Arc::clone(&ch);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let mut out = [0u8; 512];
                        ch.execute(Command::FrequencyTable, &mut out).unwrap();
                        assert_eq!(out[511], 255);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(dev.count(b'f'), 20);
        assert!(!dev.interleaved());
    }
}
