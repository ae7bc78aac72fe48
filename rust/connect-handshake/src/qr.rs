//! Out-of-band (QR) surface: the camera lease and the confirmation code.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use connect_protocol::Refusal;
use rand::Rng;
use tokio::sync::watch;

use crate::{ChannelError, Outcome, ResponseChannel};

/// Short numeric code the user reads out to the requester to finish an
/// out-of-band handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    /// Generate a random code of `digits` decimal digits (at least one).
    pub fn generate(digits: usize) -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..digits.max(1))
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(code)
    }

    /// The digits
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConfirmationCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The device camera. Only one scan surface may hold it at a time.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    busy: Arc<AtomicBool>,
}

impl Scanner {
    /// A free scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the camera for a scan surface.
    ///
    /// Fails with [`ChannelError::SurfaceBusy`] while another lease is live.
    pub fn acquire(&self) -> Result<ScannerLease, ChannelError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChannelError::SurfaceBusy)?;
        tracing::debug!("Scanner acquired");
        Ok(ScannerLease {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Whether a lease is live
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Exclusive use of the [`Scanner`]; released when dropped.
#[derive(Debug)]
pub struct ScannerLease {
    busy: Arc<AtomicBool>,
}

impl Drop for ScannerLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        tracing::debug!("Scanner released");
    }
}

/// What the out-of-band surface shows the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinDisplay {
    /// Waiting for the handshake to finish
    Pending,
    /// Access was granted; read this code out to the requester
    Confirm(ConfirmationCode),
    /// No access was granted
    Refused(Refusal),
}

/// Response channel of the QR transport.
///
/// Nothing machine-readable goes back over the scan channel: the outcome is
/// only shown to the user. Closing releases the scanner.
pub struct PinResponder {
    display: watch::Sender<PinDisplay>,
    lease: Option<ScannerLease>,
}

impl PinResponder {
    /// Respond on the surface holding `lease`. The receiver follows what
    /// the surface shows.
    pub fn new(lease: ScannerLease) -> (Self, watch::Receiver<PinDisplay>) {
        let (display, receiver) = watch::channel(PinDisplay::Pending);
        let responder = Self {
            display,
            lease: Some(lease),
        };
        (responder, receiver)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ResponseChannel for PinResponder {
    async fn deliver(&mut self, outcome: &Outcome) -> Result<(), ChannelError> {
        let shown = match outcome {
            Outcome::Granted {
                confirmation: Some(code),
                ..
            } => PinDisplay::Confirm(code.clone()),
            Outcome::Granted {
                confirmation: None, ..
            } => return Err(ChannelError::Encoding("missing confirmation code".into())),
            Outcome::Refused(reason) => PinDisplay::Refused(*reason),
        };
        self.display.send_replace(shown);
        Ok(())
    }

    async fn close(&mut self) {
        self.lease.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_generates_codes_of_the_requested_length() {
        for digits in [1, 4, 8] {
            let code = ConfirmationCode::generate(digits);
            assert_eq!(code.as_str().len(), digits);
            assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(ConfirmationCode::generate(0).as_str().len(), 1);
    }

    #[test]
    fn it_hands_out_one_lease_at_a_time() -> TestResult {
        let scanner = Scanner::new();
        let lease = scanner.acquire()?;

        assert!(scanner.is_busy());
        assert_eq!(scanner.acquire().err(), Some(ChannelError::SurfaceBusy));

        drop(lease);
        assert!(!scanner.is_busy());
        assert!(scanner.acquire().is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn it_shows_the_code_and_releases_the_scanner() -> TestResult {
        let scanner = Scanner::new();
        let (mut responder, display) = PinResponder::new(scanner.acquire()?);
        let code = ConfirmationCode::generate(4);

        responder
            .deliver(&Outcome::Granted {
                delegate: connect_protocol::PortableIdentity {
                    uri: "did:key:z6Mkdelegate".parse()?,
                    private_keys: vec![],
                },
                grants: vec![],
                confirmation: Some(code.clone()),
            })
            .await?;
        assert_eq!(*display.borrow(), PinDisplay::Confirm(code));

        responder.close().await;
        assert!(!scanner.is_busy());
        Ok(())
    }
}
