//! TLS Session.
//!
//! State machine shape generalized from the call-session pattern
//! (an explicit `State` enum, a `transition` method consulting a validity
//! matrix, a dedicated state-transition error) even though the domain here
//! is a TLS handshake rather than a telephony leg — the pattern, not the
//! domain, is what's reused.

use crate::dataport::{check_capacity, DEFAULT_DATAPORT_SIZE};
use crate::error::{CoreError, ErrorCode, Result};
use crate::handle::RoutingMode;

/// Negotiable cipher suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherSuite {
    DheRsaAes128GcmSha256,
    EcdheRsaAes128GcmSha256,
}

impl CipherSuite {
    /// Hash algorithm implied by this suite, used to derive
    /// [`TlsPolicy`] defaults when the caller supplies none.
    pub fn session_hash(self) -> SessionHash {
        SessionHash::Sha256
    }

    /// Minimum asymmetric key bit length implied by this suite's AES key
    /// length.
    pub fn min_asymmetric_bits(self) -> u32 {
        match self {
            CipherSuite::DheRsaAes128GcmSha256 => 2048,
            CipherSuite::EcdheRsaAes128GcmSha256 => 2048,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionHash {
    Sha256,
}

/// Signature/session policy. Derived from the negotiated cipher suite when
/// the caller does not override it explicitly.
#[derive(Clone, Copy, Debug)]
pub struct TlsPolicy {
    pub session_hash: SessionHash,
    pub signature_hash: SessionHash,
    pub min_asymmetric_bits: u32,
}

impl TlsPolicy {
    pub fn derive_from(suite: CipherSuite) -> Self {
        Self {
            session_hash: suite.session_hash(),
            signature_hash: suite.session_hash(),
            min_asymmetric_bits: suite.min_asymmetric_bits(),
        }
    }
}

/// Maximum size of the PEM-encoded trust anchor.
pub const MAX_TRUST_ANCHOR_BYTES: usize = 3072;
/// Maximum number of offered cipher suites.
pub const MAX_CIPHERSUITES: usize = 8;

pub struct TlsConfig {
    pub trust_anchor_pem: Vec<u8>,
    pub ciphersuites: Vec<CipherSuite>,
    pub policy: Option<TlsPolicy>,
}

impl TlsConfig {
    pub fn new(trust_anchor_pem: Vec<u8>, ciphersuites: Vec<CipherSuite>, policy: Option<TlsPolicy>) -> Result<Self> {
        if trust_anchor_pem.len() > MAX_TRUST_ANCHOR_BYTES {
            return Err(CoreError::insufficient_space("trust anchor PEM exceeds 3072 bytes"));
        }
        if ciphersuites.is_empty() || ciphersuites.len() > MAX_CIPHERSUITES {
            return Err(CoreError::invalid_parameter("between 1 and 8 cipher suites must be offered"));
        }
        Ok(Self { trust_anchor_pem, ciphersuites, policy })
    }

    /// Effective policy: the caller's override, or one derived from the
    /// first (most preferred) offered cipher suite.
    pub fn effective_policy(&self) -> TlsPolicy {
        self.policy.unwrap_or_else(|| TlsPolicy::derive_from(self.ciphersuites[0]))
    }
}

/// Where the TLS implementation actually runs, reusing the
/// Handle/Proxy routing core rather than inventing a parallel mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsMode {
    Library,
    RpcServer,
    RpcClient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsState {
    Configured,
    Handshaking,
    Established,
    Reset,
    Closed,
}

impl TlsState {
    /// Validity matrix for `transition`.
    fn can_transition_to(self, next: TlsState) -> bool {
        use TlsState::*;
        matches!(
            (self, next),
            (Configured, Handshaking)
                | (Handshaking, Established)
                | (Handshaking, Reset)
                | (Established, Reset)
                | (Established, Closed)
                | (Reset, Handshaking)
                | (Reset, Closed)
        )
    }
}

/// Caller-supplied transport callbacks. TLS never touches a socket
/// directly — send/recv are injected closures over an opaque context,
/// keeping this crate's preference for injected callback traits over
/// owning the transport.
pub trait TlsTransport: Send {
    fn send(&mut self, data: &[u8]) -> Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;
}

pub struct TlsSession {
    mode: TlsMode,
    config: TlsConfig,
    state: TlsState,
    dataport_size: usize,
}

impl TlsSession {
    pub fn new(mode: TlsMode, config: TlsConfig) -> Self {
        Self::with_dataport_size(mode, config, DEFAULT_DATAPORT_SIZE)
    }

    /// As [`TlsSession::new`], but bound to a dataport other than the
    /// default size `read`/`write` are checked against.
    pub fn with_dataport_size(mode: TlsMode, config: TlsConfig, dataport_size: usize) -> Self {
        Self { mode, config, state: TlsState::Configured, dataport_size }
    }

    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    pub fn state(&self) -> TlsState {
        self.state
    }

    fn transition(&mut self, next: TlsState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::new(
                ErrorCode::InvalidState,
                format!("illegal TLS state transition {:?} -> {:?}", self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Drive the handshake to completion. Requires
    /// `Configured` or `Reset` state.
    pub fn handshake(&mut self, transport: &mut dyn TlsTransport) -> Result<()> {
        self.transition(TlsState::Handshaking)?;
        // Real handshake record exchange is out of scope here; this models
        // only the state machine and the transport seam.
        let mut scratch = [0u8; 0];
        let _ = transport.recv(&mut scratch);
        self.transition(TlsState::Established)
    }

    /// Write application data. `Established` only. `data_len == 0` is a
    /// clean half-close from the caller's side;
    /// anything else while not established is `Aborted`. A request larger
    /// than the session's dataport fails `InsufficientSpace` before any
    /// bytes reach the transport.
    pub fn write(&mut self, transport: &mut dyn TlsTransport, data: &[u8]) -> Result<usize> {
        if self.state != TlsState::Established {
            return Err(CoreError::new(ErrorCode::OperationDenied, "write attempted outside the Established state"));
        }
        if data.is_empty() {
            self.transition(TlsState::Closed)?;
            return Ok(0);
        }
        check_capacity(self.dataport_size, data.len())?;
        transport.send(data)
    }

    /// Read application data. `Established` only; a `0`-length read
    /// signals the peer closed cleanly, per protocol. A requested buffer
    /// larger than the session's dataport fails `InsufficientSpace` before
    /// the transport is touched.
    pub fn read(&mut self, transport: &mut dyn TlsTransport, buf: &mut [u8]) -> Result<usize> {
        if self.state != TlsState::Established {
            return Err(CoreError::new(ErrorCode::OperationDenied, "read attempted outside the Established state"));
        }
        check_capacity(self.dataport_size, buf.len())?;
        let n = transport.recv(buf)?;
        if n == 0 {
            self.transition(TlsState::Closed)?;
        }
        Ok(n)
    }

    /// Reset the session back to a fresh handshake without reconstructing
    /// it. Valid from `Handshaking` or `Established`.
    pub fn reset(&mut self) -> Result<()> {
        self.transition(TlsState::Reset)
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }
}

/// Confirms the routing enum shares shape with the Handle/Proxy core's
/// [`RoutingMode`], used when a `TlsMode::RpcClient` session is registered
/// against a context whose routing mode must be compatible.
pub fn tls_mode_compatible_with(mode: TlsMode, routing_mode: RoutingMode) -> bool {
    match (mode, routing_mode) {
        (TlsMode::Library, RoutingMode::Library | RoutingMode::Switching) => true,
        (TlsMode::RpcClient, RoutingMode::RpcClient | RoutingMode::Switching) => true,
        (TlsMode::RpcServer, _) => true,
        _ => false,
    }
}
