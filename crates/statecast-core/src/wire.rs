//! Statecast wire format: every datagram the relay reads or writes.
//!
//! A datagram starts with a single ASCII command tag. Signals (handshake,
//! ping, disconnect) are nothing more than that tag. Object datagrams carry a
//! fixed 255-byte frame whose first six bytes the relay understands; the rest
//! belongs to the clients and is stored and replayed untouched.
//!
//! Frame types are #[repr(C)] and use zerocopy derives, so encoding is a
//! byte view and decoding is a copy into a zeroed frame. There is no unsafe
//! code in this module.

use std::fmt;

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of every object frame the relay stores or replays.
pub const OBJECT_FRAME_LEN: usize = 255;

/// Bytes of an object frame the relay interprets: tag, timestamp, two
/// reserved bytes, the client-local placeholder id, and the object id.
pub const FRAME_HEADER_LEN: usize = 6;

/// Default UDP port when neither config nor the command line names one.
pub const DEFAULT_PORT: u16 = 30000;

// ── Command ───────────────────────────────────────────────────────────────────

/// Command tag carried in byte 0 of every datagram.
///
/// Some tags only ever travel relay → client. The relay still decodes them so
/// it can drop them explicitly rather than treating them as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// `a`: client asks to join.
    HandshakeRequest = b'a',
    /// `b`: relay acknowledges a new peer.
    HandshakeAck = b'b',
    /// `c`: keepalive, no body.
    Ping = b'c',
    /// `d`: relay tells a peer it has been dropped.
    ServerDisconnect = b'd',
    /// `e`: client is leaving.
    ClientDisconnect = b'e',
    /// `i`: create a scene object whose id every client already agrees on.
    InitGlobal = b'i',
    /// `j`: create an object that only the sender knows about so far.
    InitLocal = b'j',
    /// `k`: relay answers `j` with the id it allocated.
    IdMapping = b'k',
    /// `m`: client → relay object update.
    ObjectUpdate = b'm',
    /// `n`: relay → client object update.
    BroadcastUpdate = b'n',
}

impl Command {
    /// Whether datagrams with this tag must carry an object frame.
    pub fn carries_frame(self) -> bool {
        matches!(
            self,
            Command::InitGlobal | Command::InitLocal | Command::ObjectUpdate
        )
    }

    /// The one-byte datagram for a bare signal.
    pub fn signal(self) -> [u8; 1] {
        [self as u8]
    }
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'a' => Ok(Command::HandshakeRequest),
            b'b' => Ok(Command::HandshakeAck),
            b'c' => Ok(Command::Ping),
            b'd' => Ok(Command::ServerDisconnect),
            b'e' => Ok(Command::ClientDisconnect),
            b'i' => Ok(Command::InitGlobal),
            b'j' => Ok(Command::InitLocal),
            b'k' => Ok(Command::IdMapping),
            b'm' => Ok(Command::ObjectUpdate),
            b'n' => Ok(Command::BroadcastUpdate),
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(c: Command) -> u8 {
        c as u8
    }
}

// ── Object ids ────────────────────────────────────────────────────────────────

/// Relay-scoped object identifier. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u8);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Object Frame ──────────────────────────────────────────────────────────────

/// The state of one tracked object as it travels on the wire.
///
/// Clients send it with tag `i`, `j` or `m`; the relay replays it with tag
/// `n`. Only the header fields are interpreted here.
///
/// Wire size: 255 bytes.
#[derive(Clone, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ObjectFrame {
    /// Command tag. Overwritten with `n` on every relay broadcast.
    pub tag: u8,

    /// Sender's tick counter, modulo 256.
    pub timestamp: u8,

    /// Not interpreted by the relay.
    pub reserved: [u8; 2],

    /// Placeholder id the client gave a `j` object before it had a real one.
    pub local_id: u8,

    /// Relay-scoped object id for `i` and `m`.
    pub object_id: u8,

    /// Opaque client data.
    pub body: [u8; OBJECT_FRAME_LEN - FRAME_HEADER_LEN],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(ObjectFrame, [u8; OBJECT_FRAME_LEN]);

impl ObjectFrame {
    /// Copy a received datagram into a full frame.
    ///
    /// Short datagrams are zero-padded; anything past 255 bytes is ignored.
    /// Fails only when the header itself is incomplete.
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < FRAME_HEADER_LEN {
            return Err(WireError::Truncated {
                len: datagram.len(),
                min: FRAME_HEADER_LEN,
            });
        }
        let mut frame = Self::new_zeroed();
        let n = datagram.len().min(OBJECT_FRAME_LEN);
        frame.as_bytes_mut()[..n].copy_from_slice(&datagram[..n]);
        Ok(frame)
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId(self.object_id)
    }

    /// A copy of this frame retagged for relay → client fan-out.
    pub fn to_broadcast(&self) -> ObjectFrame {
        let mut out = self.clone();
        out.tag = Command::BroadcastUpdate as u8;
        out
    }
}

impl fmt::Debug for ObjectFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectFrame")
            .field("tag", &(self.tag as char))
            .field("timestamp", &self.timestamp)
            .field("local_id", &self.local_id)
            .field("object_id", &self.object_id)
            .finish_non_exhaustive()
    }
}

// ── Id Mapping Reply ──────────────────────────────────────────────────────────

/// Reply to `j`: pairs the relay-allocated id with the client's placeholder.
///
/// Same length as an object frame so clients can reuse one receive path.
///
/// Wire size: 255 bytes.
#[derive(Clone, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct IdMappingReply {
    /// Always `k`.
    pub tag: u8,
    /// Id the relay allocated.
    pub new_id: u8,
    /// Zero.
    pub reserved: [u8; 2],
    /// Placeholder id echoed from the `j` datagram.
    pub local_id: u8,
    /// Zero.
    pub padding: [u8; OBJECT_FRAME_LEN - 5],
}

assert_eq_size!(IdMappingReply, [u8; OBJECT_FRAME_LEN]);

impl IdMappingReply {
    pub fn new(new_id: ObjectId, local_id: u8) -> Self {
        let mut reply = Self::new_zeroed();
        reply.tag = Command::IdMapping as u8;
        reply.new_id = new_id.0;
        reply.local_id = local_id;
        reply
    }
}

impl fmt::Debug for IdMappingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdMappingReply")
            .field("new_id", &self.new_id)
            .field("local_id", &self.local_id)
            .finish_non_exhaustive()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting an inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown command tag: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("datagram of {len} bytes is shorter than the {min}-byte frame header")]
    Truncated { len: usize, min: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
