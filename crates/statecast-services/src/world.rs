//! World model: the latest known state of every tracked object.
//!
//! The relay never interprets object state. It keeps the most recent frame
//! per object, decides whether an incoming update supersedes it, and records
//! which objects changed since the last broadcast tick (the dirty set).
//!
//! Invariants:
//!   - every id in the dirty set exists in the object map
//!   - an object id is assigned once and never reused while the process runs

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::sync::Mutex;

use statecast_core::wire::{ObjectFrame, ObjectId};

/// Stored timestamps in this band accept incoming timestamps in
/// [`WRAP_LOW_BAND`]; the client tick counter has just wrapped.
pub const WRAP_HIGH_BAND: RangeInclusive<u8> = 251..=255;

/// See [`WRAP_HIGH_BAND`].
pub const WRAP_LOW_BAND: RangeInclusive<u8> = 0..=4;

/// Acceptance policy for an update carrying `incoming` against an object
/// last updated at `stored`.
///
/// Accepts newer-or-equal timestamps, plus a narrow wraparound window. Pairs
/// outside both cases are rejected even when modular distance says they are
/// newer.
pub fn accepts(stored: u8, incoming: u8) -> bool {
    incoming >= stored || (WRAP_HIGH_BAND.contains(&stored) && WRAP_LOW_BAND.contains(&incoming))
}

/// One synchronized entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedObject {
    pub id: ObjectId,
    /// Latest accepted frame, tag byte included as received.
    pub frame: ObjectFrame,
    pub last_update_timestamp: u8,
    /// Endpoint whose datagram produced `frame`.
    pub origin: SocketAddr,
    /// Accepted updates since creation.
    pub update_count: u64,
}

/// What happened to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted,
    /// Timestamp did not pass the acceptance policy.
    Stale { stored: u8, incoming: u8 },
    /// No object with that id.
    UnknownObject,
}

impl UpdateOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, UpdateOutcome::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("object id space exhausted: all {0} ids are in use")]
    IdSpaceExhausted(usize),
}

/// Authoritative object map plus the pending-broadcast set.
#[derive(Debug, Default)]
pub struct WorldModel {
    objects: BTreeMap<ObjectId, TrackedObject>,
    dirty: BTreeSet<ObjectId>,
    /// Next candidate for relay allocation. Only ever grows; u16 so that
    /// "past 255" is representable.
    next_local_id: u16,
}

/// Shared world model: one lock for all mutations and the dirty snapshot.
pub type SharedWorld = Arc<Mutex<WorldModel>>;

impl WorldModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedWorld {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Create a scene object every client already has.
    ///
    /// Ignored if `id` exists, even with a different frame. Not marked
    /// dirty: peers start from the same state. Returns whether it was created.
    pub fn initialize_global(&mut self, id: ObjectId, origin: SocketAddr, frame: ObjectFrame) -> bool {
        if self.objects.contains_key(&id) {
            return false;
        }
        self.objects.insert(
            id,
            TrackedObject {
                id,
                frame,
                last_update_timestamp: 0,
                origin,
                update_count: 0,
            },
        );
        true
    }

    /// Create an object only its origin knows about and queue it for fan-out.
    ///
    /// The frame is stored exactly as received; the allocated id only lives
    /// in the map key and the `k` reply. Ids already claimed by global
    /// objects are skipped.
    pub fn initialize_local(
        &mut self,
        origin: SocketAddr,
        frame: ObjectFrame,
    ) -> Result<ObjectId, WorldError> {
        let id = self.allocate_id()?;
        self.objects.insert(
            id,
            TrackedObject {
                id,
                frame,
                last_update_timestamp: 0,
                origin,
                update_count: 0,
            },
        );
        self.dirty.insert(id);
        Ok(id)
    }

    fn allocate_id(&mut self) -> Result<ObjectId, WorldError> {
        while let Ok(candidate) = u8::try_from(self.next_local_id) {
            self.next_local_id += 1;
            let id = ObjectId(candidate);
            if !self.objects.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(WorldError::IdSpaceExhausted(self.objects.len()))
    }

    /// Replace an object's state if `timestamp` passes [`accepts`].
    pub fn apply_update(
        &mut self,
        id: ObjectId,
        timestamp: u8,
        origin: SocketAddr,
        frame: ObjectFrame,
    ) -> UpdateOutcome {
        let Some(object) = self.objects.get_mut(&id) else {
            return UpdateOutcome::UnknownObject;
        };

        let stored = object.last_update_timestamp;
        if !accepts(stored, timestamp) {
            return UpdateOutcome::Stale {
                stored,
                incoming: timestamp,
            };
        }

        object.frame = frame;
        object.last_update_timestamp = timestamp;
        object.origin = origin;
        object.update_count += 1;
        self.dirty.insert(id);
        UpdateOutcome::Accepted
    }

    /// Copy out every dirty object and clear the dirty set in one step.
    ///
    /// Callers hold the world lock for the whole call, so an update either
    /// lands before (and is in this snapshot) or after (and is in the next).
    pub fn take_dirty_snapshot(&mut self) -> BTreeMap<ObjectId, TrackedObject> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|id| self.objects.get(&id).map(|obj| (id, obj.clone())))
            .collect()
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn is_dirty(&self, id: ObjectId) -> bool {
        self.dirty.contains(&id)
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
