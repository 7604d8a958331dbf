//! Item relocation state machine and the immutable movement record.
//!
//! States are environments; the only transition is `relocate(target)` with
//! `target != current`. A self-loop is rejected with a conflict rather than
//! recorded.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use placetrack_core::{
    Aggregate, AggregateRoot, ConflictReason, DomainError, EnvironmentId, ItemId, MovementId,
    UserId,
};

/// Command: RelocateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocateItem {
    pub item_id: ItemId,
    pub target: EnvironmentId,
    pub mover: UserId,
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRelocated (decided, not yet committed to the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRelocated {
    pub movement_id: MovementId,
    pub item_id: ItemId,
    pub previous_environment: Option<EnvironmentId>,
    pub next_environment: EnvironmentId,
    pub mover: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// One completed relocation, as stored in the ledger.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    /// Position in the ledger. Strictly increasing in insertion order.
    pub sequence: u64,
    pub item_id: ItemId,
    /// `None` only for an item's first-ever placement.
    pub previous_environment: Option<EnvironmentId>,
    pub next_environment: EnvironmentId,
    pub mover: UserId,
    /// Non-decreasing in insertion order.
    pub moved_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Seal a decided relocation at a ledger position.
    ///
    /// `not_before` is the timestamp of the previous ledger entry; the record's
    /// timestamp is clamped to it so ledger order and time order agree.
    /// Timestamps are truncated to microseconds, the precision storage keeps.
    pub fn commit(event: ItemRelocated, sequence: u64, not_before: Option<DateTime<Utc>>) -> Self {
        let occurred_at = event.occurred_at.trunc_subsecs(6);
        let moved_at = match not_before {
            Some(floor) if floor > occurred_at => floor,
            _ => occurred_at,
        };

        Self {
            id: event.movement_id,
            sequence,
            item_id: event.item_id,
            previous_environment: event.previous_environment,
            next_environment: event.next_environment,
            mover: event.mover,
            moved_at,
        }
    }

    /// Whether this move touched `environment` on either side.
    pub fn involves(&self, environment: EnvironmentId) -> bool {
        self.next_environment == environment || self.previous_environment == Some(environment)
    }
}

/// Aggregate root: the location of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPlacement {
    item_id: ItemId,
    current: Option<EnvironmentId>,
    version: u64,
}

impl ItemPlacement {
    pub fn at(item_id: ItemId, current: Option<EnvironmentId>) -> Self {
        Self {
            item_id,
            current,
            version: 0,
        }
    }

    pub fn current(&self) -> Option<EnvironmentId> {
        self.current
    }
}

impl AggregateRoot for ItemPlacement {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.item_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for ItemPlacement {
    type Command = RelocateItem;
    type Event = ItemRelocated;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.current = Some(event.next_environment);
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if cmd.item_id != self.item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        if self.current == Some(cmd.target) {
            return Err(DomainError::conflict(ConflictReason::AlreadyInTargetEnvironment));
        }

        Ok(vec![ItemRelocated {
            movement_id: cmd.movement_id,
            item_id: self.item_id,
            previous_environment: self.current,
            next_environment: cmd.target,
            mover: cmd.mover,
            occurred_at: cmd.occurred_at,
        }])
    }
}

/// Check that an item's history forms one unbroken chain starting at `initial`.
///
/// Records must be for the same item and ordered by sequence.
pub fn verify_chain(
    initial: Option<EnvironmentId>,
    records: &[MovementRecord],
) -> Result<(), DomainError> {
    let mut at = initial;
    let mut last_seq = 0u64;
    let mut last_time: Option<DateTime<Utc>> = None;

    for (idx, r) in records.iter().enumerate() {
        if r.previous_environment != at {
            return Err(DomainError::invariant(format!(
                "chain broken at index {idx}: expected previous {at:?}, found {:?}",
                r.previous_environment
            )));
        }
        if r.previous_environment == Some(r.next_environment) {
            return Err(DomainError::invariant(format!("self-move recorded at index {idx}")));
        }
        if r.sequence <= last_seq {
            return Err(DomainError::invariant(format!(
                "non-monotonic sequence at index {idx} (last={last_seq}, found={})",
                r.sequence
            )));
        }
        if last_time.is_some_and(|t| r.moved_at < t) {
            return Err(DomainError::invariant(format!("timestamp went backwards at index {idx}")));
        }
        at = Some(r.next_environment);
        last_seq = r.sequence;
        last_time = Some(r.moved_at);
    }

    Ok(())
}
