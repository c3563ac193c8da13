//! Last-writer-wins replication of the room document.
//!
//! The version counter is the only conflict-resolution key. Two peers that
//! publish from the same base version race; whichever document a peer sees
//! first at that version wins there and the other is dropped without notice.

use tracing::debug;

use crate::{
    errors::SyncError,
    game::{GameState, StateUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Incoming document replaced local state.
    Applied,
    /// Incoming version was not newer; local state untouched.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct Replica {
    state: GameState,
    seen_version: u64,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Highest version seen locally, published or received.
    pub fn version(&self) -> u64 {
        self.seen_version
    }

    /// Merges `update` over local state, stamps `version + 1` and returns the
    /// full document to broadcast. Local state is updated immediately.
    ///
    /// Fails without touching local state once the counter has no successor.
    pub fn publish(&mut self, update: StateUpdate) -> Result<GameState, SyncError> {
        let version = self
            .seen_version
            .checked_add(1)
            .ok_or(SyncError::VersionExhausted(self.seen_version))?;
        let mut next = update.merge_over(&self.state);
        next.version = version;
        self.seen_version = version;
        self.state = next.clone();
        Ok(next)
    }

    pub fn on_receive(&mut self, incoming: GameState) -> Reconcile {
        if incoming.version <= self.seen_version {
            debug!(
                "Discarding stale state v{} (local v{})",
                incoming.version, self.seen_version
            );
            return Reconcile::Stale;
        }
        self.seen_version = incoming.version;
        self.state = incoming;
        Reconcile::Applied
    }

    /// Drops everything; used when leaving the room.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Board, Mark};
    use crate::identity::PublicKey;

    fn pk(c: char) -> PublicKey {
        PublicKey::from_hex(&c.to_string().repeat(64)).unwrap()
    }

    fn incoming(version: u64) -> GameState {
        GameState {
            version,
            board: Board::empty().with_mark(4, Mark::O),
            current_player: Mark::X,
            player_x: Some(pk('b')),
            ..GameState::default()
        }
    }

    #[test]
    fn publish_increments_version_by_one() {
        let mut replica = Replica::new();
        let first = replica.publish(StateUpdate::default()).unwrap();
        assert_eq!(first.version, 1);
        let second = replica
            .publish(StateUpdate {
                game_ready: Some(true),
                ..StateUpdate::default()
            })
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(replica.version(), 2);
        assert_eq!(replica.state(), &second);
    }

    #[test]
    fn publish_continues_from_highest_seen_version() {
        let mut replica = Replica::new();
        assert_eq!(replica.on_receive(incoming(10)), Reconcile::Applied);
        let published = replica.publish(StateUpdate::default()).unwrap();
        assert_eq!(published.version, 11);
        // published on top of the received document
        assert_eq!(published.player_x, Some(pk('b')));
    }

    #[test]
    fn equal_or_older_version_never_mutates() {
        let mut replica = Replica::new();
        for _ in 0..5 {
            replica.publish(StateUpdate::default()).unwrap();
        }
        let before = replica.state().clone();

        assert_eq!(replica.on_receive(incoming(5)), Reconcile::Stale);
        assert_eq!(replica.on_receive(incoming(3)), Reconcile::Stale);
        assert_eq!(replica.state(), &before);
        assert_eq!(replica.version(), 5);
    }

    #[test]
    fn newer_version_replaces_wholesale() {
        let mut replica = Replica::new();
        replica
            .publish(StateUpdate {
                player_o: Some(Some(pk('a'))),
                game_ready: Some(true),
                x_wins: Some(3),
                ..StateUpdate::default()
            })
            .unwrap();
        for _ in 0..4 {
            replica.publish(StateUpdate::default()).unwrap();
        }
        assert_eq!(replica.version(), 5);

        let next = incoming(6);
        assert_eq!(replica.on_receive(next.clone()), Reconcile::Applied);
        // fields absent from the incoming document are not kept from local state
        assert_eq!(replica.state(), &next);
        assert_eq!(replica.state().player_o, None);
        assert!(!replica.state().game_ready);
        assert_eq!(replica.state().x_wins, 0);
        assert_eq!(replica.version(), 6);
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let mut replica = Replica::new();
        assert_eq!(replica.on_receive(incoming(2)), Reconcile::Applied);
        assert_eq!(replica.on_receive(incoming(2)), Reconcile::Stale);
        assert_eq!(replica.version(), 2);
    }

    #[test]
    fn publish_at_counter_ceiling_fails_without_mutating() {
        let mut replica = Replica::new();
        assert_eq!(replica.on_receive(incoming(u64::MAX)), Reconcile::Applied);
        let before = replica.state().clone();

        assert_eq!(
            replica.publish(StateUpdate {
                game_ready: Some(true),
                ..StateUpdate::default()
            }),
            Err(SyncError::VersionExhausted(u64::MAX))
        );
        assert_eq!(replica.state(), &before);
        assert_eq!(replica.version(), u64::MAX);
    }

    #[test]
    fn publish_may_reach_the_last_version() {
        let mut replica = Replica::new();
        replica.on_receive(incoming(u64::MAX - 1));
        let last = replica.publish(StateUpdate::default()).unwrap();
        assert_eq!(last.version, u64::MAX);
        assert!(replica.publish(StateUpdate::default()).is_err());
    }

    #[test]
    fn reset_forgets_version() {
        let mut replica = Replica::new();
        replica.on_receive(incoming(9));
        replica.reset();
        assert_eq!(replica.version(), 0);
        assert_eq!(replica.state(), &GameState::default());
    }
}
