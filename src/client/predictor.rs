//! Client-side prediction and server reconciliation

use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::game::math::{movement_delta, Direction, KeySet, Vector2};
use crate::ws::protocol::{ClientMsg, PlayerInput, PlayerSnapshots, ServerMsg};

use super::mode::SyncMode;

/// Roster changes derived from server messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Joined(Uuid),
    Left(Uuid),
    Died(Uuid),
    LocalPlayerDied,
}

/// Local player state as seen by one client
#[derive(Debug)]
pub struct Predictor {
    mode: SyncMode,
    player_id: Option<Uuid>,
    position: Vector2,
    next_sequence: u32,
    /// Sent but not yet acknowledged inputs, oldest first
    pending: VecDeque<PlayerInput>,
    /// Remote players currently alive
    known_players: HashSet<Uuid>,
    dead: bool,
}

impl Predictor {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            player_id: None,
            position: Vector2::ZERO,
            next_sequence: 0,
            pending: VecDeque::new(),
            known_players: HashSet::new(),
            dead: false,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn player_id(&self) -> Option<Uuid> {
        self.player_id
    }

    pub fn position(&self) -> Vector2 {
        self.position
    }

    /// Place the local player; used to seed offline play
    pub fn set_position(&mut self, position: Vector2) {
        self.position = position;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn known_players(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.known_players.iter().copied()
    }

    /// Turn one rendered frame's held keys into an input to send.
    ///
    /// Idle frames produce nothing, and offline play never sends.
    pub fn next_input(&mut self, keys: KeySet, time_delta: f32) -> Option<PlayerInput> {
        if keys.is_empty() || self.dead {
            return None;
        }

        let input = PlayerInput {
            keys,
            time_delta,
            sequence_number: self.next_sequence,
        };

        if self.mode.predicts() {
            self.position = self.position + displacement(&input);
        }

        if !self.mode.uses_server() {
            return None;
        }

        self.next_sequence += 1;
        if self.mode.reconciles() {
            self.pending.push_back(input.clone());
        }
        Some(input)
    }

    pub fn restart_request(&self) -> ClientMsg {
        ClientMsg::RestartGame
    }

    /// Apply a server message; returns the roster changes it implies
    pub fn handle(&mut self, msg: &ServerMsg) -> Vec<ClientEvent> {
        if !self.mode.uses_server() {
            return Vec::new();
        }

        match msg {
            ServerMsg::InitialGameState {
                player_id, players, ..
            } => {
                self.player_id = Some(*player_id);
                self.dead = false;
                self.pending.clear();
                if let Some(me) = players.get(player_id) {
                    self.position = me.position;
                }
                self.known_players = players.keys().copied().filter(|id| id != player_id).collect();
                debug!(player_id = %player_id, players = players.len(), "Joined game");
                Vec::new()
            }
            ServerMsg::GameState { players, .. } => {
                let mut events = self.reconcile(players);
                events.extend(self.diff_roster(players));
                events
            }
            ServerMsg::PlayerJoined { player_id, .. } => {
                if Some(*player_id) != self.player_id && self.known_players.insert(*player_id) {
                    vec![ClientEvent::Joined(*player_id)]
                } else {
                    Vec::new()
                }
            }
            ServerMsg::PlayerLeft { player_id, .. } => {
                if self.known_players.remove(player_id) {
                    vec![ClientEvent::Left(*player_id)]
                } else {
                    Vec::new()
                }
            }
            ServerMsg::PlayerDied { player_id } => {
                if Some(*player_id) == self.player_id {
                    self.local_death().into_iter().collect()
                } else if self.known_players.remove(player_id) {
                    vec![ClientEvent::Died(*player_id)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn reconcile(&mut self, players: &PlayerSnapshots) -> Vec<ClientEvent> {
        let Some(player_id) = self.player_id else {
            return Vec::new();
        };
        let Some(me) = players.get(&player_id) else {
            // Absence from the snapshot is authoritative for death
            return self.local_death().into_iter().collect();
        };

        // Without replay the server position wins outright, snapping back any
        // prediction the server has not caught up with
        if !self.mode.reconciles() {
            self.pending.clear();
            self.position = me.position;
            return Vec::new();
        }

        if let Some(ack) = me.last_processed_input_sequence {
            while self.pending.front().is_some_and(|input| input.sequence_number <= ack) {
                self.pending.pop_front();
            }
        }

        self.position = self
            .pending
            .iter()
            .fold(me.position, |position, input| position + displacement(input));

        trace!(
            ack = ?me.last_processed_input_sequence,
            replayed = self.pending.len(),
            "Reconciled local player"
        );
        Vec::new()
    }

    /// Ids that appear or vanish between snapshots
    fn diff_roster(&mut self, players: &PlayerSnapshots) -> Vec<ClientEvent> {
        let local = self.player_id;
        let mut events: Vec<ClientEvent> = players
            .keys()
            .copied()
            .filter(|id| Some(*id) != local)
            .filter(|id| self.known_players.insert(*id))
            .map(ClientEvent::Joined)
            .collect();

        // Gone without a PLAYER_LEFT: the player died
        let vanished: Vec<Uuid> = self
            .known_players
            .iter()
            .copied()
            .filter(|id| !players.contains_key(id))
            .collect();
        for id in vanished {
            self.known_players.remove(&id);
            events.push(ClientEvent::Died(id));
        }

        events
    }

    fn local_death(&mut self) -> Option<ClientEvent> {
        if self.dead {
            return None;
        }
        self.dead = true;
        self.pending.clear();
        Some(ClientEvent::LocalPlayerDied)
    }
}

fn displacement(input: &PlayerInput) -> Vector2 {
    Direction::from_keys(&input.keys)
        .map(|direction| movement_delta(direction, input.time_delta))
        .unwrap_or(Vector2::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::Key;
    use crate::ws::protocol::{MonsterSnapshots, PlayerSnapshot};

    fn snapshot(position: Vector2, ack: Option<u32>) -> PlayerSnapshot {
        PlayerSnapshot {
            position,
            health: 100,
            last_processed_input_sequence: ack,
            pending_action: None,
            name: "me".to_string(),
        }
    }

    fn joined(predictor: &mut Predictor, position: Vector2) -> Uuid {
        let id = Uuid::new_v4();
        let mut players = PlayerSnapshots::new();
        players.insert(id, snapshot(position, None));
        predictor.handle(&ServerMsg::InitialGameState {
            player_id: id,
            players,
            monsters: MonsterSnapshots::new(),
        });
        id
    }

    fn state(entries: &[(Uuid, PlayerSnapshot)]) -> ServerMsg {
        ServerMsg::GameState {
            players: entries.iter().cloned().collect(),
            monsters: MonsterSnapshots::new(),
        }
    }

    #[test]
    fn test_idle_frames_send_nothing() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        assert!(predictor.next_input(KeySet::new(), 16.0).is_none());
        assert_eq!(predictor.next_sequence(), 0);
    }

    #[test]
    fn test_sequence_numbers_start_at_zero() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        joined(&mut predictor, Vector2::new(100.0, 100.0));

        let first = predictor.next_input(KeySet::from([Key::Up]), 16.0).unwrap();
        let second = predictor.next_input(KeySet::from([Key::Attack]), 16.0).unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(second.sequence_number, 1);
        assert_eq!(predictor.pending_len(), 2);
    }

    #[test]
    fn test_reconcile_replays_unacknowledged_inputs() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        let id = joined(&mut predictor, Vector2::new(100.0, 100.0));

        for _ in 0..3 {
            predictor.next_input(KeySet::from([Key::Right]), 100.0);
        }
        assert_eq!(predictor.position(), Vector2::new(130.0, 100.0));

        // Server has applied input 0 only, and was pushed 2px down meanwhile
        predictor.handle(&state(&[(id, snapshot(Vector2::new(110.0, 102.0), Some(0)))]));

        assert_eq!(predictor.pending_len(), 2);
        assert_eq!(predictor.position(), Vector2::new(130.0, 102.0));
    }

    #[test]
    fn test_full_ack_adopts_server_position() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        let id = joined(&mut predictor, Vector2::new(100.0, 100.0));
        predictor.next_input(KeySet::from([Key::Left]), 100.0);

        predictor.handle(&state(&[(id, snapshot(Vector2::new(95.0, 100.0), Some(0)))]));

        assert_eq!(predictor.pending_len(), 0);
        assert_eq!(predictor.position(), Vector2::new(95.0, 100.0));
    }

    #[test]
    fn test_predicted_mode_snaps_back_to_server() {
        let mut predictor = Predictor::new(SyncMode::Predicted);
        let id = joined(&mut predictor, Vector2::new(100.0, 100.0));
        predictor.next_input(KeySet::from([Key::Right]), 1000.0);
        assert_eq!(predictor.pending_len(), 0);
        assert_eq!(predictor.position(), Vector2::new(200.0, 100.0));

        // Server stopped the player at a wall; the local prediction is discarded
        for _ in 0..10 {
            predictor.handle(&state(&[(id, snapshot(Vector2::new(100.0, 100.0), Some(0)))]));
            assert_eq!(predictor.position(), Vector2::new(100.0, 100.0));
        }

        predictor.next_input(KeySet::from([Key::Down]), 100.0);
        assert_eq!(predictor.position(), Vector2::new(100.0, 110.0));
    }

    #[test]
    fn test_authoritative_mode_follows_server() {
        let mut predictor = Predictor::new(SyncMode::Authoritative);
        let id = joined(&mut predictor, Vector2::new(100.0, 100.0));

        let input = predictor.next_input(KeySet::from([Key::Down]), 100.0);
        assert!(input.is_some());
        assert_eq!(predictor.position(), Vector2::new(100.0, 100.0));

        predictor.handle(&state(&[(id, snapshot(Vector2::new(100.0, 110.0), Some(0)))]));
        assert_eq!(predictor.position(), Vector2::new(100.0, 110.0));
    }

    #[test]
    fn test_offline_moves_without_sending() {
        let mut predictor = Predictor::new(SyncMode::Offline);
        predictor.set_position(Vector2::new(50.0, 50.0));

        assert!(predictor.next_input(KeySet::from([Key::Right]), 500.0).is_none());
        assert_eq!(predictor.position(), Vector2::new(100.0, 50.0));
        assert!(predictor.handle(&state(&[])).is_empty());
    }

    #[test]
    fn test_roster_diff_reports_joins_and_deaths() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        let me = joined(&mut predictor, Vector2::new(10.0, 10.0));
        let other = Uuid::new_v4();
        let mine = snapshot(Vector2::new(10.0, 10.0), None);

        let events = predictor.handle(&state(&[(me, mine.clone()), (other, mine.clone())]));
        assert_eq!(events, vec![ClientEvent::Joined(other)]);

        // Explicit death followed by absence is reported once
        let events = predictor.handle(&ServerMsg::PlayerDied { player_id: other });
        assert_eq!(events, vec![ClientEvent::Died(other)]);
        assert!(predictor.handle(&state(&[(me, mine.clone())])).is_empty());
    }

    #[test]
    fn test_local_death_from_absence() {
        let mut predictor = Predictor::new(SyncMode::Reconciled);
        let me = joined(&mut predictor, Vector2::new(10.0, 10.0));
        predictor.next_input(KeySet::from([Key::Up]), 16.0);

        assert_eq!(predictor.handle(&state(&[])), vec![ClientEvent::LocalPlayerDied]);
        assert!(predictor.is_dead());
        assert_eq!(predictor.pending_len(), 0);
        assert!(predictor.next_input(KeySet::from([Key::Up]), 16.0).is_none());

        // The explicit message after the fact does not repeat the event
        assert!(predictor.handle(&ServerMsg::PlayerDied { player_id: me }).is_empty());
        assert_eq!(predictor.restart_request(), ClientMsg::RestartGame);

        // A fresh INITIAL_GAME_STATE revives the predictor
        joined(&mut predictor, Vector2::new(20.0, 20.0));
        assert!(!predictor.is_dead());
        assert_eq!(predictor.position(), Vector2::new(20.0, 20.0));
    }
}
