//! Local room transitions. Each returns the `StateUpdate` to publish, or the
//! reason nothing should be published. These checks run on the acting client
//! only; peers accept any newer document regardless.

use crate::{
    errors::{AuthorityError, JoinOutcome, MoveRejection},
    game::{
        board::{detect_win, Mark, BOARD_CELLS},
        state::{GameState, StateUpdate},
    },
    identity::PublicKey,
};

/// First open slot goes to `me`; the first occupant also becomes the creator.
pub fn claim_slot(state: &GameState, me: &PublicKey) -> JoinOutcome {
    if let Some(mark) = state.seat_of(me) {
        return JoinOutcome::AlreadySeated(mark);
    }

    if state.player_x.is_none() {
        let update = StateUpdate {
            player_x: Some(Some(me.clone())),
            creator_pubkey: Some(Some(me.clone())),
            ..StateUpdate::default()
        };
        return JoinOutcome::Seated(Mark::X, update);
    }

    if state.player_o.is_none() {
        let update = StateUpdate {
            player_o: Some(Some(me.clone())),
            ..StateUpdate::default()
        };
        return JoinOutcome::Seated(Mark::O, update);
    }

    JoinOutcome::RoomFull
}

fn check_round_authority(state: &GameState, me: &PublicKey) -> Result<(), AuthorityError> {
    if !state.is_creator(me) {
        return Err(AuthorityError::NotRoomCreator);
    }
    if state.connected_players() < 2 {
        return Err(AuthorityError::WaitingForOpponent);
    }
    Ok(())
}

/// Creator-only: flips `gameReady` and clears the board.
pub fn start_round(state: &GameState, me: &PublicKey) -> Result<StateUpdate, AuthorityError> {
    check_round_authority(state, me)?;
    Ok(StateUpdate {
        game_ready: Some(true),
        ..StateUpdate::new_round()
    })
}

/// Creator-only: clears the board for another round, keeping tallies and readiness.
pub fn reset_round(state: &GameState, me: &PublicKey) -> Result<StateUpdate, AuthorityError> {
    check_round_authority(state, me)?;
    Ok(StateUpdate::new_round())
}

pub fn make_move(
    state: &GameState,
    me: &PublicKey,
    index: usize,
) -> Result<StateUpdate, MoveRejection> {
    if index >= BOARD_CELLS {
        return Err(MoveRejection::OutOfRange);
    }
    if !state.game_ready {
        return Err(MoveRejection::RoundNotReady);
    }
    if state.is_round_over() {
        return Err(MoveRejection::RoundOver);
    }
    if !state.board.is_empty_cell(index) {
        return Err(MoveRejection::CellOccupied);
    }
    let Some(mark) = state.seat_of(me) else {
        return Err(MoveRejection::NotSeated);
    };
    if mark != state.current_player {
        return Err(MoveRejection::NotYourTurn);
    }

    let board = state.board.with_mark(index, mark);
    let win = detect_win(&board);
    let (winner, winning_cells) = match win {
        Some(line) => (Some(line.mark), line.cells.to_vec()),
        None => (None, Vec::new()),
    };

    Ok(StateUpdate {
        board: Some(board),
        // the turn passes even on the winning move
        current_player: Some(mark.opponent()),
        winner: Some(winner),
        winning_cells: Some(winning_cells),
        // tallies arrive from peers, so they may already sit at the ceiling
        x_wins: Some(state.x_wins.saturating_add(u32::from(winner == Some(Mark::X)))),
        o_wins: Some(state.o_wins.saturating_add(u32::from(winner == Some(Mark::O)))),
        ..StateUpdate::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(c: char) -> PublicKey {
        PublicKey::from_hex(&c.to_string().repeat(64)).unwrap()
    }

    fn ready_state() -> GameState {
        GameState {
            player_x: Some(pk('a')),
            player_o: Some(pk('b')),
            creator_pubkey: Some(pk('a')),
            game_ready: true,
            ..GameState::default()
        }
    }

    fn play(state: &GameState, who: &PublicKey, index: usize) -> GameState {
        make_move(state, who, index)
            .expect("move should be accepted")
            .merge_over(state)
    }

    #[test]
    fn scenario_top_row_win_for_x() {
        let (x, o) = (pk('a'), pk('b'));
        let mut state = ready_state();
        for (who, cell) in [(&x, 0), (&o, 4), (&x, 1), (&o, 3), (&x, 2)] {
            state = play(&state, who, cell);
        }
        assert_eq!(state.winner, Some(Mark::X));
        assert_eq!(state.winning_cells, vec![0, 1, 2]);
        assert_eq!((state.x_wins, state.o_wins), (1, 0));
        assert_eq!(state.current_player, Mark::O);
        assert!(state.is_round_over());
    }

    #[test]
    fn scenario_full_board_is_draw() {
        let (x, o) = (pk('a'), pk('b'));
        let mut state = ready_state();
        // X O X / X O O / O X X
        for (who, cell) in [
            (&x, 0),
            (&o, 1),
            (&x, 2),
            (&o, 4),
            (&x, 3),
            (&o, 5),
            (&x, 7),
            (&o, 6),
            (&x, 8),
        ] {
            state = play(&state, who, cell);
        }
        assert!(state.is_draw());
        assert_eq!(state.winner, None);
        assert_eq!(
            make_move(&state, &o, 0),
            Err(MoveRejection::RoundOver),
            "no moves after a draw"
        );
    }

    #[test]
    fn scenario_two_joins_then_room_full() {
        let state = GameState::default();

        let JoinOutcome::Seated(mark, update) = claim_slot(&state, &pk('a')) else {
            panic!("first joiner should be seated");
        };
        assert_eq!(mark, Mark::X);
        let state = update.merge_over(&state);
        assert_eq!(state.player_x, Some(pk('a')));
        assert_eq!(state.creator_pubkey, Some(pk('a')));

        let JoinOutcome::Seated(mark, update) = claim_slot(&state, &pk('b')) else {
            panic!("second joiner should be seated");
        };
        assert_eq!(mark, Mark::O);
        let state = update.merge_over(&state);
        assert_eq!(state.player_o, Some(pk('b')));
        assert_eq!(state.creator_pubkey, Some(pk('a')));

        assert_eq!(claim_slot(&state, &pk('c')), JoinOutcome::RoomFull);
    }

    #[test]
    fn rejoining_player_keeps_seat() {
        let state = ready_state();
        assert_eq!(
            claim_slot(&state, &pk('b')),
            JoinOutcome::AlreadySeated(Mark::O)
        );
    }

    #[test]
    fn only_creator_with_two_players_starts_round() {
        let mut state = GameState {
            player_x: Some(pk('a')),
            creator_pubkey: Some(pk('a')),
            ..GameState::default()
        };
        assert_eq!(
            start_round(&state, &pk('a')),
            Err(AuthorityError::WaitingForOpponent)
        );

        state.player_o = Some(pk('b'));
        assert_eq!(
            start_round(&state, &pk('b')),
            Err(AuthorityError::NotRoomCreator)
        );

        let started = start_round(&state, &pk('a')).unwrap().merge_over(&state);
        assert!(started.game_ready);
        assert_eq!(started.current_player, Mark::X);
    }

    #[test]
    fn reset_keeps_tallies_and_readiness() {
        let mut state = ready_state();
        state.x_wins = 2;
        state.o_wins = 1;
        state.winner = Some(Mark::O);
        state.winning_cells = vec![2, 4, 6];

        assert_eq!(
            reset_round(&state, &pk('b')),
            Err(AuthorityError::NotRoomCreator)
        );
        let next = reset_round(&state, &pk('a')).unwrap().merge_over(&state);
        assert_eq!(next.board, crate::game::Board::empty());
        assert_eq!(next.winner, None);
        assert!(next.winning_cells.is_empty());
        assert!(next.game_ready);
        assert_eq!((next.x_wins, next.o_wins), (2, 1));
    }

    #[test]
    fn winning_move_with_tally_at_ceiling_saturates() {
        let (x, o) = (pk('a'), pk('b'));
        let state = GameState {
            board: crate::game::Board::empty()
                .with_mark(0, Mark::X)
                .with_mark(1, Mark::X)
                .with_mark(3, Mark::O)
                .with_mark(4, Mark::O),
            x_wins: u32::MAX,
            o_wins: u32::MAX,
            ..ready_state()
        };

        let won = play(&state, &x, 2);
        assert_eq!(won.winner, Some(Mark::X));
        assert_eq!((won.x_wins, won.o_wins), (u32::MAX, u32::MAX));

        let o_turn = GameState {
            current_player: Mark::O,
            ..state
        };
        let won = play(&o_turn, &o, 5);
        assert_eq!(won.winner, Some(Mark::O));
        assert_eq!(won.o_wins, u32::MAX);
    }

    #[test]
    fn invalid_moves_are_rejected() {
        let (x, o, stranger) = (pk('a'), pk('b'), pk('c'));
        let state = ready_state();

        assert_eq!(make_move(&state, &x, 9), Err(MoveRejection::OutOfRange));
        assert_eq!(make_move(&state, &o, 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(make_move(&state, &stranger, 0), Err(MoveRejection::NotSeated));

        let not_ready = GameState {
            game_ready: false,
            ..state.clone()
        };
        assert_eq!(make_move(&not_ready, &x, 0), Err(MoveRejection::RoundNotReady));

        let state = play(&state, &x, 4);
        assert_eq!(make_move(&state, &o, 4), Err(MoveRejection::CellOccupied));
    }
}
