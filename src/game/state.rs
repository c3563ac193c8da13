use serde::{Deserialize, Serialize};

use crate::{
    errors::ProtocolError,
    game::board::{self, Board, Mark, BOARD_CELLS},
    identity::PublicKey,
};

/// The shared room document. Every publish carries the whole thing; there is no
/// field-level merge between peers, only wholesale replacement by version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub board: Board,
    pub current_player: Mark,
    pub winner: Option<Mark>,
    #[serde(default)]
    pub winning_cells: Vec<usize>,
    pub version: u64,
    #[serde(default)]
    pub x_wins: u32,
    #[serde(default)]
    pub o_wins: u32,
    #[serde(default)]
    pub player_x: Option<PublicKey>,
    #[serde(default)]
    pub player_o: Option<PublicKey>,
    #[serde(default)]
    pub game_ready: bool,
    #[serde(default)]
    pub creator_pubkey: Option<PublicKey>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            board: Board::empty(),
            current_player: Mark::X,
            winner: None,
            winning_cells: Vec::new(),
            version: 0,
            x_wins: 0,
            o_wins: 0,
            player_x: None,
            player_o: None,
            game_ready: false,
            creator_pubkey: None,
        }
    }
}

impl GameState {
    /// Structural checks on a decoded document. Value-level consistency
    /// (whose turn, legal move history) is not checked and cannot be.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        // no successor version exists, so nobody could publish after it
        if self.version == u64::MAX {
            return Err(ProtocolError::InvalidState(format!(
                "version {} leaves no room to publish",
                self.version
            )));
        }
        if !matches!(self.winning_cells.len(), 0 | 3) {
            return Err(ProtocolError::InvalidState(format!(
                "winningCells has {} entries",
                self.winning_cells.len()
            )));
        }
        if let Some(index) = self.winning_cells.iter().find(|&&i| i >= BOARD_CELLS) {
            return Err(ProtocolError::InvalidState(format!(
                "winningCells index {} out of range",
                index
            )));
        }
        Ok(())
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none() && board::is_draw(&self.board)
    }

    pub fn is_round_over(&self) -> bool {
        self.winner.is_some() || self.is_draw()
    }

    pub fn connected_players(&self) -> usize {
        usize::from(self.player_x.is_some()) + usize::from(self.player_o.is_some())
    }

    pub fn seat_of(&self, pubkey: &PublicKey) -> Option<Mark> {
        if self.player_x.as_ref() == Some(pubkey) {
            Some(Mark::X)
        } else if self.player_o.as_ref() == Some(pubkey) {
            Some(Mark::O)
        } else {
            None
        }
    }

    pub fn player(&self, mark: Mark) -> Option<&PublicKey> {
        match mark {
            Mark::X => self.player_x.as_ref(),
            Mark::O => self.player_o.as_ref(),
        }
    }

    pub fn is_creator(&self, pubkey: &PublicKey) -> bool {
        self.creator_pubkey.as_ref() == Some(pubkey)
    }

    pub fn is_turn_of(&self, pubkey: &PublicKey) -> bool {
        self.seat_of(pubkey) == Some(self.current_player)
    }

    pub fn wins(&self, mark: Mark) -> u32 {
        match mark {
            Mark::X => self.x_wins,
            Mark::O => self.o_wins,
        }
    }
}

/// Partial update merged over the local state on publish. `None` leaves the
/// field as it is; nullable fields use a nested `Option` so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub board: Option<Board>,
    pub current_player: Option<Mark>,
    pub winner: Option<Option<Mark>>,
    pub winning_cells: Option<Vec<usize>>,
    pub x_wins: Option<u32>,
    pub o_wins: Option<u32>,
    pub player_x: Option<Option<PublicKey>>,
    pub player_o: Option<Option<PublicKey>>,
    pub game_ready: Option<bool>,
    pub creator_pubkey: Option<Option<PublicKey>>,
}

impl StateUpdate {
    /// Fresh round: empty board, X to move, no winner.
    pub fn new_round() -> Self {
        Self {
            board: Some(Board::empty()),
            current_player: Some(Mark::X),
            winner: Some(None),
            winning_cells: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Applies the update over `base`. The version is left untouched; the
    /// replica owns version assignment.
    pub fn merge_over(self, base: &GameState) -> GameState {
        let mut next = base.clone();
        if let Some(board) = self.board {
            next.board = board;
        }
        if let Some(current_player) = self.current_player {
            next.current_player = current_player;
        }
        if let Some(winner) = self.winner {
            next.winner = winner;
        }
        if let Some(winning_cells) = self.winning_cells {
            next.winning_cells = winning_cells;
        }
        if let Some(x_wins) = self.x_wins {
            next.x_wins = x_wins;
        }
        if let Some(o_wins) = self.o_wins {
            next.o_wins = o_wins;
        }
        if let Some(player_x) = self.player_x {
            next.player_x = player_x;
        }
        if let Some(player_o) = self.player_o {
            next.player_o = player_o;
        }
        if let Some(game_ready) = self.game_ready {
            next.game_ready = game_ready;
        }
        if let Some(creator_pubkey) = self.creator_pubkey {
            next.creator_pubkey = creator_pubkey;
        }
        next
    }
}
