pub mod board;
pub mod rules;
pub mod state;

pub use board::{detect_win, is_draw, Board, Mark, WinLine, BOARD_CELLS, WIN_LINES};
pub use state::{GameState, StateUpdate};
