use std::fmt;

use serde::{Deserialize, Serialize};

pub const BOARD_CELLS: usize = 9;

/*
 * Cell index layout:
 *  0 | 1 | 2
 *  3 | 4 | 5
 *  6 | 7 | 8
 * Enumeration order is fixed: rows, then columns, then diagonals.
 */
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2], // row 0
    [3, 4, 5], // row 1
    [6, 7, 8], // row 2
    [0, 3, 6], // col 0
    [1, 4, 7], // col 1
    [2, 5, 8], // col 2
    [0, 4, 8], // main diagonal
    [2, 4, 6], // anti-diagonal
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

/// Nine cells, serialized as a flat JSON array of `"X"`, `"O"` or `null`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Board([Option<Mark>; BOARD_CELLS]);

/// A completed line: the owning mark and the three cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinLine {
    pub mark: Mark,
    pub cells: [usize; 3],
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Mark>; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[Option<Mark>; BOARD_CELLS] {
        &self.0
    }

    /// `None` for out-of-range indices as well as empty cells.
    pub fn get(&self, index: usize) -> Option<Mark> {
        self.0.get(index).copied().flatten()
    }

    pub fn is_empty_cell(&self, index: usize) -> bool {
        index < BOARD_CELLS && self.0[index].is_none()
    }

    /// Returns a copy with `mark` placed at `index`. Callers validate the index first.
    pub fn with_mark(&self, index: usize, mark: Mark) -> Board {
        let mut next = *self;
        next.0[index] = Some(mark);
        next
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }
}

/// First fully matched line in `WIN_LINES` order, if any.
pub fn detect_win(board: &Board) -> Option<WinLine> {
    WIN_LINES.iter().find_map(|&[a, b, c]| match board.get(a) {
        Some(mark) if board.get(b) == Some(mark) && board.get(c) == Some(mark) => Some(WinLine {
            mark,
            cells: [a, b, c],
        }),
        _ => None,
    })
}

pub fn is_draw(board: &Board) -> bool {
    board.is_full() && detect_win(board).is_none()
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f, "---+---+---")?;
            }
            let line: Vec<String> = (0..3)
                .map(|col| {
                    let index = row * 3 + col;
                    match self.get(index) {
                        Some(mark) => format!(" {} ", mark),
                        None => format!(" {} ", index),
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        Ok(())
    }
}
