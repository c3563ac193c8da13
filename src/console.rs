//! Line-oriented terminal front end: parses typed input into commands and
//! renders the room document.

use std::fmt::Write;

use crate::{
    controller::Command,
    game::{GameState, Mark, BOARD_CELLS},
    identity::PublicKey,
};

pub const HELP: &str = "\
commands:
  0-8 | move <n>   place your mark on a cell
  start            start the round (room creator, two players)
  reset            start a new round (room creator)
  board            show the board again
  share            print the invite link
  leave            leave the room
  help             this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    ShowBoard,
    Share,
    Help,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim().to_ascii_lowercase();
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Input::Empty;
    };

    let cell = |word: Option<&str>| match word.and_then(|w| w.parse::<usize>().ok()) {
        Some(index) if index < BOARD_CELLS => Input::Command(Command::Move(index)),
        _ => Input::Unknown(line.clone()),
    };

    match first {
        "move" | "m" => cell(words.next()),
        "start" => Input::Command(Command::StartRound),
        "reset" | "again" => Input::Command(Command::ResetRound),
        "leave" | "quit" | "exit" | "q" => Input::Command(Command::Leave),
        "board" | "b" => Input::ShowBoard,
        "share" | "link" => Input::Share,
        "help" | "h" | "?" => Input::Help,
        word if word.chars().all(|c| c.is_ascii_digit()) => cell(Some(word)),
        _ => Input::Unknown(line.clone()),
    }
}

fn seat_label(state: &GameState, mark: Mark, me: &PublicKey) -> String {
    match state.player(mark) {
        Some(pubkey) if pubkey == me => format!("{} (you)", pubkey.short()),
        Some(pubkey) => pubkey.short().to_string(),
        None => "waiting...".to_string(),
    }
}

fn status_line(state: &GameState, me: &PublicKey) -> String {
    let mine = state.seat_of(me);

    if let Some(winner) = state.winner {
        return match mine {
            Some(mark) if mark == winner => "You win!".to_string(),
            Some(_) => "You lose.".to_string(),
            None => format!("{} wins!", winner),
        };
    }
    if state.is_draw() {
        return "Draw!".to_string();
    }
    if !state.game_ready {
        return if state.connected_players() < 2 {
            "Waiting for opponent...".to_string()
        } else if state.is_creator(me) {
            "Both players are here. Type `start` to begin.".to_string()
        } else {
            "Waiting for the room creator to start.".to_string()
        };
    }
    match mine {
        Some(mark) if mark == state.current_player => format!("Your turn ({})", mark),
        Some(_) => "Opponent's turn".to_string(),
        None => format!("{} to move (spectating)", state.current_player),
    }
}

pub fn render_state(state: &GameState, me: &PublicKey) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "X: {}   O: {}",
        seat_label(state, Mark::X, me),
        seat_label(state, Mark::O, me)
    );
    let _ = writeln!(out, "Score  X {} - {} O   (v{})", state.x_wins, state.o_wins, state.version);
    let _ = write!(out, "{}", state.board);
    if !state.winning_cells.is_empty() {
        let cells: Vec<String> = state.winning_cells.iter().map(usize::to_string).collect();
        let _ = writeln!(out, "Winning line: {}", cells.join("-"));
    }
    let _ = write!(out, "{}", status_line(state, me));
    out
}
