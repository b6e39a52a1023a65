//! 3x3 tic-tac-toe board state machine.
//!
//! Grounded line-by-line on `examples/original_source/src/game.c`: board
//! indexing, win-line scan, draw detection, the `game_unparse_state` board
//! text layout, and the `game_parse_move`/`game_unparse_move` wire format
//! are all ported from the C original (see DESIGN.md for the Open
//! Question resolution on move-parsing).

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    First,
    Second,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    /// Wire encoding used in packet headers and `ENDED`/`RESIGN` payloads:
    /// 1 = First, 2 = Second, 0 reserved for "none"/draw.
    pub fn to_wire(role: Option<Role>) -> u8 {
        match role {
            None => 0,
            Some(Role::First) => 1,
            Some(Role::Second) => 2,
        }
    }

    fn piece_char(self) -> char {
        match self {
            Role::First => 'X',
            Role::Second => 'O',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMove {
    pub role: Role,
    /// 1-based cell index in row-major order, 1..=9.
    pub placement: u8,
}

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

struct GameInner {
    board: [Option<Role>; 9],
    next: Role,
    over: bool,
    winner: Option<Role>,
}

impl GameInner {
    fn new() -> Self {
        Self {
            board: [None; 9],
            next: Role::First,
            over: false,
            winner: None,
        }
    }

    fn apply_move_locked(&mut self, mv: GameMove) -> Result<(), &'static str> {
        if self.over {
            return Err("game is already over");
        }
        let idx = mv.placement as usize - 1;
        if idx >= 9 {
            return Err("cell out of range");
        }
        if self.board[idx].is_some() {
            return Err("cell is occupied");
        }
        if mv.role != self.next {
            return Err("not this piece's turn");
        }
        self.board[idx] = Some(mv.role);
        self.next = self.next.opposite();
        self.recompute_termination();
        Ok(())
    }

    fn recompute_termination(&mut self) {
        for line in LINES {
            let [a, b, c] = line;
            if let (Some(ra), Some(rb), Some(rc)) = (self.board[a], self.board[b], self.board[c])
            {
                if ra == rb && rb == rc {
                    self.over = true;
                    self.winner = Some(ra);
                    return;
                }
            }
        }
        if self.board.iter().all(|c| c.is_some()) {
            self.over = true;
            self.winner = None;
        }
    }

    fn resign_locked(&mut self, role: Role) -> Result<(), &'static str> {
        if self.over {
            return Err("game is already over");
        }
        self.over = true;
        self.winner = Some(role.opposite());
        Ok(())
    }

    fn unparse_state_locked(&self) -> String {
        let cell = |i: usize| match self.board[i] {
            None => ' ',
            Some(r) => r.piece_char(),
        };
        let row = |a: usize, b: usize, c: usize| format!("{}|{}|{}", cell(a), cell(b), cell(c));
        format!(
            "{}\n-----\n{}\n-----\n{}",
            row(0, 1, 2),
            row(3, 4, 5),
            row(6, 7, 8)
        )
    }
}

pub struct Game {
    inner: Mutex<GameInner>,
}

impl Game {
    pub fn create() -> Self {
        Self {
            inner: Mutex::new(GameInner::new()),
        }
    }

    pub async fn apply_move(&self, mv: GameMove) -> Result<(), &'static str> {
        self.inner.lock().await.apply_move_locked(mv)
    }

    pub async fn resign(&self, role: Role) -> Result<(), &'static str> {
        self.inner.lock().await.resign_locked(role)
    }

    pub async fn is_over(&self) -> bool {
        self.inner.lock().await.over
    }

    pub async fn winner(&self) -> Option<Role> {
        self.inner.lock().await.winner
    }

    pub async fn next_to_move(&self) -> Role {
        self.inner.lock().await.next
    }

    pub async fn unparse_state(&self) -> String {
        self.inner.lock().await.unparse_state_locked()
    }
}

/// Parse a move string of the form `<digit>[ -> <letter>]` where the
/// leading decimal digit 1-9 names the cell in row-major order and a
/// (mandatory) trailing `X`/`x`/`O`/`o` names the piece. If `role` is
/// `Some`, the named piece must agree with it. See DESIGN.md's Open
/// Question 1 for why the piece character is always required.
pub fn parse_move(role: Option<Role>, s: &str) -> Option<GameMove> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let placement = first.to_digit(10)?;
    if !(1..=9).contains(&placement) {
        return None;
    }
    let piece = s[first.len_utf8()..].chars().find_map(|c| match c {
        'x' | 'X' => Some(Role::First),
        'o' | 'O' => Some(Role::Second),
        _ => None,
    })?;
    if let Some(expected) = role {
        if expected != piece {
            return None;
        }
    }
    Some(GameMove {
        role: piece,
        placement: placement as u8,
    })
}

pub fn unparse_move(mv: &GameMove) -> String {
    format!("{}->{}", mv.placement, mv.role.piece_char())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_game_has_x_to_move_and_is_not_over() {
        let g = Game::create();
        assert_eq!(g.next_to_move().await, Role::First);
        assert!(!g.is_over().await);
        assert_eq!(g.winner().await, None);
    }

    #[tokio::test]
    async fn top_row_win_is_detected_for_first_player() {
        let g = Game::create();
        // X: 1, O: 4, X: 2, O: 5, X: 3 -> X wins top row.
        for (placement, role) in [
            (1, Role::First),
            (4, Role::Second),
            (2, Role::First),
            (5, Role::Second),
            (3, Role::First),
        ] {
            g.apply_move(GameMove { role, placement }).await.unwrap();
        }
        assert!(g.is_over().await);
        assert_eq!(g.winner().await, Some(Role::First));
    }

    #[tokio::test]
    async fn full_board_with_no_line_is_a_draw() {
        let g = Game::create();
        // Standard tic-tac-toe draw sequence, X then O alternating.
        let placements = [1, 2, 3, 5, 4, 6, 8, 7, 9];
        for (i, placement) in placements.into_iter().enumerate() {
            let role = if i % 2 == 0 { Role::First } else { Role::Second };
            g.apply_move(GameMove { role, placement }).await.unwrap();
        }
        assert!(g.is_over().await);
        assert_eq!(g.winner().await, None);
    }

    #[tokio::test]
    async fn move_out_of_turn_is_rejected() {
        let g = Game::create();
        let err = g
            .apply_move(GameMove {
                role: Role::Second,
                placement: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err, "not this piece's turn");
    }

    #[tokio::test]
    async fn move_onto_occupied_cell_is_rejected() {
        let g = Game::create();
        g.apply_move(GameMove {
            role: Role::First,
            placement: 1,
        })
        .await
        .unwrap();
        let err = g
            .apply_move(GameMove {
                role: Role::Second,
                placement: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err, "cell is occupied");
    }

    #[tokio::test]
    async fn resign_sets_opposite_role_as_winner() {
        let g = Game::create();
        g.resign(Role::First).await.unwrap();
        assert!(g.is_over().await);
        assert_eq!(g.winner().await, Some(Role::Second));
    }

    #[tokio::test]
    async fn resign_after_game_over_fails() {
        let g = Game::create();
        g.resign(Role::First).await.unwrap();
        assert!(g.resign(Role::Second).await.is_err());
    }

    #[test]
    fn parse_requires_explicit_piece() {
        assert!(parse_move(None, "5").is_none());
    }

    #[test]
    fn parse_rejects_role_mismatch() {
        assert!(parse_move(Some(Role::Second), "5->X").is_none());
    }

    #[test]
    fn parse_accepts_matching_role() {
        let mv = parse_move(Some(Role::First), "5->X").unwrap();
        assert_eq!(mv.placement, 5);
        assert_eq!(mv.role, Role::First);
    }

    #[test]
    fn parse_unparse_round_trips() {
        for placement in 1..=9u8 {
            for role in [Role::First, Role::Second] {
                let mv = GameMove { role, placement };
                let s = unparse_move(&mv);
                let parsed = parse_move(None, &s).unwrap();
                assert_eq!(parsed.placement, mv.placement);
                assert_eq!(parsed.role, mv.role);
            }
        }
    }

    #[tokio::test]
    async fn unparse_state_matches_five_line_board_format() {
        let g = Game::create();
        g.apply_move(GameMove {
            role: Role::First,
            placement: 1,
        })
        .await
        .unwrap();
        let text = g.unparse_state().await;
        assert_eq!(text, "X| | \n-----\n | | \n-----\n | | ");
    }
}
