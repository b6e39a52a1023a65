//! A player's identity and Elo-style skill rating.
//!
//! Grounded on `examples/original_source/src/player.c`: the rating formula
//! in [`rating_update`] is ported verbatim (including truncation toward
//! zero of the floating-point delta), and the initial rating (1500) is the
//! same constant `player_create` used.

use std::sync::{Arc, Mutex};

pub const INITIAL_RATING: i32 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Draw,
    P1Win,
    P2Win,
}

pub struct Player {
    name: String,
    rating: Mutex<i32>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rating: Mutex::new(INITIAL_RATING),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rating(&self) -> i32 {
        *self.rating.lock().unwrap()
    }
}

/// Update `p1` and `p2`'s ratings according to `result`, taking both
/// players' rating locks. Locked in ascending pointer-address order so
/// that two concurrent updates for the same pair (one posted from each
/// side of a just-finished game) can never deadlock regardless of which
/// side calls first — see DESIGN.md, Open Question 4.
pub fn rating_update(p1: &Arc<Player>, p2: &Arc<Player>, result: GameResult) {
    let p1_addr = Arc::as_ptr(p1) as usize;
    let p2_addr = Arc::as_ptr(p2) as usize;

    if p1_addr == p2_addr {
        // A player cannot play (and thus cannot post a result) against themself;
        // guard against a caller bug rather than deadlocking on a self-lock.
        return;
    }

    if p1_addr < p2_addr {
        let mut r1 = p1.rating.lock().unwrap();
        let mut r2 = p2.rating.lock().unwrap();
        apply(&mut r1, &mut r2, result);
    } else {
        let mut r2 = p2.rating.lock().unwrap();
        let mut r1 = p1.rating.lock().unwrap();
        apply(&mut r1, &mut r2, result);
    }
}

fn apply(r1: &mut i32, r2: &mut i32, result: GameResult) {
    let (s1, s2): (f64, f64) = match result {
        GameResult::Draw => (0.5, 0.5),
        GameResult::P1Win => (1.0, 0.0),
        GameResult::P2Win => (0.0, 1.0),
    };

    let e1 = 1.0 / (1.0 + 10f64.powf((*r2 as f64 - *r1 as f64) / 400.0));
    let e2 = 1.0 - e1;

    let new_r1 = *r1 + (32.0 * (s1 - e1)) as i32;
    let new_r2 = *r2 + (32.0 * (s2 - e2)) as i32;

    *r1 = new_r1;
    *r2 = new_r2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_starts_at_initial_rating() {
        let p = Player::new("alice");
        assert_eq!(p.rating(), INITIAL_RATING);
    }

    #[test]
    fn equal_ratings_win_moves_by_sixteen() {
        let p1 = Player::new("alice");
        let p2 = Player::new("bob");
        rating_update(&p1, &p2, GameResult::P1Win);
        assert_eq!(p1.rating(), INITIAL_RATING + 16);
        assert_eq!(p2.rating(), INITIAL_RATING - 16);
    }

    #[test]
    fn equal_ratings_draw_is_a_no_op() {
        let p1 = Player::new("alice");
        let p2 = Player::new("bob");
        rating_update(&p1, &p2, GameResult::Draw);
        assert_eq!(p1.rating(), INITIAL_RATING);
        assert_eq!(p2.rating(), INITIAL_RATING);
    }

    #[test]
    fn update_is_bounded_by_thirty_two() {
        let p1 = Player::new("alice");
        let p2 = Player::new("bob");
        rating_update(&p1, &p2, GameResult::P1Win);
        let delta1 = (p1.rating() - INITIAL_RATING).abs();
        let delta2 = (p2.rating() - INITIAL_RATING).abs();
        assert!(delta1 <= 32);
        assert!(delta2 <= 32);
    }

    #[test]
    fn order_of_arguments_does_not_change_outcome() {
        let a = Player::new("a");
        let b = Player::new("b");
        rating_update(&a, &b, GameResult::P1Win);
        let a2 = Player::new("a");
        let b2 = Player::new("b");
        rating_update(&b2, &a2, GameResult::P2Win);
        assert_eq!(a.rating(), a2.rating());
        assert_eq!(b.rating(), b2.rating());
    }
}
