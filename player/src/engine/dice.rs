//! Dice sources for the table engine.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Dice {
    fn roll(&mut self) -> [u8; 2];
}

/// Two fair six-sided dice, optionally seeded for reproducible games.
#[derive(Debug, Clone)]
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Dice for RandomDice {
    fn roll(&mut self) -> [u8; 2] {
        [self.rng.gen_range(1..=6), self.rng.gen_range(1..=6)]
    }
}

/// Predetermined rolls, replayed in order. Once exhausted it rolls `[1, 2]`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    rolls: VecDeque<[u8; 2]>,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = [u8; 2]>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self) -> [u8; 2] {
        self.rolls.pop_front().unwrap_or([1, 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_dice_are_reproducible_and_in_range() {
        let mut a = RandomDice::new(Some(7));
        let mut b = RandomDice::new(Some(7));
        for _ in 0..50 {
            let roll = a.roll();
            assert_eq!(roll, b.roll());
            assert!(roll.iter().all(|d| (1..=6).contains(d)));
        }
    }

    #[test]
    fn scripted_dice_replay_then_fall_back() {
        let mut dice = ScriptedDice::new([[6, 6], [3, 4]]);
        assert_eq!(dice.roll(), [6, 6]);
        assert_eq!(dice.roll(), [3, 4]);
        assert_eq!(dice.remaining(), 0);
        assert_eq!(dice.roll(), [1, 2]);
    }
}
