//! Scoring module - line-clear score and combo garbage bonus
//!
//! The score is informational. Garbage output is driven by the combo
//! counter: a clear of n lines sends n-1 lines plus [`combo_bonus`].

/// Highest combo step the bonus schedule grows to (combo - 3)
pub const COMBO_BONUS_CAP: u32 = 7;

/// Score for a single placement clearing `lines` rows
pub fn line_score(lines: usize) -> u32 {
    match lines {
        0 => 0,
        1 => 100,
        2 => 300,
        3 => 500,
        4 => 800,
        n => 1000 + (n as u32 - 5) * 200,
    }
}

/// Garbage bonus for the given combo count.
///
/// | Combo | Bonus |
/// |-------|-------|
/// | 0-1 | 0 |
/// | 2-3 | 1 |
/// | 4 | 1 |
/// | 5 | 2 |
/// | 6 | 3 |
/// | 7 | 5 |
/// | 8 | 8 |
/// | 9 | 13 |
/// | 10+ | 21 |
pub fn combo_bonus(combo: u32) -> u32 {
    match combo {
        0 | 1 => 0,
        2 | 3 => 1,
        c => fib((c - 3).min(COMBO_BONUS_CAP) + 1),
    }
}

/// Garbage lines produced by a clear at the given combo count
pub fn garbage_for_clear(lines: usize, combo: u32) -> u32 {
    (lines as u32).saturating_sub(1) + combo_bonus(combo)
}

/// fib(1) = fib(2) = 1
fn fib(n: u32) -> u32 {
    let (mut a, mut b) = (0u32, 1u32);
    for _ in 0..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_score_table() {
        assert_eq!(line_score(0), 0);
        assert_eq!(line_score(1), 100);
        assert_eq!(line_score(2), 300);
        assert_eq!(line_score(3), 500);
        assert_eq!(line_score(4), 800);
        assert_eq!(line_score(5), 1000);
        assert_eq!(line_score(7), 1400);
    }

    #[test]
    fn test_fib() {
        let v: Vec<u32> = (1..=8).map(fib).collect();
        assert_eq!(v, vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn test_combo_bonus_schedule() {
        assert_eq!(combo_bonus(1), 0);
        assert_eq!(combo_bonus(2), 1);
        assert_eq!(combo_bonus(3), 1);
        assert_eq!(combo_bonus(4), 1);
        assert_eq!(combo_bonus(5), 2);
        assert_eq!(combo_bonus(6), 3);
        assert_eq!(combo_bonus(7), 5);
        assert_eq!(combo_bonus(10), 21);
        assert_eq!(combo_bonus(50), 21);
    }

    #[test]
    fn test_garbage_for_clear() {
        assert_eq!(garbage_for_clear(1, 1), 0);
        assert_eq!(garbage_for_clear(4, 1), 3);
        assert_eq!(garbage_for_clear(2, 2), 2);
    }
}
