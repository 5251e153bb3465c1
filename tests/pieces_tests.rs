//! Pieces tests - shape enumeration, bag fairness, rotation

use std::collections::{HashMap, HashSet};

use netris::core::mino::{TETROMINO_I, TETROMINO_O, TETROMINO_S, TETROMINO_T};
use netris::core::{generate, Bag, Mino, Piece};
use netris::types::{Direction, Point, BOARD_WIDTH};

// ============== Generator Tests ==============

#[test]
fn test_mino_counts_per_rank() {
    let counts: Vec<usize> = (1..=5).map(|r| generate(r).unwrap().len()).collect();
    assert_eq!(counts, vec![1, 1, 2, 7, 18]);
}

#[test]
fn test_no_duplicate_canonical_forms() {
    for rank in 1..=5 {
        let minos = generate(rank).unwrap();
        let forms: HashSet<String> = minos.iter().map(|m| m.canonical().to_string()).collect();
        assert_eq!(forms.len(), minos.len(), "rank {}", rank);
    }
}

// ============== Bag Tests ==============

#[test]
fn test_bag_draws_each_mino_once_per_cycle() {
    let minos = generate(4).unwrap();
    let bag = Bag::new(7, &minos, BOARD_WIDTH);

    let cycles = 5;
    let mut seen: HashMap<Mino, usize> = HashMap::new();
    for _ in 0..minos.len() * cycles {
        *seen.entry(bag.take().unwrap()).or_default() += 1;
    }

    assert_eq!(seen.len(), minos.len());
    assert!(seen.values().all(|&n| n == cycles));
}

#[test]
fn test_same_seed_same_sequence() {
    let minos = generate(4).unwrap();
    let a = Bag::new(1234, &minos, BOARD_WIDTH);
    let b = Bag::new(1234, &minos, BOARD_WIDTH);

    for _ in 0..14 {
        assert_eq!(a.next(), b.next());
        assert_eq!(a.take(), b.take());
    }
    for _ in 0..8 {
        assert_eq!(a.garbage_hole(), b.garbage_hole());
    }
}

#[test]
fn test_garbage_holes_in_range() {
    let bag = Bag::new(99, &generate(4).unwrap(), BOARD_WIDTH);
    for _ in 0..200 {
        assert!(bag.garbage_hole() < BOARD_WIDTH);
    }
}

// ============== Rotation Tests ==============

fn sorted(mino: &Mino) -> Vec<Point> {
    let mut points = mino.points().to_vec();
    points.sort_by_key(|p| (p.y, p.x));
    points
}

#[test]
fn test_four_rotations_restore_shape() {
    for shape in [TETROMINO_I, TETROMINO_T, TETROMINO_S] {
        for direction in [Direction::Clockwise, Direction::CounterClockwise] {
            let mut piece = Piece::new(Mino::from(shape), Point::new(3, 3));
            let original = sorted(&piece.mino);

            for _ in 0..4 {
                piece.mino = piece.rotate(1, direction);
                piece.apply_rotation(1, direction);
            }
            assert_eq!(sorted(&piece.mino), original, "{:?} {:?}", shape, direction);
            assert_eq!(piece.rotation, 0);
        }
    }
}

#[test]
fn test_rotate_does_not_modify_piece() {
    let piece = Piece::new(Mino::from(TETROMINO_T), Point::new(3, 3));
    let before = piece.clone();
    let turned = piece.rotate(1, Direction::Clockwise);
    assert_ne!(sorted(&turned), sorted(&before.mino));
    assert_eq!(piece, before);
}

#[test]
fn test_o_piece_rotation_keeps_cells() {
    let piece = Piece::new(Mino::from(TETROMINO_O), Point::new(0, 0));
    let turned = piece.rotate(1, Direction::Clockwise);
    assert_eq!(turned.len(), 4);
}
