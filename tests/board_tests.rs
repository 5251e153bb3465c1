//! Board tests - matrix placement, line clears, garbage, knockouts

use std::sync::Arc;
use std::time::Instant;

use netris::core::mino::{TETROMINO_I, TETROMINO_O};
use netris::core::piece::KICK_OFFSETS;
use netris::core::{
    generate, Bag, Matrix, MatrixError, MatrixEvent, MatrixSnapshot, Mino, Piece, PieceSnapshot,
};
use netris::types::{Block, Direction, Point, BOARD_BUFFER, BOARD_HEIGHT, BOARD_WIDTH};

const ROWS: i32 = (BOARD_HEIGHT + BOARD_BUFFER) as i32;

fn matrix_with_bag(minos: &[Mino]) -> Matrix {
    let mut m = Matrix::standard();
    m.attach_bag(Arc::new(Bag::new(5, minos, BOARD_WIDTH)));
    m
}

fn fill_row(m: &mut Matrix, y: i32) {
    for x in 0..BOARD_WIDTH as i32 {
        assert!(m.set_block(x, y, Block::Garbage, false));
    }
}

#[test]
fn test_matrix_new_empty() {
    let m = Matrix::standard();
    assert_eq!(m.width(), BOARD_WIDTH);
    assert_eq!(m.height(), BOARD_HEIGHT);
    for y in 0..ROWS {
        for x in 0..BOARD_WIDTH as i32 {
            assert_eq!(m.get(x, y), Some(Block::None));
        }
    }
    assert_eq!(m.get(-1, 0), None);
    assert_eq!(m.get(0, ROWS), None);
}

// ============== Placement Tests ==============

#[test]
fn test_can_add_at() {
    let mut m = matrix_with_bag(&generate(4).unwrap());
    assert!(m.take_piece());
    let piece = m.piece().unwrap().clone();
    assert!(m.can_add(&piece), "fresh spawn must fit");

    assert!(!m.can_add_at(&piece, Point::new(-1, 0)));
    assert!(!m.can_add_at(&piece, Point::new(0, -1)));
    assert!(!m.can_add_at(&piece, Point::new(BOARD_WIDTH as i32, 0)));

    let cell = piece.cells_at(piece.point).next().unwrap();
    m.set_block(cell.x, cell.y, Block::Garbage, false);
    assert!(!m.can_add(&piece));
}

#[test]
fn test_add_reports_errors_without_writing() {
    let mut m = Matrix::standard();
    let o = Piece::new(Mino::from(TETROMINO_O), Point::default());

    let err = m.add(&o, o.solid, Point::new(9, 0), false).unwrap_err();
    assert_eq!(err, MatrixError::OutOfBounds { x: 10, y: 0 });
    assert_eq!(m.get(9, 0), Some(Block::None));

    m.add(&o, o.solid, Point::new(0, 0), false).unwrap();
    assert_eq!(m.get(1, 1), Some(o.solid));

    let err = m.add(&o, o.solid, Point::new(1, 0), false).unwrap_err();
    assert!(matches!(err, MatrixError::Collision { .. }));
    assert_eq!(m.get(2, 0), Some(Block::None));
}

// ============== Line Clear Tests ==============

#[test]
fn test_clear_two_rows_shifts_down() {
    let mut m = Matrix::standard();
    fill_row(&mut m, 0);
    fill_row(&mut m, 1);
    m.set_block(3, 2, Block::SolidRed, false);
    m.set_block(4, 5, Block::SolidBlue, false);

    assert_eq!(m.clear_filled(), 2);
    assert_eq!(m.get(3, 0), Some(Block::SolidRed));
    assert_eq!(m.get(4, 3), Some(Block::SolidBlue));
    assert_eq!(m.get(3, 2), Some(Block::None));
    assert!(!m.is_row_full(0));
}

#[test]
fn test_clear_nothing_leaves_board() {
    let mut m = Matrix::standard();
    m.set_block(0, 0, Block::SolidGreen, false);
    let before = m.snapshot();

    assert_eq!(m.clear_filled(), 0);
    assert_eq!(m.snapshot(), before);
}

// ============== Garbage Tests ==============

#[test]
fn test_garbage_rows_have_one_hole() {
    let mut m = matrix_with_bag(&generate(4).unwrap());
    m.set_block(0, 0, Block::SolidCyan, false);

    assert!(m.add_garbage(3));
    for y in 0..3 {
        let holes = (0..BOARD_WIDTH as i32)
            .filter(|&x| m.get(x, y) == Some(Block::None))
            .count();
        assert_eq!(holes, 1, "row {}", y);
    }
    assert_eq!(m.get(0, 3), Some(Block::SolidCyan));
}

#[test]
fn test_garbage_overflow_fails_untouched() {
    let mut m = matrix_with_bag(&generate(4).unwrap());
    m.set_block(2, ROWS - 1, Block::SolidYellow, false);
    let before = m.snapshot();

    assert!(!m.add_garbage(1));
    assert_eq!(m.snapshot(), before);
}

#[test]
fn test_garbage_lifts_falling_piece() {
    let mut m = matrix_with_bag(&[Mino::from(TETROMINO_I)]);
    assert!(m.take_piece());
    let now = Instant::now();
    for _ in 0..ROWS {
        m.move_piece(0, -1, now);
    }
    assert_eq!(m.piece().unwrap().point.y, 0);

    assert!(m.add_garbage(2));
    assert_eq!(m.piece().unwrap().point.y, 2);
}

// ============== Rotation and Game Over Tests ==============

/// Vertical I piece pushed flat against the right wall
fn vertical_i_at_right_wall(now: Instant) -> Matrix {
    let mut m = matrix_with_bag(&[Mino::from(TETROMINO_I)]);
    assert!(m.take_piece());
    assert!(m.rotate_piece(1, Direction::Clockwise, now));
    while m.move_piece(1, 0, now) {}
    m
}

/// Index of the first kick offset where `turned` fits around `from`
fn first_fit(m: &Matrix, turned: &Piece, from: Point) -> Option<usize> {
    KICK_OFFSETS
        .iter()
        .position(|o| m.can_add_at(turned, from.offset(o.x, o.y)))
}

#[test]
fn test_rotation_kicks_off_wall() {
    let now = Instant::now();
    let mut m = vertical_i_at_right_wall(now);
    let before = m.piece().unwrap().clone();
    let mut turned = before.clone();
    turned.mino = before.rotate(1, Direction::Clockwise);

    // Flat at the wall does not fit without a kick
    assert!(!m.can_add_at(&turned, before.point));
    let kick = first_fit(&m, &turned, before.point).expect("some kick fits");
    assert!(kick > 0);

    assert!(m.rotate_piece(1, Direction::Clockwise, now));
    let after = m.piece().unwrap();
    let o = KICK_OFFSETS[kick];
    assert_eq!(after.point, before.point.offset(o.x, o.y));
    assert_eq!(after.mino, turned.mino);
    assert_eq!(after.rotation, 2);
}

#[test]
fn test_rotation_tries_next_kick_when_first_is_blocked() {
    let now = Instant::now();
    let mut m = vertical_i_at_right_wall(now);
    let before = m.piece().unwrap().clone();
    let mut turned = before.clone();
    turned.mino = before.rotate(1, Direction::Clockwise);

    let first = first_fit(&m, &turned, before.point).unwrap();
    let o = KICK_OFFSETS[first];
    let occupied: Vec<Point> = before.cells_at(before.point).collect();
    let blocker = turned
        .cells_at(before.point.offset(o.x, o.y))
        .find(|c| !occupied.contains(c))
        .unwrap();
    assert!(m.set_block(blocker.x, blocker.y, Block::Garbage, false));

    let next = first_fit(&m, &turned, before.point).expect("a later kick fits");
    assert!(next > first);

    assert!(m.rotate_piece(1, Direction::Clockwise, now));
    let o = KICK_OFFSETS[next];
    assert_eq!(m.piece().unwrap().point, before.point.offset(o.x, o.y));
}

#[test]
fn test_blocked_rotation_leaves_piece() {
    let mut m = matrix_with_bag(&[Mino::from(TETROMINO_I)]);
    assert!(m.take_piece());
    let piece = m.piece().unwrap().clone();
    let occupied: Vec<Point> = piece.cells_at(piece.point).collect();

    for y in 0..ROWS {
        for x in 0..BOARD_WIDTH as i32 {
            if !occupied.contains(&Point::new(x, y)) {
                m.set_block(x, y, Block::Garbage, false);
            }
        }
    }

    assert!(!m.rotate_piece(1, Direction::Clockwise, Instant::now()));
    assert_eq!(m.piece(), Some(&piece));
}

#[test]
fn test_game_over_ghosts_board() {
    let mut m = Matrix::standard();
    m.set_block(1, 1, Block::SolidBlue, false);
    m.set_block(2, 1, Block::Garbage, false);

    m.set_game_over();
    assert!(m.is_game_over());
    assert_eq!(m.get(1, 1), Some(Block::SolidBlue.ghost()));
    assert!(m.get(1, 1).unwrap().is_ghost());
    assert_eq!(m.get(2, 1), Some(Block::Garbage));

    // Frozen boards accept nothing
    let o = Piece::new(Mino::from(TETROMINO_O), Point::default());
    assert!(!m.can_add_at(&o, Point::new(5, 5)));
}

#[test]
fn test_blocked_spawn_drops_locked_piece() {
    let now = Instant::now();
    let mut m = matrix_with_bag(&[Mino::from(TETROMINO_I)]);
    assert!(m.take_piece());
    for _ in 0..10 {
        assert!(m.move_piece(0, -1, now));
    }
    // Seal the spawn rows
    for y in BOARD_HEIGHT as i32..ROWS {
        assert!(m.set_block(4, y, Block::Garbage, false));
    }
    m.take_events();

    m.hard_drop_piece(now);
    assert!(m.piece().is_none());
    assert!(m.take_events().contains(&MatrixEvent::GameOver));

    m.draw_pieces();
    let settled = m.snapshot();
    assert_eq!(settled.cells.len(), 4 + (ROWS as usize - BOARD_HEIGHT));
    assert!(settled.piece.is_none());
}

#[test]
fn test_replace_drops_piece_outside_board() {
    let mut remote = MatrixSnapshot::default();
    remote.cells.insert(0, Block::Garbage);
    remote.piece = Some(PieceSnapshot {
        x: i32::MAX,
        y: i32::MIN,
        mino: Mino::from_coords(&[(i32::MAX, 0), (i32::MIN, 0)]),
        ghost: Block::GhostCyan,
        solid: Block::SolidCyan,
        rotation: 0,
    });

    let mut m = Matrix::standard();
    m.replace(&remote);
    assert!(m.piece().is_none());
    assert_eq!(m.get(0, 0), Some(Block::Garbage));
    m.draw_pieces();

    remote.piece = Some(PieceSnapshot {
        x: 3,
        y: 10,
        mino: Mino::from(TETROMINO_O),
        ..Default::default()
    });
    m.replace(&remote);
    assert_eq!(m.piece().map(|p| p.point), Some(Point::new(3, 10)));
}

#[test]
fn test_reset_restores_play() {
    let mut m = matrix_with_bag(&generate(4).unwrap());
    m.set_block(1, 1, Block::SolidBlue, false);
    m.set_game_over();
    m.reset();

    assert!(!m.is_game_over());
    assert_eq!(m.get(1, 1), Some(Block::None));
    assert!(m.take_piece());
}
