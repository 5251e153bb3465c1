use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netris::core::{generate, Bag, Matrix};
use netris::game::protocol::{parse_command, Command, UpdateMatrix};
use netris::game::encode;
use netris::types::{Block, Direction, BOARD_WIDTH};

fn playing_matrix(seed: i64) -> Matrix {
    let mut m = Matrix::standard();
    m.attach_bag(Arc::new(Bag::new(seed, &generate(4).unwrap(), BOARD_WIDTH)));
    m.take_piece();
    m
}

fn bench_generate(c: &mut Criterion) {
    c.bench_function("generate_rank_5", |b| {
        b.iter(|| generate(black_box(5)).unwrap());
    });
}

fn bench_line_clear(c: &mut Criterion) {
    c.bench_function("clear_4_lines", |b| {
        b.iter(|| {
            let mut m = Matrix::standard();
            for y in 0..4 {
                for x in 0..BOARD_WIDTH as i32 {
                    m.set_block(x, y, Block::Garbage, false);
                }
            }
            m.clear_filled()
        })
    });
}

fn bench_move_and_rotate(c: &mut Criterion) {
    let mut m = playing_matrix(12345);
    let now = Instant::now();

    c.bench_function("move_piece", |b| {
        b.iter(|| {
            m.move_piece(black_box(1), 0, now);
            m.move_piece(black_box(-1), 0, now);
        })
    });

    c.bench_function("rotate_piece", |b| {
        b.iter(|| m.rotate_piece(1, Direction::Clockwise, now))
    });
}

fn bench_hard_drop(c: &mut Criterion) {
    c.bench_function("hard_drop_until_reset", |b| {
        let mut m = playing_matrix(7);
        b.iter(|| {
            m.hard_drop_piece(Instant::now());
            if m.is_game_over() || m.piece().is_none() {
                m.reset();
                m.take_piece();
            }
            m.take_events()
        })
    });
}

fn bench_draw_pieces(c: &mut Criterion) {
    let mut m = playing_matrix(99);
    c.bench_function("draw_pieces", |b| b.iter(|| m.draw_pieces()));
}

fn bench_snapshot_wire(c: &mut Criterion) {
    let mut m = playing_matrix(42);
    for _ in 0..6 {
        m.hard_drop_piece(Instant::now());
    }
    let command = Command::UpdateMatrix(UpdateMatrix {
        matrixes: [(1, m.snapshot())].into_iter().collect(),
    });
    let line = encode(&command).unwrap();

    c.bench_function("encode_update_matrix", |b| {
        b.iter(|| encode(black_box(&command)).unwrap())
    });
    c.bench_function("parse_update_matrix", |b| {
        b.iter(|| parse_command(black_box(&line)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_generate,
    bench_line_clear,
    bench_move_and_rotate,
    bench_hard_drop,
    bench_draw_pieces,
    bench_snapshot_wire
);
criterion_main!(benches);
