//! Matrix module - one player's playfield
//!
//! The matrix is a `width x (height + buffer)` grid stored as a flat
//! row-major vector (`y * width + x`, row 0 at the bottom). A second grid of
//! the same size holds the overlay: the falling piece and its ghost.
//!
//! All time-dependent operations take the current [`Instant`] explicitly so
//! the simulation can be replayed deterministically. Side effects that the
//! owner must react to (fall timer reset, outgoing garbage, score, knockout)
//! are queued as [`MatrixEvent`]s and drained with [`Matrix::take_events`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::bag::Bag;
use crate::piece::{Piece, KICK_OFFSETS};
use crate::scoring::{garbage_for_clear, line_score};
use crate::snapshot::{MatrixSnapshot, PieceSnapshot};
use crate::types::{
    Block, Direction, MatrixType, Point, BOARD_BUFFER, BOARD_HEIGHT, BOARD_WIDTH, COMBO_BASE_MS,
    COMBO_BONUS_MS, GARBAGE_DELAY_MS, SPEED_WINDOW_SECS,
};

/// Matrix shared between the game loop tasks
pub type SharedMatrix = Arc<Mutex<Matrix>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("cell ({x},{y}) is out of bounds")]
    OutOfBounds { x: i32, y: i32 },
    #[error("cell ({x},{y}) is occupied")]
    Collision { x: i32, y: i32 },
}

/// Side effects produced by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixEvent {
    /// The piece moved down or locked; the fall timer restarts
    Moved,
    /// Garbage left over after cancelling pending garbage
    SendGarbage(u32),
    /// Points for a placement
    Score(u32),
    /// The piece could not lock, spawn, or survive a garbage insert
    GameOver,
}

#[derive(Debug, Clone)]
pub struct Matrix {
    width: usize,
    height: usize,
    buffer: usize,
    matrix_type: MatrixType,

    cells: Vec<Block>,
    overlay: Vec<Block>,

    bag: Option<Arc<Bag>>,
    piece: Option<Piece>,

    pub player_name: String,

    combo: u32,
    combo_start: Option<Instant>,
    combo_end: Option<Instant>,
    pending_garbage: u32,
    pending_garbage_at: Option<Instant>,

    pub lines_cleared: u32,
    pub garbage_sent: u32,
    pub garbage_received: u32,
    /// Pieces per minute over the last two minutes
    pub speed: u32,

    game_over: bool,
    lands: VecDeque<Instant>,
    events: Vec<MatrixEvent>,
}

impl Matrix {
    pub fn new(width: usize, height: usize, buffer: usize, matrix_type: MatrixType) -> Self {
        let size = width * (height + buffer);
        Self {
            width,
            height,
            buffer,
            matrix_type,
            cells: vec![Block::None; size],
            overlay: vec![Block::None; size],
            bag: None,
            piece: None,
            player_name: String::new(),
            combo: 0,
            combo_start: None,
            combo_end: None,
            pending_garbage: 0,
            pending_garbage_at: None,
            lines_cleared: 0,
            garbage_sent: 0,
            garbage_received: 0,
            speed: 0,
            game_over: false,
            lands: VecDeque::new(),
            events: Vec::new(),
        }
    }

    /// 10x20 playfield with a 4 row spawn buffer
    pub fn standard() -> Self {
        Self::new(BOARD_WIDTH, BOARD_HEIGHT, BOARD_BUFFER, MatrixType::Standard)
    }

    /// Next-piece preview sized for the given rank
    pub fn preview(rank: i32) -> Self {
        let rank = rank.max(1) as usize;
        Self::new(rank, rank - 1, 0, MatrixType::Preview)
    }

    pub fn shared(self) -> SharedMatrix {
        Arc::new(Mutex::new(self))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn matrix_type(&self) -> MatrixType {
        self.matrix_type
    }

    pub fn piece(&self) -> Option<&Piece> {
        self.piece.as_ref()
    }

    pub fn bag(&self) -> Option<&Arc<Bag>> {
        self.bag.as_ref()
    }

    pub fn attach_bag(&mut self, bag: Arc<Bag>) {
        self.bag = Some(bag);
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Take the matrix out of play without freezing its blocks
    pub fn mark_game_over(&mut self) {
        self.game_over = true;
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    /// Time left in the current combo window
    pub fn combo_remaining(&self, now: Instant) -> Option<Duration> {
        if self.combo == 0 {
            return None;
        }
        self.combo_end
            .map(|end| end.saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    pub fn pending_garbage(&self) -> u32 {
        self.pending_garbage
    }

    /// Drain queued side effects
    pub fn take_events(&mut self) -> Vec<MatrixEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: MatrixEvent) {
        self.events.push(event);
    }

    #[inline(always)]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height + self.buffer {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    fn rows(&self) -> usize {
        self.height + self.buffer
    }

    /// Solid cell at (x, y), `None` when out of bounds
    pub fn get(&self, x: i32, y: i32) -> Option<Block> {
        self.index(x, y).map(|i| self.cells[i])
    }

    /// Visible block at (x, y); the overlay wins over the solid layer.
    pub fn block(&self, x: i32, y: i32) -> Block {
        match self.index(x, y) {
            Some(i) if !self.overlay[i].is_empty() => self.overlay[i],
            Some(i) => self.cells[i],
            None => Block::None,
        }
    }

    /// Write a single block into an empty cell
    pub fn set_block(&mut self, x: i32, y: i32, block: Block, overlay: bool) -> bool {
        let Some(i) = self.index(x, y) else {
            return false;
        };
        let layer = if overlay {
            &mut self.overlay
        } else {
            &mut self.cells
        };
        if !layer[i].is_empty() {
            return false;
        }
        layer[i] = block;
        true
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        if y >= self.rows() {
            return false;
        }
        let start = y * self.width;
        self.cells[start..start + self.width]
            .iter()
            .all(|b| !b.is_empty())
    }

    fn fits(&self, grid: &[Block], piece: &Piece, at: Point) -> bool {
        if self.game_over || at.y < 0 {
            return false;
        }
        piece
            .cells_at(at)
            .all(|c| matches!(self.index(c.x, c.y), Some(i) if grid[i].is_empty()))
    }

    /// Whether every cell of `piece` placed at `at` is in bounds and empty
    pub fn can_add_at(&self, piece: &Piece, at: Point) -> bool {
        self.fits(&self.cells, piece, at)
    }

    pub fn can_add(&self, piece: &Piece) -> bool {
        self.can_add_at(piece, piece.point)
    }

    /// Write `piece` cells as `block`. Validates every cell before writing.
    pub fn add(
        &mut self,
        piece: &Piece,
        block: Block,
        at: Point,
        overlay: bool,
    ) -> Result<(), MatrixError> {
        if self.game_over {
            return Ok(());
        }

        let mut targets = Vec::with_capacity(piece.mino.len());
        for c in piece.cells_at(at) {
            let i = self
                .index(c.x, c.y)
                .ok_or(MatrixError::OutOfBounds { x: c.x, y: c.y })?;
            if !overlay && !self.cells[i].is_empty() {
                return Err(MatrixError::Collision { x: c.x, y: c.y });
            }
            targets.push(i);
        }

        let layer = if overlay {
            &mut self.overlay
        } else {
            &mut self.cells
        };
        for i in targets {
            layer[i] = block;
        }
        Ok(())
    }

    /// Remove filled rows, bottom to top, and return how many were removed.
    pub fn clear_filled(&mut self) -> usize {
        let width = self.width;
        let rows = self.rows();
        let mut cleared = 0;
        let mut y = 0;
        while y < rows {
            if !self.is_row_full(y) {
                y += 1;
                continue;
            }

            // Re-check the same row, the one above just moved into it
            self.cells
                .copy_within((y + 1) * width..rows * width, y * width);
            let top = (rows - 1) * width;
            self.cells[top..].fill(Block::None);
            cleared += 1;
        }
        cleared
    }

    pub fn clear(&mut self) {
        self.cells.fill(Block::None);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.fill(Block::None);
    }

    /// Back to an empty, playable board
    pub fn reset(&mut self) {
        self.game_over = false;
        self.piece = None;
        self.lands.clear();
        self.speed = 0;
        self.pending_garbage = 0;
        self.pending_garbage_at = None;
        self.combo = 0;
        self.combo_start = None;
        self.combo_end = None;
        self.lines_cleared = 0;
        self.garbage_sent = 0;
        self.garbage_received = 0;
        self.events.clear();
        self.clear();
        self.clear_overlay();
    }

    /// Spawn column is centred; spawn row is the first fit inside the buffer.
    fn piece_start(&self, piece: &Piece) -> Option<Point> {
        let x = (self.width / 2) as i32 - piece.mino.width() / 2;
        (self.height..self.rows())
            .map(|y| Point::new(x, y as i32))
            .find(|&at| self.can_add_at(piece, at))
    }

    /// Draw the next piece from the bag. Non-standard matrices accept trivially.
    pub fn take_piece(&mut self) -> bool {
        if self.matrix_type != MatrixType::Standard {
            return true;
        }
        if self.game_over {
            return false;
        }
        let Some(mino) = self.bag.as_ref().and_then(|bag| bag.take()) else {
            return false;
        };

        let mut piece = Piece::new(mino, Point::default());
        match self.piece_start(&piece) {
            Some(at) => {
                piece.point = at;
                self.piece = Some(piece);
                true
            }
            None => false,
        }
    }

    /// One gravity step
    pub fn lower_piece(&mut self, now: Instant) {
        let Some(piece) = self.piece.as_ref() else {
            return;
        };
        if self.can_add_at(piece, piece.point.offset(0, -1)) {
            self.move_piece(0, -1, now);
        } else {
            self.land_piece(now);
        }
    }

    pub fn move_piece(&mut self, dx: i32, dy: i32, now: Instant) -> bool {
        if self.game_over || (dx == 0 && dy == 0) {
            return false;
        }
        let Some(piece) = self.piece.as_ref() else {
            return false;
        };

        let to = piece.point.offset(dx, dy);
        if !self.can_add_at(piece, to) {
            return false;
        }
        let resting = !self.can_add_at(piece, to.offset(0, -1));

        if let Some(piece) = self.piece.as_mut() {
            piece.apply_reset(now);
            piece.point = to;
        }
        if resting {
            self.land_piece(now);
        }
        if dy < 0 {
            self.emit(MatrixEvent::Moved);
        }
        true
    }

    /// Rotate with the fixed kick search. A rejected rotation leaves the piece untouched.
    pub fn rotate_piece(&mut self, rotations: u32, direction: Direction, now: Instant) -> bool {
        if self.game_over || rotations == 0 {
            return false;
        }
        let Some(mut piece) = self.piece.take() else {
            return false;
        };

        let rotated_mino = piece.rotate(rotations, direction);
        let previous = std::mem::replace(&mut piece.mino, rotated_mino);
        let kicked = KICK_OFFSETS
            .iter()
            .map(|o| piece.point.offset(o.x, o.y))
            .find(|&at| self.can_add_at(&piece, at));

        let rotated = match kicked {
            Some(at) => {
                piece.apply_reset(now);
                piece.point = at;
                piece.apply_rotation(rotations, direction);
                true
            }
            None => {
                piece.mino = previous;
                false
            }
        };
        self.piece = Some(piece);
        rotated
    }

    /// Lock the piece at its lowest resting row right away
    pub fn hard_drop_piece(&mut self, now: Instant) {
        self.finish_landing_piece(now);
    }

    fn land_piece(&mut self, now: Instant) {
        if self.game_over {
            return;
        }
        if let Some(piece) = self.piece.as_mut() {
            if !piece.is_landing() && !piece.is_landed() {
                piece.begin_landing(now);
            }
        }
    }

    /// Lock-delay watchdog step. Returns true when the piece locked.
    pub fn settle(&mut self, now: Instant) -> bool {
        if self.game_over {
            return false;
        }
        let Some(piece) = self.piece.as_ref() else {
            return false;
        };
        if !piece.is_landing() || piece.is_landed() || !piece.lock_delay_expired(now) {
            return false;
        }

        // Slid off a ledge while landing
        if self.can_add_at(piece, piece.point.offset(0, -1)) {
            if let Some(piece) = self.piece.as_mut() {
                piece.cancel_landing();
            }
            return false;
        }

        self.finish_landing_piece(now);
        true
    }

    fn resting_point(&self, piece: &Piece) -> Option<Point> {
        let x = piece.point.x;
        let mut y = piece.point.y;
        while y > 0 && self.can_add_at(piece, Point::new(x, y - 1)) {
            y -= 1;
        }
        (y - 1..self.rows() as i32)
            .map(|dy| Point::new(x, dy))
            .find(|&at| self.can_add_at(piece, at))
    }

    fn finish_landing_piece(&mut self, now: Instant) {
        if self.game_over {
            return;
        }
        let Some(mut piece) = self.piece.take() else {
            return;
        };
        if piece.is_landed() {
            self.piece = Some(piece);
            return;
        }
        piece.mark_landed();

        let dropped = match self.resting_point(&piece) {
            Some(at) => {
                piece.point = at;
                self.add(&piece, piece.solid, at, false).is_ok()
            }
            None => false,
        };
        self.piece = Some(piece);

        if !dropped {
            self.emit(MatrixEvent::GameOver);
            return;
        }

        let cleared = self.clear_filled();
        self.lines_cleared += cleared as u32;
        let score = line_score(cleared);
        if score > 0 {
            self.emit(MatrixEvent::Score(score));
        }

        self.emit(MatrixEvent::Moved);
        self.record_landing(now);

        if cleared > 0 {
            let send = self.add_to_combo(cleared, now);
            let remaining = if send <= self.pending_garbage {
                self.pending_garbage -= send;
                0
            } else {
                let surplus = send - self.pending_garbage;
                self.pending_garbage = 0;
                surplus
            };
            if remaining > 0 {
                self.emit(MatrixEvent::SendGarbage(remaining));
            }
        }

        if !self.take_piece() {
            // The locked piece is already part of the board
            self.piece = None;
            self.emit(MatrixEvent::GameOver);
        }
    }

    fn record_landing(&mut self, now: Instant) {
        let window = Duration::from_secs(SPEED_WINDOW_SECS);
        while let Some(first) = self.lands.front() {
            if now.saturating_duration_since(*first) > window {
                self.lands.pop_front();
            } else {
                break;
            }
        }
        self.lands.push_back(now);

        let n = self.lands.len() as u128;
        if n > 1 {
            if let Some(first) = self.lands.front() {
                let per_piece = now.saturating_duration_since(*first).as_nanos() / n;
                if per_piece > 0 {
                    self.speed = (Duration::from_secs(60).as_nanos() / per_piece) as u32;
                }
            }
        }
    }

    /// Extend the combo window and return the garbage this clear produces.
    fn add_to_combo(&mut self, lines: usize, now: Instant) -> u32 {
        if self.game_over {
            return 0;
        }

        let expired = self.combo_end.map_or(true, |end| end <= now);
        if self.combo == 0 || expired {
            self.combo = 0;
            self.combo_start = Some(now);
            self.combo_end = Some(now);
        }
        self.combo += 1;

        let divisor = 1u64 << (self.combo - 1).min(32);
        let base = COMBO_BASE_MS * 1_000_000 / divisor;
        let bonus = COMBO_BONUS_MS * 1_000_000 / divisor;
        let extension = Duration::from_nanos(base + bonus * lines as u64);
        self.combo_end = Some(self.combo_end.unwrap_or(now) + extension);

        garbage_for_clear(lines, self.combo)
    }

    /// Stage incoming garbage. The first line becomes eligible after a delay.
    pub fn add_pending_garbage(&mut self, lines: u32, now: Instant) {
        if self.pending_garbage == 0 {
            self.pending_garbage_at = Some(now + Duration::from_millis(GARBAGE_DELAY_MS));
        }
        self.pending_garbage += lines;
    }

    /// Garbage intake step: insert one pending line if it is due.
    pub fn receive_garbage(&mut self, now: Instant) {
        if self.pending_garbage == 0 || self.game_over {
            return;
        }
        if self.pending_garbage_at.is_some_and(|at| now < at) {
            return;
        }

        self.pending_garbage -= 1;
        if !self.add_garbage(1) {
            self.emit(MatrixEvent::GameOver);
        }
    }

    /// Push `lines` garbage rows in from the bottom, each with one hole.
    ///
    /// Returns false, leaving the matrix untouched, when occupied cells
    /// would leave the top of the buffer or the falling piece has no room.
    pub fn add_garbage(&mut self, lines: usize) -> bool {
        let width = self.width;
        let rows = self.rows();
        if lines == 0 {
            return true;
        }
        if lines > rows
            || self.cells[(rows - lines) * width..]
                .iter()
                .any(|b| !b.is_empty())
        {
            return false;
        }

        let mut shifted = vec![Block::None; self.cells.len()];
        shifted[lines * width..].copy_from_slice(&self.cells[..(rows - lines) * width]);
        for y in 0..lines {
            let hole = self.bag.as_ref().map_or(0, |bag| bag.garbage_hole());
            for x in 0..width {
                if x != hole {
                    shifted[y * width + x] = Block::Garbage;
                }
            }
        }

        // Push the falling piece up until it clears the new rows
        let piece_at = match self.piece.as_ref() {
            Some(piece) => {
                let x = piece.point.x;
                let found = (piece.point.y.max(0)..rows as i32)
                    .map(|y| Point::new(x, y))
                    .find(|&at| self.fits(&shifted, piece, at));
                match found {
                    Some(at) => Some(at),
                    None => return false,
                }
            }
            None => None,
        };

        self.cells = shifted;
        if let (Some(piece), Some(at)) = (self.piece.as_mut(), piece_at) {
            piece.point = at;
        }
        true
    }

    /// Freeze the board after a knockout. Idempotent.
    pub fn set_game_over(&mut self) {
        if self.game_over {
            return;
        }
        self.game_over = true;
        self.combo = 0;
        self.combo_start = None;
        self.combo_end = None;
        for cell in self.cells.iter_mut() {
            *cell = cell.ghost();
        }
    }

    /// Rebuild the overlay: ghost at the resting row, then the piece itself.
    pub fn draw_pieces(&mut self) {
        if self.matrix_type != MatrixType::Standard {
            return;
        }
        self.clear_overlay();
        if self.game_over {
            return;
        }
        let Some(piece) = self.piece.clone() else {
            return;
        };

        let mut y = piece.point.y;
        while y > 0 && self.can_add_at(&piece, Point::new(piece.point.x, y - 1)) {
            y -= 1;
        }
        let _ = self.add(&piece, piece.ghost, Point::new(piece.point.x, y), true);
        let _ = self.add(&piece, piece.solid, piece.point, true);
    }

    /// Render the bag's next mino into a preview matrix
    pub fn show_next(&mut self) -> Result<(), MatrixError> {
        self.clear();
        let Some(mino) = self.bag.as_ref().and_then(|bag| bag.next()) else {
            return Ok(());
        };
        let piece = Piece::new(mino, Point::default());
        self.add(&piece, piece.solid, Point::default(), false)
    }

    /// Visible rows, top-down
    pub fn render(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for y in (0..self.height as i32).rev() {
            for x in 0..self.width as i32 {
                out.push(self.block(x, y).rune());
            }
            out.push('\n');
        }
        out
    }

    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            cells: self
                .cells
                .iter()
                .enumerate()
                .filter(|(_, b)| !b.is_empty())
                .map(|(i, b)| (i, *b))
                .collect(),
            piece: self.piece.as_ref().map(PieceSnapshot::from),
            player_name: self.player_name.clone(),
            matrix_type: self.matrix_type,
            combo: self.combo,
            lines_cleared: self.lines_cleared,
            garbage_sent: self.garbage_sent,
            garbage_received: self.garbage_received,
            speed: self.speed,
            game_over: self.game_over,
        }
    }

    /// Mirror a remote board: cells, piece, name, garbage stats and speed.
    /// A piece reaching outside the board is dropped.
    pub fn replace(&mut self, snapshot: &MatrixSnapshot) {
        self.cells.fill(Block::None);
        for (&i, &b) in &snapshot.cells {
            if let Some(cell) = self.cells.get_mut(i) {
                *cell = b;
            }
        }
        let rows = self.rows();
        self.piece = snapshot
            .piece
            .as_ref()
            .filter(|p| p.within(self.width, rows))
            .map(Piece::from);
        self.player_name = snapshot.player_name.clone();
        self.garbage_sent = snapshot.garbage_sent;
        self.garbage_received = snapshot.garbage_received;
        self.speed = snapshot.speed;
    }
}
