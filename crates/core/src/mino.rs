//! Mino module - polyomino shapes and canonicalization
//!
//! A [`Mino`] is an ordered set of unique lattice points. Two minos describe
//! the same piece when their canonical forms match: the canonical form is the
//! smallest string among the four rotations (each translated to the origin),
//! rotated so its flattest side rests on row 0.

use std::fmt;

use crate::types::Point;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Mino(Vec<Point>);

impl Mino {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    pub fn from_coords(coords: &[(i32, i32)]) -> Self {
        Self(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.0.contains(&p)
    }

    pub fn push(&mut self, p: Point) {
        self.0.push(p);
    }

    fn map(&self, f: impl Fn(Point) -> Point) -> Self {
        Self(self.0.iter().copied().map(f).collect())
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        self.map(|p| p.offset(dx, dy))
    }

    /// Bounding box as (min, max) corners
    fn bounds(&self) -> (Point, Point) {
        let mut min = Point::new(i32::MAX, i32::MAX);
        let mut max = Point::new(i32::MIN, i32::MIN);
        for p in &self.0 {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Width and height of the bounding box
    pub fn size(&self) -> (i32, i32) {
        if self.0.is_empty() {
            return (0, 0);
        }
        let (min, max) = self.bounds();
        (max.x - min.x + 1, max.y - min.y + 1)
    }

    pub fn width(&self) -> i32 {
        self.size().0
    }

    pub fn height(&self) -> i32 {
        self.size().1
    }

    /// Translate so the minimum x and y become 0
    pub fn origin(&self) -> Self {
        if self.0.is_empty() {
            return self.clone();
        }
        let (min, _) = self.bounds();
        self.translate(-min.x, -min.y)
    }

    /// The 90, 180 and 270 degree rotations
    pub fn variations(&self) -> [Mino; 3] {
        [
            self.map(Point::rotate90),
            self.map(Point::rotate180),
            self.map(Point::rotate270),
        ]
    }

    /// Rotate so the side holding the most cells rests on row 0.
    pub fn flatten(&self) -> Self {
        let (w, h) = self.size();
        let (mut top, mut bottom, mut left, mut right) = (0, 0, 0, 0);
        for p in &self.0 {
            if p.y == 0 {
                bottom += 1;
            } else if p.y == h - 1 {
                top += 1;
            }
            if p.x == 0 {
                left += 1;
            } else if p.x == w - 1 {
                right += 1;
            }
        }

        let mut flattest = bottom;
        let mut rotate: Option<fn(Point) -> Point> = None;
        if left > flattest {
            flattest = left;
            rotate = Some(Point::rotate270);
        }
        if top > flattest {
            flattest = top;
            rotate = Some(Point::rotate180);
        }
        if right > flattest {
            rotate = Some(Point::rotate90);
        }

        match rotate {
            Some(f) => self.map(f),
            None => self.clone(),
        }
    }

    pub fn canonical(&self) -> Self {
        let mut best = self.origin();
        let mut best_str = best.to_string();
        for v in self.variations() {
            let v = v.origin();
            let s = v.to_string();
            if s < best_str {
                best_str = s;
                best = v;
            }
        }
        best.flatten().origin()
    }

    /// Neighbourhood cells not already part of the mino, duplicates included
    pub fn new_points(&self) -> Vec<Point> {
        let mut out = Vec::new();
        for p in &self.0 {
            for n in p.neighborhood() {
                if !self.contains(n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Every canonical mino reachable by growing one cell
    pub fn new_minos(&self) -> Vec<Mino> {
        self.new_points()
            .into_iter()
            .map(|p| {
                let mut grown = self.clone();
                grown.push(p);
                grown.canonical()
            })
            .collect()
    }

    /// Text render, rows top-down, `X` for cells
    pub fn render(&self) -> String {
        let origin = self.origin();
        let (w, h) = origin.size();
        let mut out = String::new();
        for y in (0..h).rev() {
            let row: String = (0..w)
                .map(|x| if origin.contains(Point::new(x, y)) { 'X' } else { ' ' })
                .collect();
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Mino {
    /// Points sorted by (y, x), formatted as `(x,y),(x,y)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted = self.0.clone();
        sorted.sort_by_key(|p| (p.y, p.x));
        for (i, p) in sorted.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

impl From<&[Point]> for Mino {
    fn from(points: &[Point]) -> Self {
        Self(points.to_vec())
    }
}

impl serde::Serialize for Mino {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Mino {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<Point>::deserialize(deserializer).map(Mino)
    }
}

macro_rules! shape {
    ($($x:expr, $y:expr);+ $(;)?) => {
        &[$(Point::new($x, $y)),+]
    };
}

pub const MONOMINO: &[Point] = shape![0, 0];

pub const DOMINO: &[Point] = shape![0, 0; 1, 0];

pub const TROMINO_I: &[Point] = shape![0, 0; 1, 0; 2, 0];
pub const TROMINO_L: &[Point] = shape![0, 0; 1, 0; 0, 1];

pub const TETROMINO_I: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0];
pub const TETROMINO_O: &[Point] = shape![0, 0; 1, 0; 0, 1; 1, 1];
pub const TETROMINO_T: &[Point] = shape![0, 0; 1, 0; 2, 0; 1, 1];
pub const TETROMINO_S: &[Point] = shape![0, 0; 1, 0; 1, 1; 2, 1];
pub const TETROMINO_Z: &[Point] = shape![1, 0; 2, 0; 0, 1; 1, 1];
pub const TETROMINO_J: &[Point] = shape![0, 0; 1, 0; 2, 0; 0, 1];
pub const TETROMINO_L: &[Point] = shape![0, 0; 1, 0; 2, 0; 2, 1];

pub const PENTOMINO_F: &[Point] = shape![0, 0; 1, 0; 1, 1; 2, 1; 1, 2];
pub const PENTOMINO_E: &[Point] = shape![1, 0; 2, 0; 0, 1; 1, 1; 1, 2];
pub const PENTOMINO_J: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0; 0, 1];
pub const PENTOMINO_L: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0; 3, 1];
pub const PENTOMINO_P: &[Point] = shape![0, 0; 1, 0; 2, 0; 0, 1; 1, 1];
pub const PENTOMINO_Z: &[Point] = shape![1, 0; 2, 0; 1, 1; 0, 2; 1, 2];
pub const PENTOMINO_I: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0; 4, 0];
pub const PENTOMINO_X: &[Point] = shape![1, 0; 0, 1; 1, 1; 2, 1; 1, 2];
pub const PENTOMINO_V: &[Point] = shape![0, 0; 1, 0; 2, 0; 0, 1; 0, 2];
pub const PENTOMINO_B: &[Point] = shape![0, 0; 1, 0; 2, 0; 1, 1; 2, 1];
pub const PENTOMINO_N: &[Point] = shape![1, 0; 2, 0; 3, 0; 0, 1; 1, 1];
pub const PENTOMINO_G: &[Point] = shape![0, 0; 1, 0; 2, 0; 2, 1; 3, 1];
pub const PENTOMINO_S: &[Point] = shape![0, 0; 1, 0; 1, 1; 1, 2; 2, 2];
pub const PENTOMINO_T: &[Point] = shape![0, 0; 1, 0; 2, 0; 1, 1; 1, 2];
pub const PENTOMINO_U: &[Point] = shape![0, 0; 1, 0; 2, 0; 0, 1; 2, 1];
pub const PENTOMINO_W: &[Point] = shape![1, 0; 2, 0; 0, 1; 1, 1; 0, 2];
pub const PENTOMINO_Y: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0; 2, 1];
pub const PENTOMINO_R: &[Point] = shape![0, 0; 1, 0; 2, 0; 3, 0; 1, 1];
