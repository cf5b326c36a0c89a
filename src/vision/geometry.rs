//! Rectangle and text line types shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Integer axis-aligned box
///
/// Field order matters: the derived `Ord` sorts by `(x, y, w, h)`, which is the
/// iteration order the seeding and growth stages rely on for neighbour lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Exclusive right edge
    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Half-open intersection test on both axes
    pub fn overlaps(&self, other: &Rect) -> bool {
        other.x < self.right()
            && self.x < other.right()
            && other.y < self.bottom()
            && self.y < other.bottom()
    }

    /// Vertical-band intersection only
    pub fn overlaps_rows(&self, other: &Rect) -> bool {
        other.y < self.bottom() && self.y < other.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    /// Intersection with `bounds`, or `None` when nothing is left
    pub fn clamp_to(&self, bounds: &Rect) -> Option<Rect> {
        let x = self.x.max(bounds.x);
        let y = self.y.max(bounds.y);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }

    /// Tight box around every rect in `rects`
    pub fn envelope<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        let mut iter = rects.into_iter();
        let first = iter.next()?;
        let (mut left, mut top, mut right, mut bottom) =
            (first.x, first.y, first.right(), first.bottom());
        for rect in iter {
            left = left.min(rect.x);
            top = top.min(rect.y);
            right = right.max(rect.right());
            bottom = bottom.max(rect.bottom());
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }
}

/// `true` when `rect` intersects any member of `set`
pub fn overlaps_any(set: &BTreeSet<Rect>, rect: &Rect) -> bool {
    set.iter().any(|r| r.overlaps(rect))
}

/// A detected text line: unique, pairwise disjoint glyph boxes plus their envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    chars: BTreeSet<Rect>,
    bounding_rect: Rect,
    /// Semantic form field assigned by a downstream consumer
    pub field: Option<String>,
}

impl Line {
    /// Build a line from a non-empty set of disjoint boxes.
    ///
    /// Panics when the set is empty or two members overlap.
    pub fn new(chars: BTreeSet<Rect>) -> Self {
        assert_disjoint(&chars);
        let bounding_rect = Rect::envelope(&chars).expect("a line needs at least one char");
        Self {
            chars,
            bounding_rect,
            field: None,
        }
    }

    pub fn chars(&self) -> &BTreeSet<Rect> {
        &self.chars
    }

    pub fn bounding_rect(&self) -> Rect {
        self.bounding_rect
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn first_char(&self) -> Rect {
        *self.chars.first().expect("line is never empty")
    }

    pub fn last_char(&self) -> Rect {
        *self.chars.last().expect("line is never empty")
    }

    /// Mean y, width and height of the chars; `x` is left at zero
    pub fn average_rect(&self) -> Rect {
        let count = self.chars.len() as i32;
        let (y, w, h) = self
            .chars
            .iter()
            .fold((0, 0, 0), |(y, w, h), r| (y + r.y, w + r.w, h + r.h));
        Rect::new(0, y / count, w / count, h / count)
    }

    /// Insert a glyph box. Panics if it intersects an existing member.
    pub fn insert_char(&mut self, rect: Rect) {
        assert!(!rect.is_empty(), "refusing to insert empty char {:?}", rect);
        if let Some(existing) = self.chars.iter().find(|r| r.overlaps(&rect)) {
            panic!(
                "char {:?} overlaps {:?} in line {:?}",
                rect, existing, self.bounding_rect
            );
        }
        self.chars.insert(rect);
        self.recompute_bounding_rect();
    }

    /// Swap the whole char set, e.g. after refinement
    pub fn replace_chars(&mut self, chars: BTreeSet<Rect>) {
        assert_disjoint(&chars);
        assert!(!chars.is_empty(), "a line needs at least one char");
        self.chars = chars;
        self.recompute_bounding_rect();
    }

    fn recompute_bounding_rect(&mut self) {
        if let Some(rect) = Rect::envelope(&self.chars) {
            self.bounding_rect = rect;
        }
    }
}

fn assert_disjoint(chars: &BTreeSet<Rect>) {
    let members: Vec<&Rect> = chars.iter().collect();
    for (i, a) in members.iter().enumerate() {
        for b in &members[i + 1..] {
            assert!(!a.overlaps(b), "line members {:?} and {:?} overlap", a, b);
        }
    }
}
