//! Greedy line seeding
//!
//! Chains considered regions left to right into candidate lines. Each chain
//! starts at an unclaimed region and repeatedly takes the nearest region to
//! its right that sits in the chain's vertical band.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::geometry::{overlaps_any, Line, Rect};
use crate::config::policy;

/// Configuration for line seeding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// First gap probed after the chain's right edge
    pub min_gap: i32,
    /// Search horizon (and probe width) as a multiple of the average width
    pub max_gap_ratio: f32,
    /// The probe starts `avg_height / divisor` above the running average
    pub vertical_slack_divisor: i32,
    /// Chains shorter than this are not committed
    pub min_line_chars: usize,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            min_gap: policy::MIN_CHAR_GAP,
            max_gap_ratio: policy::MAX_GAP_WIDTH_RATIO,
            vertical_slack_divisor: policy::SEED_VERTICAL_SLACK_DIVISOR,
            min_line_chars: policy::MIN_LINE_CHARS,
        }
    }
}

/// Running sums over a chain's members
#[derive(Debug, Clone, Copy)]
struct ChainAverage {
    y: i32,
    w: i32,
    h: i32,
    count: i32,
}

impl ChainAverage {
    fn start(rect: &Rect) -> Self {
        Self {
            y: rect.y,
            w: rect.w,
            h: rect.h,
            count: 1,
        }
    }

    fn push(&mut self, rect: &Rect) {
        self.y += rect.y;
        self.w += rect.w;
        self.h += rect.h;
        self.count += 1;
    }

    fn rect(&self) -> Rect {
        Rect::new(0, self.y / self.count, self.w / self.count, self.h / self.count)
    }
}

/// Chains considered regions into seed lines
#[derive(Debug, Clone, Default)]
pub struct LineSeeder {
    config: SeedingConfig,
}

impl LineSeeder {
    pub fn new(config: SeedingConfig) -> Self {
        Self { config }
    }

    /// Build seed lines in the iteration order of `considered`
    pub fn seed(&self, considered: &BTreeSet<Rect>) -> Vec<Line> {
        let mut claimed: BTreeSet<Rect> = BTreeSet::new();
        let mut lines = Vec::new();

        for seed in considered {
            if overlaps_any(&claimed, seed) {
                continue;
            }
            let chain = self.chain_from(seed, considered, &claimed);
            if chain.len() >= self.config.min_line_chars {
                claimed.extend(chain.iter().copied());
                lines.push(Line::new(chain));
            }
        }

        debug!(
            "Line seeder: {} lines from {} considered regions",
            lines.len(),
            considered.len()
        );
        lines
    }

    fn chain_from(&self, seed: &Rect, considered: &BTreeSet<Rect>, claimed: &BTreeSet<Rect>) -> BTreeSet<Rect> {
        let mut chain = BTreeSet::new();
        chain.insert(*seed);
        let mut average = ChainAverage::start(seed);
        let mut x = seed.right();

        let mut gap = self.config.min_gap;
        while gap < self.max_gap(&average.rect()) {
            let probe = self.probe(x + gap, &average.rect());
            match next_in_probe(considered, &probe) {
                Some(next) if !overlaps_any(claimed, &next) => {
                    assert!(
                        !overlaps_any(&chain, &next),
                        "seed chain member {:?} overlaps chain {:?}",
                        next,
                        chain
                    );
                    chain.insert(next);
                    average.push(&next);
                    x = next.right();
                    gap = self.config.min_gap;
                }
                _ => gap += 1,
            }
        }
        chain
    }

    fn max_gap(&self, average: &Rect) -> i32 {
        (average.w as f32 * self.config.max_gap_ratio) as i32
    }

    /// Window a follow-up glyph must start at and fit inside
    fn probe(&self, x: i32, average: &Rect) -> Rect {
        let divisor = self.config.vertical_slack_divisor.max(1);
        Rect::new(
            x,
            average.y - average.h / divisor,
            (average.w as f32 * self.config.max_gap_ratio) as i32,
            (average.h as f32 * self.config.max_gap_ratio) as i32,
        )
    }
}

/// First considered region whose left edge is exactly `probe.x` and which
/// fits in the probe window
fn next_in_probe(considered: &BTreeSet<Rect>, probe: &Rect) -> Option<Rect> {
    let from = Rect::new(probe.x, i32::MIN, i32::MIN, i32::MIN);
    let to = Rect::new(probe.x + 1, i32::MIN, i32::MIN, i32::MIN);
    considered
        .range(from..to)
        .find(|r| {
            r.right() <= probe.right() && r.y >= probe.y && r.bottom() <= probe.bottom()
        })
        .copied()
}
