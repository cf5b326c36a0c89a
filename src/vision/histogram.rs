//! Glyph size histogram
//!
//! In uniformly typeset text the modal glyph size dominates. Boxes whose
//! `(width, height)` bucket is far less frequent than the mode are dropped
//! without looking at their pixels.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::geometry::Rect;
use crate::config::policy;

/// Configuration for the size filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Fraction of the dominant bucket count a bucket needs to be kept
    pub consider_ratio: f32,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            consider_ratio: policy::HISTOGRAM_CONSIDER_RATIO,
        }
    }
}

/// Occurrence count per `(width, height)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeHistogram {
    buckets: BTreeMap<(i32, i32), usize>,
}

impl SizeHistogram {
    pub fn from_regions<'a>(regions: impl IntoIterator<Item = &'a Rect>) -> Self {
        let mut buckets = BTreeMap::new();
        for rect in regions {
            *buckets.entry((rect.w, rect.h)).or_insert(0) += 1;
        }
        Self { buckets }
    }

    pub fn buckets(&self) -> &BTreeMap<(i32, i32), usize> {
        &self.buckets
    }

    pub fn count(&self, width: i32, height: i32) -> usize {
        self.buckets.get(&(width, height)).copied().unwrap_or(0)
    }

    /// Most frequent size and its count; ties go to the smallest size
    pub fn dominant(&self) -> Option<((i32, i32), usize)> {
        let mut best: Option<((i32, i32), usize)> = None;
        for (&size, &count) in &self.buckets {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((size, count));
            }
        }
        best
    }

    /// Minimum bucket count to be considered: `ceil(ratio * max)`
    pub fn consider_min(&self, ratio: f32) -> usize {
        self.dominant()
            .map(|(_, max)| (ratio as f64 * max as f64).ceil() as usize)
            .unwrap_or(0)
    }

    /// Regions whose size bucket is common enough
    pub fn considered(&self, regions: &BTreeSet<Rect>, ratio: f32) -> BTreeSet<Rect> {
        let min = self.consider_min(ratio);
        let kept: BTreeSet<Rect> = regions
            .iter()
            .filter(|r| self.count(r.w, r.h) >= min)
            .copied()
            .collect();
        if let Some(((w, h), max)) = self.dominant() {
            debug!(
                "Size histogram: dominant {}x{} x{}, keep buckets >= {}, {} of {} regions considered",
                w,
                h,
                max,
                min,
                kept.len(),
                regions.len()
            );
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rects(sizes: &[(i32, i32)]) -> BTreeSet<Rect> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| Rect::new(i as i32 * 40, 0, w, h))
            .collect()
    }

    #[test]
    fn test_dominant_bucket() {
        let regions = rects(&[(10, 16), (10, 16), (10, 16), (9, 16), (30, 30)]);
        let histogram = SizeHistogram::from_regions(&regions);
        assert_eq!(histogram.dominant(), Some(((10, 16), 3)));
        assert_eq!(histogram.count(9, 16), 1);
    }

    #[test]
    fn test_dominant_tie_prefers_smallest_size() {
        let regions = rects(&[(12, 12), (12, 12), (10, 20), (10, 20)]);
        let histogram = SizeHistogram::from_regions(&regions);
        assert_eq!(histogram.dominant(), Some(((10, 20), 2)));
    }

    #[test]
    fn test_consider_min_rounds_up() {
        let regions = rects(&[(10, 16); 5]);
        let histogram = SizeHistogram::from_regions(&regions);
        // 0.618 * 5 = 3.09
        assert_eq!(histogram.consider_min(0.618), 4);

        let regions = rects(&[(10, 16); 3]);
        assert_eq!(SizeHistogram::from_regions(&regions).consider_min(0.618), 2);
    }

    #[test]
    fn test_considered_filters_rare_sizes() {
        let regions = rects(&[(10, 16), (10, 16), (10, 16), (10, 16), (11, 16), (11, 16), (11, 16), (30, 8)]);
        let histogram = SizeHistogram::from_regions(&regions);
        let kept = histogram.considered(&regions, 0.618);

        // max 4 -> min 3: both 10x16 and 11x16 buckets survive
        assert_eq!(kept.len(), 7);
        assert!(kept.iter().all(|r| r.h == 16));
    }

    #[test]
    fn test_empty_histogram() {
        let histogram = SizeHistogram::from_regions(&BTreeSet::new());
        assert_eq!(histogram.dominant(), None);
        assert!(histogram.considered(&BTreeSet::new(), 0.618).is_empty());
    }
}
