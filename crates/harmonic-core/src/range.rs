use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Half-open span `[start, end)` of frame indices carrying one chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChordRange {
    pub start: usize,
    pub end: usize,
}

impl ChordRange {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, frame: usize) -> bool {
        self.start <= frame && frame < self.end
    }
}

impl std::fmt::Display for ChordRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Verify that `ranges` are contiguous and cover `[0, frames)` exactly once.
pub fn check_tiling(ranges: &[ChordRange], frames: usize) -> Result<()> {
    let tiling_error = |detail: String| Error::Tiling { frames, detail };

    let mut expected_start = 0;
    for (i, range) in ranges.iter().enumerate() {
        if range.is_empty() {
            return Err(tiling_error(format!("range {i} {range} is empty")));
        }
        if range.start != expected_start {
            return Err(tiling_error(format!(
                "range {i} {range} starts at {} but previous range ended at {expected_start}",
                range.start
            )));
        }
        expected_start = range.end;
    }

    if expected_start != frames {
        return Err(tiling_error(format!("coverage ends at {expected_start}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(bounds: &[(usize, usize)]) -> Vec<ChordRange> {
        bounds
            .iter()
            .map(|&(s, e)| ChordRange { start: s, end: e })
            .collect()
    }

    #[test]
    fn empty_range_rejected() {
        assert!(ChordRange::new(3, 3).is_err());
        assert!(ChordRange::new(4, 3).is_err());
        assert_eq!(ChordRange::new(1, 4).unwrap().len(), 3);
    }

    #[test]
    fn tiling_accepts_contiguous_cover() {
        assert!(check_tiling(&ranges(&[(0, 2), (2, 3), (3, 6)]), 6).is_ok());
        assert!(check_tiling(&ranges(&[(0, 1)]), 1).is_ok());
    }

    #[test]
    fn tiling_rejects_gaps_overlaps_and_short_cover() {
        assert!(check_tiling(&ranges(&[(0, 2), (3, 6)]), 6).is_err());
        assert!(check_tiling(&ranges(&[(0, 3), (2, 6)]), 6).is_err());
        assert!(check_tiling(&ranges(&[(0, 3)]), 6).is_err());
        assert!(check_tiling(&[], 1).is_err());
    }
}
