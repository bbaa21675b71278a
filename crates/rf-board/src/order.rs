//! Explicit reel/cell ordering for staggered presentation

use serde::{Deserialize, Serialize};

/// Order in which reels are visited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReelDirection {
    /// Ascending reel index
    #[default]
    LeftToRight,
    /// Descending reel index
    RightToLeft,
}

impl ReelDirection {
    /// Key that sorts reels in this direction
    pub fn sort_key(&self, reel: usize) -> i64 {
        match self {
            Self::LeftToRight => reel as i64,
            Self::RightToLeft => -(reel as i64),
        }
    }
}

/// Order in which cells of one reel are visited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellDirection {
    /// As declared by the mutation
    #[default]
    Declared,
    /// Ascending position
    Ascending,
    /// Descending position
    Descending,
}

impl CellDirection {
    /// Reorder positions in place (stable for `Declared`)
    pub fn arrange(&self, positions: &mut [usize]) {
        match self {
            Self::Declared => {}
            Self::Ascending => positions.sort_unstable(),
            Self::Descending => positions.sort_unstable_by(|a, b| b.cmp(a)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reel_direction() {
        assert!(ReelDirection::LeftToRight.sort_key(1) < ReelDirection::LeftToRight.sort_key(4));
        assert!(ReelDirection::RightToLeft.sort_key(4) < ReelDirection::RightToLeft.sort_key(1));
    }

    #[test]
    fn test_cell_direction() {
        let mut positions = vec![1, 2, 0];
        CellDirection::Declared.arrange(&mut positions);
        assert_eq!(positions, vec![1, 2, 0]);
        CellDirection::Descending.arrange(&mut positions);
        assert_eq!(positions, vec![2, 1, 0]);
        CellDirection::Ascending.arrange(&mut positions);
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
