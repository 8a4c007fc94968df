//! Column option flags.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

use crate::error::ConstructionError;

/// Option bits attached to a column declaration.
///
/// Columns sharing `INDEX_n` form one composite index in declaration
/// order, columns sharing `UNIQUE_n` form one composite unique
/// constraint, and all `PRIMARY_KEY` columns form the primary key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnFlags(u64);

impl ColumnFlags {
    /// NULL is allowed.
    pub const NULLABLE: Self = Self(1 << 0);
    /// Member of the primary key.
    pub const PRIMARY_KEY: Self = Self(1 << 1);
    /// Auto-incrementing from 1.
    pub const SERIAL: Self = Self(1 << 2);
    /// Member of index tier 1.
    pub const INDEX_1: Self = Self(1 << 4);
    /// Member of index tier 2.
    pub const INDEX_2: Self = Self(1 << 5);
    /// Member of index tier 3.
    pub const INDEX_3: Self = Self(1 << 6);
    /// Member of index tier 4.
    pub const INDEX_4: Self = Self(1 << 7);
    /// All index tiers.
    pub const INDEX_MASK: Self = Self(0xF << 4);
    /// Member of unique tier 1.
    pub const UNIQUE_1: Self = Self(1 << 8);
    /// Member of unique tier 2.
    pub const UNIQUE_2: Self = Self(1 << 9);
    /// Member of unique tier 3.
    pub const UNIQUE_3: Self = Self(1 << 10);
    /// Member of unique tier 4.
    pub const UNIQUE_4: Self = Self(1 << 11);
    /// All unique tiers.
    pub const UNIQUE_MASK: Self = Self(0xF << 8);
    /// Indexes containing this column use the inverted (gin) method.
    pub const GIN: Self = Self(1 << 62);
    /// Defaults to the current timestamp.
    pub const DEFAULT_NOW: Self = Self(1 << 63);

    /// Flags that change the physical column and therefore its identity
    /// in a diff. Key, index and unique membership are diffed separately.
    pub const STRUCTURAL: Self = Self(Self::NULLABLE.0 | Self::SERIAL.0 | Self::DEFAULT_NOW.0);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Builds flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bitwise union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Index tier `n` (1 to 4).
    pub const fn index(tier: u8) -> Result<Self, ConstructionError> {
        match tier {
            1..=4 => Ok(Self(1 << (3 + tier))),
            _ => Err(ConstructionError::InvalidTier(tier)),
        }
    }

    /// Unique tier `n` (1 to 4).
    pub const fn unique(tier: u8) -> Result<Self, ConstructionError> {
        match tier {
            1..=4 => Ok(Self(1 << (7 + tier))),
            _ => Err(ConstructionError::InvalidTier(tier)),
        }
    }

    /// Index tiers this column belongs to, ascending.
    #[must_use]
    pub fn index_tiers(self) -> Vec<u8> {
        (1..=4)
            .filter(|&t| self.0 & (1 << (3 + t)) != 0)
            .collect()
    }

    /// Unique tiers this column belongs to, ascending.
    #[must_use]
    pub fn unique_tiers(self) -> Vec<u8> {
        (1..=4)
            .filter(|&t| self.0 & (1 << (7 + t)) != 0)
            .collect()
    }

    /// Only the structural bits.
    #[must_use]
    pub const fn structural(self) -> Self {
        Self(self.0 & Self::STRUCTURAL.0)
    }
}

impl BitOr for ColumnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ColumnFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ColumnFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ColumnFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for ColumnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(ColumnFlags, &str)] = &[
            (ColumnFlags::NULLABLE, "NULLABLE"),
            (ColumnFlags::PRIMARY_KEY, "PRIMARY_KEY"),
            (ColumnFlags::SERIAL, "SERIAL"),
            (ColumnFlags::INDEX_1, "INDEX_1"),
            (ColumnFlags::INDEX_2, "INDEX_2"),
            (ColumnFlags::INDEX_3, "INDEX_3"),
            (ColumnFlags::INDEX_4, "INDEX_4"),
            (ColumnFlags::UNIQUE_1, "UNIQUE_1"),
            (ColumnFlags::UNIQUE_2, "UNIQUE_2"),
            (ColumnFlags::UNIQUE_3, "UNIQUE_3"),
            (ColumnFlags::UNIQUE_4, "UNIQUE_4"),
            (ColumnFlags::GIN, "GIN"),
            (ColumnFlags::DEFAULT_NOW, "DEFAULT_NOW"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("ColumnFlags(empty)")
        } else {
            write!(f, "ColumnFlags({})", set.join(" | "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers() {
        assert_eq!(ColumnFlags::index(1), Ok(ColumnFlags::INDEX_1));
        assert_eq!(ColumnFlags::index(4), Ok(ColumnFlags::INDEX_4));
        assert_eq!(ColumnFlags::unique(2), Ok(ColumnFlags::UNIQUE_2));
        assert_eq!(ColumnFlags::index(0), Err(ConstructionError::InvalidTier(0)));
        assert_eq!(ColumnFlags::unique(5), Err(ConstructionError::InvalidTier(5)));

        let flags = ColumnFlags::INDEX_1 | ColumnFlags::INDEX_3 | ColumnFlags::UNIQUE_4;
        assert_eq!(flags.index_tiers(), vec![1, 3]);
        assert_eq!(flags.unique_tiers(), vec![4]);
    }

    #[test]
    fn masks_cover_tiers() {
        for tier in 1..=4 {
            assert!(ColumnFlags::INDEX_MASK.contains(ColumnFlags::index(tier).unwrap()));
            assert!(ColumnFlags::UNIQUE_MASK.contains(ColumnFlags::unique(tier).unwrap()));
        }
        assert!(!ColumnFlags::INDEX_MASK.intersects(ColumnFlags::UNIQUE_MASK));
    }

    #[test]
    fn structural_ignores_membership() {
        let flags = ColumnFlags::NULLABLE | ColumnFlags::INDEX_2 | ColumnFlags::PRIMARY_KEY;
        assert_eq!(flags.structural(), ColumnFlags::NULLABLE);
    }

    #[test]
    fn debug_lists_names() {
        let flags = ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL;
        assert_eq!(format!("{flags:?}"), "ColumnFlags(PRIMARY_KEY | SERIAL)");
        assert_eq!(format!("{:?}", ColumnFlags::empty()), "ColumnFlags(empty)");
    }
}
