//! Partition variables of an if/then split.
//!
//! With `X` the if-part predicate and `Y` the then-part predicate, every rule
//! splits the table into the eight named quantities below. Metrics only ever
//! ask for a subset, so requests are expressed as a [`PartitionSet`] bitmask and
//! counts are stored in a fixed-index array rather than a map.
//!
//! ## Invariants
//!
//! - `|X| = |X∧Y| + |X∧¬Y|` and `N = |X| + |¬X|` for any table and split; both
//!   follow from computing every quantity from the same two boolean masks.

use std::fmt;

/// One of the eight row-set quantities of an if/then split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    /// Row count.
    N,
    X,
    NotX,
    Y,
    NotY,
    XY,
    XNotY,
    NotXNotY,
}

pub const PARTITION_COUNT: usize = 8;

impl Partition {
    pub const ALL: [Partition; PARTITION_COUNT] = [
        Partition::N,
        Partition::X,
        Partition::NotX,
        Partition::Y,
        Partition::NotY,
        Partition::XY,
        Partition::XNotY,
        Partition::NotXNotY,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Partition::N => "N",
            Partition::X => "X",
            Partition::NotX => "¬X",
            Partition::Y => "Y",
            Partition::NotY => "¬Y",
            Partition::XY => "X∧Y",
            Partition::XNotY => "X∧¬Y",
            Partition::NotXNotY => "¬X∧¬Y",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }

    pub fn flag(self) -> PartitionSet {
        PartitionSet::from_bits_truncate(1 << self.slot())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// A set of partition variables.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionSet: u8 {
        const N           = 1 << 0;
        const X           = 1 << 1;
        const NOT_X       = 1 << 2;
        const Y           = 1 << 3;
        const NOT_Y       = 1 << 4;
        const X_Y         = 1 << 5;
        const X_NOT_Y     = 1 << 6;
        const NOT_X_NOT_Y = 1 << 7;
    }
}

impl PartitionSet {
    pub fn partitions(self) -> impl Iterator<Item = Partition> {
        Partition::ALL.into_iter().filter(move |p| self.contains(p.flag()))
    }
}

/// Counts per partition variable; `None` when not requested or undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionCounts {
    slots: [Option<usize>; PARTITION_COUNT],
}

impl PartitionCounts {
    pub fn get(&self, p: Partition) -> Option<usize> {
        self.slots[p.slot()]
    }

    pub fn set(&mut self, p: Partition, count: Option<usize>) {
        self.slots[p.slot()] = count;
    }

    pub fn with(mut self, p: Partition, count: usize) -> Self {
        self.set(p, Some(count));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Partition, usize)> + '_ {
        Partition::ALL.into_iter().filter_map(|p| self.get(p).map(|c| (p, c)))
    }
}
