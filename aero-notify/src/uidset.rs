use std::ops::RangeInclusive;

/// Identifiers assigned by the host to the mails saved in a transaction.
///
/// Stored as sorted, non overlapping, non adjacent inclusive ranges so a
/// sparse set like `1:3,7,9:12` stays small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidSet {
    ranges: Vec<(u32, u32)>,
}

impl UidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uid: u32) {
        self.insert_range(uid..=uid)
    }

    pub fn insert_range(&mut self, range: RangeInclusive<u32>) {
        let (mut start, mut end) = range.into_inner();
        if start > end {
            return;
        }

        // Absorb every range overlapping or touching [start, end]
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for &(s, e) in self.ranges.iter() {
            if e.saturating_add(1) < start {
                merged.push((s, e));
            } else if end.saturating_add(1) < s {
                if !placed {
                    merged.push((start, end));
                    placed = true;
                }
                merged.push((s, e));
            } else {
                start = start.min(s);
                end = end.max(e);
            }
        }
        if !placed {
            merged.push((start, end));
        }
        self.ranges = merged;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|(s, e)| (e - s) as usize + 1)
            .sum()
    }

    /// The `n`-th smallest identifier, starting at 0.
    pub fn nth(&self, mut n: usize) -> Option<u32> {
        for &(s, e) in self.ranges.iter() {
            let width = (e - s) as usize + 1;
            if n < width {
                return Some(s + n as u32);
            }
            n -= width;
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(s, e)| s..=e)
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}

impl FromIterator<u32> for UidSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = Self::new();
        for uid in iter {
            set.insert(uid);
        }
        set
    }
}

impl FromIterator<RangeInclusive<u32>> for UidSet {
    fn from_iter<I: IntoIterator<Item = RangeInclusive<u32>>>(iter: I) -> Self {
        let mut set = Self::new();
        for range in iter {
            set.insert_range(range);
        }
        set
    }
}
