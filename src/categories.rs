//! Categories
//!
//! Small owned bitmask holding the category codes a categorical split sends
//! to the left child.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    bits: Vec<u64>,
}

impl CategorySet {
    pub fn new() -> Self {
        CategorySet { bits: Vec::new() }
    }

    pub fn insert(&mut self, code: u32) {
        let (word, bit) = (code as usize / 64, code as usize % 64);
        if self.bits.len() <= word {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1 << bit;
    }

    #[inline]
    pub fn contains(&self, code: u32) -> bool {
        let (word, bit) = (code as usize / 64, code as usize % 64);
        match self.bits.get(word) {
            Some(w) => (w >> bit) & 1 == 1,
            None => false,
        }
    }

    /// Codes in the set, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter().enumerate().flat_map(|(i, w)| {
            (0..64u32)
                .filter(move |b| (w >> b) & 1 == 1)
                .map(move |b| i as u32 * 64 + b)
        })
    }
}

impl FromIterator<u32> for CategorySet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = CategorySet::new();
        for c in iter {
            set.insert(c);
        }
        set
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let codes: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", codes.join(","))
    }
}
