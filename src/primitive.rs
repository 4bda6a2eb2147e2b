//! Open-addressing `i32 -> f64` map that keeps keys and values inline in two
//! flat arrays, so a lookup never touches a per-entry allocation.

use std::mem::replace;

// Load factor 3/4.
const FILL_NUM: usize = 3;
const FILL_DEN: usize = 4;
const MIN_TABLE_LEN: usize = 2;

/// Marks an empty slot. The entry for key `0` lives outside the table.
const EMPTY: i32 = 0;

#[inline]
fn mix(key: i32) -> u32 {
    let h = (key as u32).wrapping_mul(0x9E37_79B9);
    h ^ (h >> 16)
}

/// Smallest power-of-two table that holds `expected` entries under the load factor.
fn table_len(expected: usize) -> usize {
    (expected * FILL_DEN)
        .div_ceil(FILL_NUM)
        .max(MIN_TABLE_LEN)
        .next_power_of_two()
}

fn max_fill(table_len: usize) -> usize {
    (table_len * FILL_NUM / FILL_DEN).min(table_len - 1)
}

pub struct Int2DoubleMap {
    keys: Box<[i32]>,
    values: Box<[f64]>,
    mask: usize,
    filled: usize,
    max_fill: usize,
    zero_value: Option<f64>,
}

impl Int2DoubleMap {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Preallocates a table that holds `expected` entries without rehashing.
    pub fn with_capacity(expected: usize) -> Self {
        let len = table_len(expected);
        Int2DoubleMap {
            keys: vec![EMPTY; len].into_boxed_slice(),
            values: vec![0.0; len].into_boxed_slice(),
            mask: len - 1,
            filled: 0,
            max_fill: max_fill(len),
            zero_value: None,
        }
    }

    pub fn len(&self) -> usize {
        self.filled + usize::from(self.zero_value.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of nonzero keys the current table holds before it grows.
    pub fn capacity(&self) -> usize {
        self.max_fill
    }

    #[inline]
    fn slot(&self, key: i32) -> usize {
        mix(key) as usize & self.mask
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: i32, value: f64) -> Option<f64> {
        if key == EMPTY {
            return self.zero_value.replace(value);
        }

        let mut pos = self.slot(key);
        loop {
            match self.keys[pos] {
                EMPTY => break,
                k if k == key => return Some(replace(&mut self.values[pos], value)),
                _ => pos = (pos + 1) & self.mask,
            }
        }

        self.keys[pos] = key;
        self.values[pos] = value;
        self.filled += 1;
        if self.filled > self.max_fill {
            self.rehash(self.keys.len() * 2);
        }
        None
    }

    #[inline]
    pub fn get(&self, key: i32) -> Option<f64> {
        if key == EMPTY {
            return self.zero_value;
        }

        let mut pos = self.slot(key);
        loop {
            match self.keys[pos] {
                k if k == key => return Some(self.values[pos]),
                EMPTY => return None,
                _ => pos = (pos + 1) & self.mask,
            }
        }
    }

    pub fn contains_key(&self, key: i32) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.zero_value.map(|v| (EMPTY, v)).into_iter().chain(
            self.keys
                .iter()
                .zip(self.values.iter())
                .filter(|(k, _)| **k != EMPTY)
                .map(|(k, v)| (*k, *v)),
        )
    }

    fn rehash(&mut self, new_len: usize) {
        log::trace!("rehashing primitive map from {} to {new_len} slots", self.keys.len());

        let old_keys = replace(&mut self.keys, vec![EMPTY; new_len].into_boxed_slice());
        let old_values = replace(&mut self.values, vec![0.0; new_len].into_boxed_slice());
        self.mask = new_len - 1;
        self.max_fill = max_fill(new_len);

        for (key, value) in old_keys.iter().zip(old_values.iter()) {
            if *key == EMPTY {
                continue;
            }
            let mut pos = self.slot(*key);
            while self.keys[pos] != EMPTY {
                pos = (pos + 1) & self.mask;
            }
            self.keys[pos] = *key;
            self.values[pos] = *value;
        }
    }
}

impl Default for Int2DoubleMap {
    fn default() -> Self {
        Self::new()
    }
}
