//! Word-based occupancy bitmap
//!
//! Shared by the cluster maps (one bit per cluster slot) and by node blocks
//! (one bit per node slot):
//! - 0 = free slot
//! - 1 = occupied slot

use crate::codec::{FieldReader, FieldWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Bitmap words (each word = 32 slots)
    words: Vec<u32>,

    /// Number of addressable slots
    len: usize,

    /// Number of clear bits below `len`
    free: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Bitmap {
            words: vec![0u32; Self::words_for(len)],
            len,
            free: len,
        }
    }

    /// Number of 32-bit words needed for `len` slots
    pub const fn words_for(len: usize) -> usize {
        (len + 31) / 32
    }

    /// Encoded size in bytes
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.free
    }

    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / 32] & (1u32 << (index % 32)) != 0
    }

    /// Set a slot's state. Returns true only if the state actually changed.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        if index >= self.len || self.get(index) == value {
            return false;
        }

        let mask = 1u32 << (index % 32);
        if value {
            self.words[index / 32] |= mask;
            self.free -= 1;
        } else {
            self.words[index / 32] &= !mask;
            self.free += 1;
        }
        true
    }

    /// First clear slot, scanning whole words before bits
    pub fn first_free(&self) -> Option<usize> {
        if self.free == 0 {
            return None;
        }

        for (word_idx, &word) in self.words.iter().enumerate() {
            if word == u32::MAX {
                continue;
            }
            let bit_idx = (!word).trailing_zeros() as usize;
            let index = word_idx * 32 + bit_idx;
            if index < self.len {
                return Some(index);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.free = self.len;
    }

    /// Iterate over occupied slot indices
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i))
    }

    pub fn encode(&self, w: &mut FieldWriter<'_>) {
        for &word in &self.words {
            w.u32(word);
        }
    }

    /// Decode words and recount the free slots (the only full scan)
    pub fn decode(&mut self, r: &mut FieldReader<'_>) {
        for word in self.words.iter_mut() {
            *word = r.u32();
        }

        // Bits beyond `len` in the last word are not slots
        let tail = self.len % 32;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u32 << tail) - 1;
            }
        }

        let used: usize = self.words.iter().map(|w| w.count_ones() as usize).sum();
        self.free = self.len - used;
    }
}
