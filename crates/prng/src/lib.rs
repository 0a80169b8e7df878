//! Splittable PRNG keys for reproducible, explicitly-threaded randomness.
//!
//! DP-SVI threads its random state through every update step as a value: a
//! key is split before use and the sibling is stored for the next call, so
//! repeated calls never replay the same noise. The key is a Threefry-2x32
//! counter-based generator, which makes splitting and fold-in cheap and
//! deterministic.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rand::{CryptoRng, RngCore};

const KEY_PARITY: u32 = 0x1BD1_1BDA;
const ROTATIONS_EVEN: [u32; 4] = [13, 15, 26, 6];
const ROTATIONS_ODD: [u32; 4] = [17, 29, 16, 24];

/// An immutable, splittable PRNG key (two 32-bit words).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrngKey {
    words: [u32; 2],
}

impl PrngKey {
    /// Derive a key from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            words: [(seed >> 32) as u32, seed as u32],
        }
    }

    /// Build a key directly from its raw words.
    pub fn from_words(hi: u32, lo: u32) -> Self {
        Self { words: [hi, lo] }
    }

    /// Split into `n` statistically independent keys.
    pub fn split(self, n: usize) -> Vec<Self> {
        (0..n)
            .map(|i| {
                let (hi, lo) = threefry2x32(self.words, [(2 * i) as u32, (2 * i + 1) as u32]);
                Self { words: [hi, lo] }
            })
            .collect()
    }

    /// Split into a pair of keys: one to consume now, one to carry forward.
    pub fn split2(self) -> (Self, Self) {
        let keys = self.split(2);
        (keys[0], keys[1])
    }

    /// Deterministically mix additional data into the key.
    pub fn fold_in(self, data: u64) -> Self {
        let (hi, lo) = threefry2x32(self.words, [(data >> 32) as u32, data as u32]);
        Self { words: [hi, lo] }
    }

    /// Turn the key into a concrete random stream.
    pub fn to_rng(self) -> KeyRng {
        KeyRng {
            key: self,
            counter: 0,
            buffer: [0; 2],
            buffered: 0,
        }
    }
}

/// A counter-mode random stream derived from a [`PrngKey`].
///
/// The stream is a pure function of the key; two streams built from equal
/// keys yield identical output.
#[derive(Clone, Debug)]
pub struct KeyRng {
    key: PrngKey,
    counter: u64,
    buffer: [u32; 2],
    buffered: usize,
}

impl RngCore for KeyRng {
    fn next_u32(&mut self) -> u32 {
        if self.buffered == 0 {
            let (y0, y1) = threefry2x32(
                self.key.words,
                [self.counter as u32, (self.counter >> 32) as u32],
            );
            self.counter = self.counter.wrapping_add(1);
            self.buffer = [y0, y1];
            self.buffered = 2;
        }
        self.buffered -= 1;
        self.buffer[self.buffered]
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.next_u32() as u64;
        let hi = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for KeyRng {}

/// Threefry-2x32 with 20 rounds.
fn threefry2x32(key: [u32; 2], input: [u32; 2]) -> (u32, u32) {
    let ks = [key[0], key[1], key[0] ^ key[1] ^ KEY_PARITY];

    let mut x0 = input[0].wrapping_add(ks[0]);
    let mut x1 = input[1].wrapping_add(ks[1]);

    for block in 0..5u32 {
        let rotations = if block % 2 == 0 {
            &ROTATIONS_EVEN
        } else {
            &ROTATIONS_ODD
        };
        for &rot in rotations {
            x0 = x0.wrapping_add(x1);
            x1 = x1.rotate_left(rot) ^ x0;
        }
        x0 = x0.wrapping_add(ks[(block as usize + 1) % 3]);
        x1 = x1
            .wrapping_add(ks[(block as usize + 2) % 3])
            .wrapping_add(block + 1);
    }

    (x0, x1)
}

/// Common imports.
pub mod prelude {
    pub use crate::{KeyRng, PrngKey};
}
