use std::fmt;

/// A value whose similarity is measured by counting differing bits.
pub trait HammingHash: Clone + Send + Sync + 'static {
    fn hamming_distance(&self, other: &Self) -> u32;
    fn bit_count(&self) -> u32;
}

impl HammingHash for u64 {
    #[inline(always)]
    fn hamming_distance(&self, other: &Self) -> u32 {
        (*self ^ *other).count_ones()
    }

    fn bit_count(&self) -> u32 {
        64
    }
}

/// Perceptual hash of `bits` bits, stored MSB-first in 64-bit words.
/// Bit 0 of the hash is the top bit of the first word.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageHash {
    words: Box<[u64]>,
    bits: u32,
}

impl ImageHash {
    pub fn from_bits<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut words = Vec::new();
        let mut bits = 0u32;
        for (i, set) in iter.into_iter().enumerate() {
            if i % 64 == 0 {
                words.push(0u64);
            }
            if set && let Some(w) = words.last_mut() {
                *w |= 1 << (63 - (i % 64));
            }
            bits += 1;
        }
        Self { words: words.into_boxed_slice(), bits }
    }

    pub fn from_u64(value: u64) -> Self {
        Self { words: Box::new([value]), bits: 64 }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn to_hex(&self) -> String {
        let nibbles = self.bits.div_ceil(4) as usize;
        let full: String = self.words.iter().map(|w| format!("{:016x}", w)).collect();
        full[..nibbles].to_string()
    }
}

impl HammingHash for ImageHash {
    fn hamming_distance(&self, other: &Self) -> u32 {
        let common: u32 = self.words.iter().zip(other.words.iter()).map(|(a, b)| (a ^ b).count_ones()).sum();
        // Hashes of different sizes differ in every bit the shorter one lacks.
        common + self.bits.abs_diff(other.bits)
    }

    fn bit_count(&self) -> u32 {
        self.bits
    }
}

impl fmt::Debug for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHash({}:{})", self.bits, self.to_hex())
    }
}
