use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;

/// Fixed-width bit-packed integer array (LSB-first, little-endian words).
///
/// Element `i` occupies bits `[i*w, (i+1)*w)` of the byte buffer. The buffer
/// is sized `(len-1)*w/8 + 8` bytes so every element can be fetched with one
/// unaligned 8-byte load. Storage is generic so the same reader works over a
/// heap buffer or a memory map.
pub struct PackedArray<B = Vec<u8>> {
    word_length: u32,
    bit_rec_mask: u64,
    length: usize,
    data: B,
}

/// Bytes needed to hold `length` elements of `word_length` bits.
pub fn packed_byte_len(word_length: u32, length: usize) -> usize {
    if length == 0 {
        0
    } else {
        (length - 1) * word_length as usize / 8 + 8
    }
}

fn mask_for(word_length: u32) -> u64 {
    if word_length == 64 {
        u64::MAX
    } else {
        (1u64 << word_length) - 1
    }
}

impl PackedArray<Vec<u8>> {
    /// Zero-filled array of `length` elements.
    pub fn new(word_length: u32, length: usize) -> Self {
        assert!(word_length > 0 && word_length <= 57);
        Self {
            word_length,
            bit_rec_mask: mask_for(word_length),
            length,
            data: vec![0u8; packed_byte_len(word_length, length)],
        }
    }

    /// Write `value` (masked to the word width) at `index`.
    pub fn write(&mut self, index: usize, value: u64) {
        assert!(index < self.length);

        let b = index * self.word_length as usize;
        let byte_offset = b / 8;
        let bit_shift = (b % 8) as u32;

        let slot = &mut self.data[byte_offset..byte_offset + 8];
        let mask = self.bit_rec_mask << bit_shift;
        let word = LittleEndian::read_u64(slot);
        let word = (word & !mask) | ((value & self.bit_rec_mask) << bit_shift);
        LittleEndian::write_u64(slot, word);
    }

    /// Swap the storage for any other byte container.
    pub fn into_storage<S: From<Vec<u8>> + AsRef<[u8]>>(self) -> PackedArray<S> {
        PackedArray {
            word_length: self.word_length,
            bit_rec_mask: self.bit_rec_mask,
            length: self.length,
            data: S::from(self.data),
        }
    }
}

impl<B: AsRef<[u8]>> PackedArray<B> {
    /// Wrap an existing byte buffer. Fails if the buffer is too short for
    /// `length` elements.
    pub fn from_bytes(word_length: u32, length: usize, data: B) -> Result<Self, Error> {
        if word_length == 0 || word_length > 57 {
            return Err(Error::Index(format!(
                "unsupported packed word length {word_length}"
            )));
        }
        let need = packed_byte_len(word_length, length);
        if data.as_ref().len() < need {
            return Err(Error::Index(format!(
                "packed array truncated: {} bytes, need {} for {} words of {} bits",
                data.as_ref().len(),
                need,
                length,
                word_length
            )));
        }
        Ok(Self {
            word_length,
            bit_rec_mask: mask_for(word_length),
            length,
            data,
        })
    }

    /// Read the element at `index`.
    #[inline]
    pub fn read(&self, index: usize) -> u64 {
        debug_assert!(index < self.length);
        let b = index * self.word_length as usize;
        let byte_offset = b / 8;
        let word = LittleEndian::read_u64(&self.data.as_ref()[byte_offset..byte_offset + 8]);
        (word >> (b % 8)) & self.bit_rec_mask
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn word_length(&self) -> u32 {
        self.word_length
    }

    /// Raw packed bytes, as written to disk.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_byte() {
        let mut arr = PackedArray::new(5, 10);

        arr.write(0, 31);
        arr.write(1, 0);
        arr.write(2, 17);

        assert_eq!(arr.read(0), 31);
        assert_eq!(arr.read(1), 0);
        assert_eq!(arr.read(2), 17);
    }

    #[test]
    fn cross_byte_boundary_keeps_neighbours() {
        // 33 bits: the SA width for a genome under 4 Gb
        let mut arr = PackedArray::new(33, 100);
        let vals = [0x1_FFFF_FFFFu64, 0x1_0000_0000, 0x0_FFFF_FFFF, 0, 12_345_678];
        for (i, &v) in vals.iter().enumerate() {
            arr.write(i, v);
        }
        // overwrite the middle one; its neighbours must not move
        arr.write(2, 7);
        assert_eq!(arr.read(0), vals[0]);
        assert_eq!(arr.read(1), vals[1]);
        assert_eq!(arr.read(2), 7);
        assert_eq!(arr.read(3), vals[3]);
        assert_eq!(arr.read(4), vals[4]);
    }

    #[test]
    fn masking() {
        let mut arr = PackedArray::new(10, 5);
        arr.write(0, 0xFFFF);
        assert_eq!(arr.read(0), 0x3FF);
        assert_eq!(arr.read(1), 0);
    }

    #[test]
    fn byte_length_formula() {
        assert_eq!(packed_byte_len(33, 0), 0);
        assert_eq!(packed_byte_len(33, 1), 8);
        assert_eq!(packed_byte_len(33, 100), 99 * 33 / 8 + 8);
        assert_eq!(PackedArray::new(7, 1000).as_bytes().len(), 999 * 7 / 8 + 8);
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        let arr = PackedArray::new(35, 20);
        let bytes = arr.as_bytes().to_vec();
        let short = bytes[..bytes.len() - 1].to_vec();
        assert!(PackedArray::from_bytes(35, 20, short).is_err());

        let ok = PackedArray::from_bytes(35, 20, bytes).unwrap();
        assert_eq!(ok.len(), 20);
    }

    #[test]
    fn storage_swap_preserves_contents() {
        let mut arr = PackedArray::new(7, 300);
        for i in 0..300 {
            arr.write(i, (i % 128) as u64);
        }
        let shared: PackedArray<crate::index::mmap::ByteSource> = arr.into_storage();
        for i in 0..300 {
            assert_eq!(shared.read(i), (i % 128) as u64);
        }
    }
}
