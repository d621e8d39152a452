//! The embedded bootcode image and its integrity checksum.
//!
//! The image is the pre-built patch the loader streams into the control
//! core's instruction memory before releasing it from reset. It is opaque
//! here; the build that produces it owns its contents.

use static_assertions::const_assert;

const BOOTCODE_WORDS: usize = 64;
const_assert!(BOOTCODE_WORDS > 0);

static BOOTCODE: [u32; BOOTCODE_WORDS] = [
    0x00000084, 0x80030000, 0x00000000, 0x0000F24C,
    0x1070FDB4, 0x230A0186, 0x78E078E0, 0x34F09F3F,
    0x202628CD, 0x5B5FEB0F, 0xD56AD0C0, 0x2644E754,
    0x78E078E0, 0x55D5D14F, 0x78E078E0, 0x9E4DDED3,
    0x1308C5C4, 0x2B6EA9DB, 0xA7D8CA29, 0x78E078E0,
    0x2020B89C, 0x78E078E0, 0x80030180, 0x7D800AE6,
    0x7EE0F280, 0x230A2B4F, 0xF0627C8D, 0x78E078E0,
    0xA4FD1D27, 0x641C8296, 0x76586A7E, 0xF6913363,
    0x78E078E0, 0x5B21AD0D, 0x78E078E0, 0x9A9694E5,
    0x1BAE336B, 0x0DDB59B5, 0x78E078E0, 0x78E078E0,
    0xF1892A69, 0x2644BA43, 0x80030180, 0xBCC67BA8,
    0x78E078E0, 0x80030110, 0xD1E79208, 0x80030110,
    0xEFA7B6C1, 0x80030100, 0xFC5C608E, 0xD5B3883E,
    0x2663BA21, 0x045A56AD, 0x78E078E0, 0x34B50B3C,
    0x12005FD2, 0x78E078E0, 0x78E078E0, 0x2663C8CF,
    0x7EE07EE0, 0x00000000, 0x0001F4A2, 0xC0DEF00D,
];

/// The embedded image as aligned words, low address first.
pub fn bootcode() -> &'static [u32] {
    &BOOTCODE
}

/// Number of 32-bit words in the embedded image. The byte length is
/// four times this and always a positive multiple of four.
pub fn bootcode_len() -> usize {
    BOOTCODE_WORDS
}

/// Boot-filesystem flavor checksum: the wrapping sum of little-endian
/// 32-bit words. Empty input sums to zero.
///
/// # Panics
///
/// Panics if `data` is not a multiple of four bytes long; partial words
/// have no defined checksum.
pub fn checksum(data: &[u8]) -> u32 {
    assert!(
        data.len() % 4 == 0,
        "checksum input of {} bytes is not word aligned",
        data.len()
    );
    data.chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0u32, u32::wrapping_add)
}

/// [`checksum`] over words already in host order.
pub fn checksum_words(words: &[u32]) -> u32 {
    words.iter().fold(0u32, |sum, &word| sum.wrapping_add(word))
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    #[test_case(&[], 0x0000_0000 ; "empty input")]
    #[test_case(&[0x73, 0x73, 0x42, 0x42], 0x4242_7373 ; "one word is itself")]
    #[test_case(&[0x73, 0x73, 0x42, 0x42, 0x37, 0x37, 0x24, 0x24], 0x6666_AAAA ; "two words sum")]
    fn checksum_vectors(data: &[u8], expected: u32) {
        assert_eq!(checksum(data), expected);
    }

    #[test]
    fn checksum_wraps_instead_of_overflowing() {
        assert_eq!(checksum_words(&[u32::MAX, 2]), 1);
    }

    #[test]
    fn word_and_byte_flavors_agree() {
        let words: [u32; 3] = [0x1234_5678, 0x9ABC_DEF0, 0x0BAD_F00D];
        let mut bytes = Vec::new();
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(checksum(&bytes), checksum_words(&words));
    }

    #[test]
    fn embedded_image_is_word_aligned_and_nonempty() {
        assert_eq!(bootcode().len(), bootcode_len());
        assert!(bootcode_len() > 0);
    }

    #[test]
    #[should_panic(expected = "not word aligned")]
    fn partial_words_are_rejected() {
        checksum(&[1, 2, 3]);
    }
}
