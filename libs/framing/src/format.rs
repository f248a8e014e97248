/// Number of preamble bytes in front of every frame.
pub const PREAMBLE_LEN: usize = 3;

/// Layout constants shared by both directions of the link.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameFormat {
    pub preamble: [u8; PREAMBLE_LEN],
    /// Shortest accepted value of the length byte.
    pub min_len: u8,
}

impl FrameFormat {
    pub const DEFAULT: Self = Self {
        preamble: [0x03, 0xAF, 0xEF],
        // preamble, length, destination, source, type and checksum
        min_len: 8,
    };

    /// XOR of the first `count` preamble bytes.
    #[must_use]
    pub fn preamble_checksum(&self, count: usize) -> u8 {
        self.preamble[..count].iter().fold(0, |acc, byte| acc ^ byte)
    }

    /// Length of the longest preamble prefix the stream ends with after `byte` followed the
    /// first `matched` preamble bytes.
    ///
    /// A byte that breaks a partial match can still start (or continue) a shorter one, so the
    /// candidates are tried from the longest down.
    #[must_use]
    pub fn advance(&self, matched: usize, byte: u8) -> usize {
        let matched = matched.min(PREAMBLE_LEN - 1);
        (1..=matched + 1)
            .rev()
            .find(|&len| {
                self.preamble[len - 1] == byte
                    && self.preamble[..len - 1] == self.preamble[matched + 1 - len..matched]
            })
            .unwrap_or(0)
    }

    /// Total frame length for a buffer holding the length byte and `payload` further bytes.
    #[must_use]
    pub const fn frame_len(payload: usize) -> usize {
        PREAMBLE_LEN + 1 + payload + 1
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::DEFAULT
    }
}
