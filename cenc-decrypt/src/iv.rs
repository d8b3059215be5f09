//! Running IV and block offset across the subsamples of one packet.

use crate::{
    Error, Result,
    scheme::{EncryptionPattern, ProtectionScheme},
};

pub const AES_BLOCK_SIZE: usize = 16;

/// IV and position inside the current AES block.
///
/// Created from a packet's declared IV and advanced once per protected run.
/// Transitions are pure so the arithmetic can be checked without a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvState {
    iv: [u8; 16],
    block_offset: u32,
}

impl IvState {
    /// Accepts a 16-byte IV, or an 8-byte IV which becomes the high half of
    /// the counter block.
    pub fn new(iv: &[u8]) -> Result<Self> {
        let mut full = [0u8; 16];

        match iv.len() {
            16 => full.copy_from_slice(iv),
            8 => full[..8].copy_from_slice(iv),
            len => {
                log::error!("Invalid IV size {} (expected 8 or 16 bytes)", len);
                return Err(Error::InvalidContainerData("IV must be 8 or 16 bytes"));
            }
        }

        Ok(Self {
            iv: full,
            block_offset: 0,
        })
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    pub fn block_offset(&self) -> u32 {
        self.block_offset
    }

    /// State to use for the run following `protected`, the ciphertext that
    /// was just handed to the CDM.
    pub fn advance(
        self,
        scheme: ProtectionScheme,
        pattern: EncryptionPattern,
        protected: &[u8],
    ) -> Result<Self> {
        let protected_bytes = protected.len();

        match scheme {
            ProtectionScheme::Cenc => Ok(self.advance_counter(
                ((self.block_offset as usize + protected_bytes) / AES_BLOCK_SIZE) as u64,
                protected_bytes,
            )),
            ProtectionScheme::Cens if pattern.is_none() => Ok(self.advance_counter(
                ((self.block_offset as usize + protected_bytes) / AES_BLOCK_SIZE) as u64,
                protected_bytes,
            )),
            ProtectionScheme::Cens => Ok(self.advance_counter(
                pattern_blocks(pattern, protected_bytes / AES_BLOCK_SIZE),
                protected_bytes,
            )),
            ProtectionScheme::Cbc1 => {
                if protected_bytes < AES_BLOCK_SIZE || protected_bytes % AES_BLOCK_SIZE != 0 {
                    log::error!(
                        "'cbc1' requires subsamples to be a multiple of the AES block size."
                    );
                    return Err(Error::InvalidContainerData(
                        "cbc1 protected run is not a multiple of the AES block size",
                    ));
                }

                let mut iv = [0u8; 16];
                iv.copy_from_slice(&protected[protected_bytes - AES_BLOCK_SIZE..]);
                Ok(Self {
                    iv,
                    block_offset: self.block_offset,
                })
            }
            ProtectionScheme::Cbcs => Ok(self),
        }
    }

    fn advance_counter(self, blocks: u64, protected_bytes: usize) -> Self {
        Self {
            iv: increment_iv(self.iv, blocks as u32),
            block_offset: ((self.block_offset as usize + protected_bytes) % AES_BLOCK_SIZE) as u32,
        }
    }
}

/// Encrypted blocks among `num_blocks` blocks laid out with `pattern`.
///
/// A trailing partial pattern only counts when it holds a whole crypt run.
fn pattern_blocks(pattern: EncryptionPattern, num_blocks: usize) -> u64 {
    let num_blocks = num_blocks as u64;
    let pattern_size = pattern.size();
    let crypt = pattern.crypt_block_count as u64;

    let mut blocks = (num_blocks / pattern_size) * crypt;
    if num_blocks % pattern_size >= crypt {
        blocks += crypt;
    }
    blocks
}

/// Adds `count` to the big-endian counter held in bytes 8..16.
///
/// The counter is two 32-bit words; overflow of the low word carries once
/// into the high word and both words wrap.
pub fn increment_iv(mut iv: [u8; 16], count: u32) -> [u8; 16] {
    let high = u32::from_be_bytes([iv[8], iv[9], iv[10], iv[11]]);
    let low = u32::from_be_bytes([iv[12], iv[13], iv[14], iv[15]]);

    let (low, carry) = low.overflowing_add(count);
    let high = if carry { high.wrapping_add(1) } else { high };

    iv[8..12].copy_from_slice(&high.to_be_bytes());
    iv[12..16].copy_from_slice(&low.to_be_bytes());
    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(counter: u64) -> IvState {
        let mut iv = [0xAA; 16];
        iv[8..].copy_from_slice(&counter.to_be_bytes());
        IvState::new(&iv).unwrap()
    }

    fn counter(state: &IvState) -> u64 {
        u64::from_be_bytes(state.iv()[8..].try_into().unwrap())
    }

    #[test]
    fn eight_byte_iv_is_widened() {
        let state = IvState::new(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(state.iv(), &[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(state.block_offset(), 0);
    }

    #[test]
    fn odd_iv_sizes_are_rejected() {
        for len in [0, 4, 12, 15, 17, 32] {
            assert!(matches!(
                IvState::new(&vec![0; len]),
                Err(Error::InvalidContainerData(_))
            ));
        }
    }

    #[test]
    fn increment_carries_into_high_word_once() {
        let mut iv = [0u8; 16];
        iv[8..12].copy_from_slice(&7u32.to_be_bytes());
        iv[12..16].copy_from_slice(&(u32::MAX - 1).to_be_bytes());

        let iv = increment_iv(iv, 5);
        assert_eq!(&iv[8..12], &8u32.to_be_bytes());
        assert_eq!(&iv[12..16], &3u32.to_be_bytes());
        assert_eq!(&iv[..8], &[0u8; 8]);
    }

    #[test]
    fn increment_wraps_high_word_without_touching_nonce() {
        let mut iv = [0x11u8; 16];
        iv[8..16].copy_from_slice(&u64::MAX.to_be_bytes());

        let iv = increment_iv(iv, 1);
        assert_eq!(&iv[8..16], &[0u8; 8]);
        assert_eq!(&iv[..8], &[0x11u8; 8]);
    }

    #[test]
    fn increment_is_monotonic_without_overflow() {
        let mut iv = [0u8; 16];
        let mut last = 0u64;
        for step in [0u32, 1, 15, 1000, 65_536] {
            iv = increment_iv(iv, step);
            let now = u64::from_be_bytes(iv[8..].try_into().unwrap());
            assert_eq!(now, last + step as u64);
            last = now;
        }
    }

    #[test]
    fn cenc_counts_whole_blocks_including_carried_offset() {
        let pattern = EncryptionPattern::default();
        let s = state(0);

        let s = s.advance(ProtectionScheme::Cenc, pattern, &[0; 20]).unwrap();
        assert_eq!(counter(&s), 1);
        assert_eq!(s.block_offset(), 4);

        // 4 carried + 28 = 32 bytes, two whole blocks.
        let s = s.advance(ProtectionScheme::Cenc, pattern, &[0; 28]).unwrap();
        assert_eq!(counter(&s), 3);
        assert_eq!(s.block_offset(), 0);

        let s = s.advance(ProtectionScheme::Cenc, pattern, &[0; 5]).unwrap();
        assert_eq!(counter(&s), 3);
        assert_eq!(s.block_offset(), 5);
    }

    #[test]
    fn cens_counts_only_crypt_blocks() {
        let pattern = EncryptionPattern::new(1, 9);

        // One full pattern of ten blocks.
        let s = state(0)
            .advance(ProtectionScheme::Cens, pattern, &[0; 160])
            .unwrap();
        assert_eq!(counter(&s), 1);
        assert_eq!(s.block_offset(), 0);

        // 25 blocks: two full patterns, partial of 5 holds a crypt block.
        let s = state(0)
            .advance(ProtectionScheme::Cens, pattern, &[0; 400])
            .unwrap();
        assert_eq!(counter(&s), 3);

        let pattern = EncryptionPattern::new(5, 5);
        // 13 blocks: one full pattern, partial of 3 lacks a whole crypt run.
        let s = state(0)
            .advance(ProtectionScheme::Cens, pattern, &[0; 208])
            .unwrap();
        assert_eq!(counter(&s), 5);
    }

    #[test]
    fn cens_without_pattern_behaves_like_cenc() {
        let none = EncryptionPattern::default();
        let a = state(9).advance(ProtectionScheme::Cens, none, &[0; 100]).unwrap();
        let b = state(9).advance(ProtectionScheme::Cenc, none, &[0; 100]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cbc1_chains_last_ciphertext_block() {
        let mut protected = vec![0u8; 48];
        for (i, x) in protected.iter_mut().enumerate() {
            *x = i as u8;
        }

        let s = state(0)
            .advance(ProtectionScheme::Cbc1, EncryptionPattern::default(), &protected)
            .unwrap();
        assert_eq!(&s.iv()[..], &protected[32..48]);
    }

    #[test]
    fn cbc1_rejects_unaligned_runs() {
        for len in [1, 15, 17, 40] {
            assert!(matches!(
                state(0).advance(
                    ProtectionScheme::Cbc1,
                    EncryptionPattern::default(),
                    &vec![0; len]
                ),
                Err(Error::InvalidContainerData(_))
            ));
        }
    }

    #[test]
    fn cbcs_keeps_constant_iv() {
        let s = state(42);
        let next = s
            .advance(ProtectionScheme::Cbcs, EncryptionPattern::new(1, 9), &[1; 37])
            .unwrap();
        assert_eq!(s, next);
    }
}
