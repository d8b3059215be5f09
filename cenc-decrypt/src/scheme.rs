use crate::{Error, Result};

/// `cenc` - AES-CTR, no pattern.
pub const CENC: u32 = 0x63656E63;
/// `cens` - AES-CTR, pattern capable.
pub const CENS: u32 = 0x63656E73;
/// `cbc1` - AES-CBC, no pattern.
pub const CBC1: u32 = 0x63626331;
/// `cbcs` - AES-CBC, pattern capable with a constant IV.
pub const CBCS: u32 = 0x63626373;

/// Cipher mode handed to the CDM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionScheme {
    AesCtr,
    AesCbc,
}

/// Number of encrypted and skipped 16-byte blocks in a repeating pattern.
///
/// `(0, 0)` means every block is encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EncryptionPattern {
    pub crypt_block_count: u32,
    pub skip_block_count: u32,
}

impl EncryptionPattern {
    pub fn new(crypt_block_count: u32, skip_block_count: u32) -> Self {
        Self {
            crypt_block_count,
            skip_block_count,
        }
    }

    pub fn is_none(&self) -> bool {
        self.crypt_block_count == 0 && self.skip_block_count == 0
    }

    /// Blocks in one crypt+skip repetition.
    pub fn size(&self) -> u64 {
        self.crypt_block_count as u64 + self.skip_block_count as u64
    }
}

/// A recognised protection scheme four-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionScheme {
    Cenc,
    Cens,
    Cbc1,
    Cbcs,
}

impl ProtectionScheme {
    /// Maps a scheme code to a protection scheme, validating the pattern.
    ///
    /// `cenc` and `cbc1` cannot carry a pattern; unknown codes are rejected.
    pub fn resolve(scheme_type: u32, pattern: EncryptionPattern) -> Result<Self> {
        let scheme = match scheme_type {
            CENC => Self::Cenc,
            CENS => Self::Cens,
            CBC1 => Self::Cbc1,
            CBCS => Self::Cbcs,
            _ => {
                log::error!("Scheme 0x{:08x} is unsupported", scheme_type);
                return Err(Error::NotSupported(format!(
                    "protection scheme {}",
                    fourcc(scheme_type)
                )));
            }
        };

        if !scheme.allows_pattern() && !pattern.is_none() {
            log::error!(
                "Cannot specify encryption pattern with '{}' scheme.",
                scheme.name()
            );
            return Err(Error::InvalidContainerData(
                "encryption pattern given for a scheme without pattern support",
            ));
        }

        Ok(scheme)
    }

    pub fn encryption_scheme(&self) -> EncryptionScheme {
        match self {
            Self::Cenc | Self::Cens => EncryptionScheme::AesCtr,
            Self::Cbc1 | Self::Cbcs => EncryptionScheme::AesCbc,
        }
    }

    pub fn allows_pattern(&self) -> bool {
        matches!(self, Self::Cens | Self::Cbcs)
    }

    pub fn scheme_type(&self) -> u32 {
        match self {
            Self::Cenc => CENC,
            Self::Cens => CENS,
            Self::Cbc1 => CBC1,
            Self::Cbcs => CBCS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cenc => "cenc",
            Self::Cens => "cens",
            Self::Cbc1 => "cbc1",
            Self::Cbcs => "cbcs",
        }
    }
}

impl std::fmt::Display for ProtectionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders a four-character code, falling back to hex for non-printable codes.
pub fn fourcc(code: u32) -> String {
    let bytes = code.to_be_bytes();

    if bytes.iter().all(|x| x.is_ascii_graphic()) {
        bytes.iter().map(|x| *x as char).collect()
    } else {
        format!("0x{:08x}", code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_all_known_codes() {
        let none = EncryptionPattern::default();
        let cases = [
            (CENC, ProtectionScheme::Cenc, EncryptionScheme::AesCtr),
            (CENS, ProtectionScheme::Cens, EncryptionScheme::AesCtr),
            (CBC1, ProtectionScheme::Cbc1, EncryptionScheme::AesCbc),
            (CBCS, ProtectionScheme::Cbcs, EncryptionScheme::AesCbc),
        ];

        for (code, scheme, mode) in cases {
            let resolved = ProtectionScheme::resolve(code, none).unwrap();
            assert_eq!(resolved, scheme);
            assert_eq!(resolved.encryption_scheme(), mode);
            assert_eq!(resolved.scheme_type(), code);
        }
    }

    #[test]
    fn pattern_rejected_for_schemes_without_pattern() {
        for code in [CENC, CBC1] {
            for pattern in [
                EncryptionPattern::new(1, 9),
                EncryptionPattern::new(1, 0),
                EncryptionPattern::new(0, 9),
            ] {
                assert!(matches!(
                    ProtectionScheme::resolve(code, pattern),
                    Err(Error::InvalidContainerData(_))
                ));
            }
        }
    }

    #[test]
    fn pattern_accepted_for_pattern_schemes() {
        let pattern = EncryptionPattern::new(1, 9);
        assert_eq!(
            ProtectionScheme::resolve(CENS, pattern).unwrap(),
            ProtectionScheme::Cens
        );
        assert_eq!(
            ProtectionScheme::resolve(CBCS, pattern).unwrap(),
            ProtectionScheme::Cbcs
        );
    }

    #[test]
    fn unknown_code_is_not_supported() {
        for code in [0, 0x61626364, 0x63656E00, u32::MAX] {
            for pattern in [EncryptionPattern::default(), EncryptionPattern::new(1, 9)] {
                assert!(matches!(
                    ProtectionScheme::resolve(code, pattern),
                    Err(Error::NotSupported(_))
                ));
            }
        }
    }

    #[test]
    fn fourcc_rendering() {
        assert_eq!(fourcc(CBCS), "cbcs");
        assert_eq!(fourcc(0), "0x00000000");
    }
}
