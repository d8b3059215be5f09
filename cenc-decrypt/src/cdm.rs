//! Content decryption module capability and a software clear-key CDM.

use crate::{
    Error, Result,
    iv::AES_BLOCK_SIZE,
    scheme::{EncryptionPattern, EncryptionScheme},
};
use aes::{
    Aes128,
    cipher::{
        BlockDecrypt, KeyInit, KeyIvInit, StreamCipher, StreamCipherSeek,
        generic_array::GenericArray,
    },
};
use std::collections::HashMap;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Outcome reported by a CDM for one decrypt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStatus {
    Success,
    NotSupported,
    KeyNotFound,
    Unknown,
}

/// One contiguous protected run to decrypt.
#[derive(Debug, Clone, Copy)]
pub struct DecryptRequest<'a> {
    pub scheme: EncryptionScheme,
    pub pattern: EncryptionPattern,
    /// Byte position inside the first AES block (counter mode only).
    pub block_offset: u32,
    pub key_id: &'a [u8],
    pub iv: &'a [u8],
    pub data: &'a [u8],
}

/// Capability that performs the actual cipher operation.
///
/// Implementations write exactly `request.data.len()` bytes to the start of
/// `dest`. Calls are synchronous.
pub trait Cdm {
    fn decrypt(&self, request: &DecryptRequest<'_>, dest: &mut [u8]) -> DecryptStatus;
}

impl<T: Cdm + ?Sized> Cdm for &T {
    fn decrypt(&self, request: &DecryptRequest<'_>, dest: &mut [u8]) -> DecryptStatus {
        (**self).decrypt(request, dest)
    }
}

/// Builder for [`ClearKeyCdm`].
///
/// ```
/// use cenc_decrypt::ClearKeyCdm;
///
/// let cdm = ClearKeyCdm::builder()
///     .key("eb676abbcb345e96bbcf616630f1a3da", "100b6c20940f779a4589152b57d2dacb")?
///     .build()?;
/// assert_eq!(cdm.key_count(), 1);
/// # Ok::<(), cenc_decrypt::Error>(())
/// ```
#[derive(Default)]
pub struct ClearKeyCdmBuilder {
    keys: HashMap<Vec<u8>, [u8; 16]>,
}

impl ClearKeyCdmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a KID/key pair, both as 32-character hex strings.
    pub fn key(mut self, kid: &str, key: &str) -> Result<Self> {
        self.keys
            .insert(parse_hex_16(kid)?.to_vec(), parse_hex_16(key)?);
        Ok(self)
    }

    /// Add a pair given as `KID:KEY`.
    pub fn key_pair(self, pair: &str) -> Result<Self> {
        let (kid, key) = pair
            .split_once(':')
            .ok_or_else(|| Error::InvalidKeyFormat(pair.to_owned()))?;
        self.key(kid.trim(), key.trim())
    }

    pub fn key_bytes(mut self, kid: [u8; 16], key: [u8; 16]) -> Self {
        self.keys.insert(kid.to_vec(), key);
        self
    }

    pub fn build(self) -> Result<ClearKeyCdm> {
        if self.keys.is_empty() {
            return Err(Error::NoKeys);
        }

        Ok(ClearKeyCdm { keys: self.keys })
    }
}

/// AES-128 CDM with keys supplied up front.
pub struct ClearKeyCdm {
    keys: HashMap<Vec<u8>, [u8; 16]>,
}

impl ClearKeyCdm {
    pub fn builder() -> ClearKeyCdmBuilder {
        ClearKeyCdmBuilder::new()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn has_key(&self, kid: &[u8]) -> bool {
        self.keys.contains_key(kid)
    }

    fn decrypt_ctr(
        key: &[u8; 16],
        request: &DecryptRequest<'_>,
        dest: &mut [u8],
    ) -> DecryptStatus {
        let mut cipher = Aes128Ctr::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(request.iv),
        );

        if request.block_offset != 0 {
            if !request.pattern.is_none() {
                log::error!("Cannot use a block offset with pattern encryption.");
                return DecryptStatus::NotSupported;
            }

            if cipher.try_seek(request.block_offset as u64).is_err() {
                return DecryptStatus::Unknown;
            }
        }

        process_pattern(request.data, dest, request.pattern, |input, output| {
            output.copy_from_slice(input);
            cipher.apply_keystream(output);
        });

        DecryptStatus::Success
    }

    fn decrypt_cbc(
        key: &[u8; 16],
        request: &DecryptRequest<'_>,
        dest: &mut [u8],
    ) -> DecryptStatus {
        if request.block_offset != 0 {
            log::error!("Cannot have block offset when using CBC");
            return DecryptStatus::NotSupported;
        }

        let mut chain = CbcChain::new(key, request.iv);
        process_pattern(request.data, dest, request.pattern, |input, output| {
            chain.decrypt(input, output)
        });

        DecryptStatus::Success
    }
}

impl Cdm for ClearKeyCdm {
    fn decrypt(&self, request: &DecryptRequest<'_>, dest: &mut [u8]) -> DecryptStatus {
        let Some(key) = self.keys.get(request.key_id) else {
            log::warn!("No key for KID {}", hex::encode(request.key_id));
            return DecryptStatus::KeyNotFound;
        };

        if request.iv.len() != AES_BLOCK_SIZE || dest.len() < request.data.len() {
            log::error!(
                "Invalid decrypt request (iv {} bytes, {} bytes into {} bytes)",
                request.iv.len(),
                request.data.len(),
                dest.len()
            );
            return DecryptStatus::Unknown;
        }

        let dest = &mut dest[..request.data.len()];

        log::trace!(
            "Decrypting {} bytes ({:?}, pattern {}:{}, offset {})",
            request.data.len(),
            request.scheme,
            request.pattern.crypt_block_count,
            request.pattern.skip_block_count,
            request.block_offset
        );

        match request.scheme {
            EncryptionScheme::AesCtr => Self::decrypt_ctr(key, request, dest),
            EncryptionScheme::AesCbc => Self::decrypt_cbc(key, request, dest),
        }
    }
}

/// AES-CBC decryption that keeps chaining across calls.
struct CbcChain {
    cipher: Aes128,
    prev: [u8; 16],
}

impl CbcChain {
    fn new(key: &[u8; 16], iv: &[u8]) -> Self {
        let mut prev = [0u8; 16];
        prev.copy_from_slice(iv);

        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            prev,
        }
    }

    /// Whole blocks are decrypted, a trailing partial block is left clear.
    fn decrypt(&mut self, input: &[u8], output: &mut [u8]) {
        let whole = (input.len() / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;

        for (src, dst) in input[..whole]
            .chunks_exact(AES_BLOCK_SIZE)
            .zip(output[..whole].chunks_exact_mut(AES_BLOCK_SIZE))
        {
            let mut block = GenericArray::clone_from_slice(src);
            self.cipher.decrypt_block(&mut block);

            for j in 0..AES_BLOCK_SIZE {
                dst[j] = block[j] ^ self.prev[j];
            }
            self.prev.copy_from_slice(src);
        }

        output[whole..input.len()].copy_from_slice(&input[whole..]);
    }
}

/// Applies `decrypt_fn` to the crypt blocks of `pattern` and copies the rest.
///
/// Without a pattern the whole input goes to `decrypt_fn`. With a pattern a
/// trailing chunk shorter than one block stays clear.
fn process_pattern<F>(
    input: &[u8],
    output: &mut [u8],
    pattern: EncryptionPattern,
    mut decrypt_fn: F,
) where
    F: FnMut(&[u8], &mut [u8]),
{
    if pattern.is_none() {
        decrypt_fn(input, output);
        return;
    }

    let crypt_size = (pattern.crypt_block_count as usize).saturating_mul(AES_BLOCK_SIZE);
    let skip_size = (pattern.skip_block_count as usize).saturating_mul(AES_BLOCK_SIZE);

    let mut offset = 0;
    while offset < input.len() {
        let chunk = (input.len() - offset).min(crypt_size);
        let whole = (chunk / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;

        if whole > 0 {
            decrypt_fn(
                &input[offset..offset + whole],
                &mut output[offset..offset + whole],
            );
        }
        output[offset + whole..offset + chunk]
            .copy_from_slice(&input[offset + whole..offset + chunk]);
        offset += chunk;

        let skip = (input.len() - offset).min(skip_size);
        output[offset..offset + skip].copy_from_slice(&input[offset..offset + skip]);
        offset += skip;
    }
}

/// Parse a 16-byte hex string.
pub fn parse_hex_16(input: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(input.replace('-', ""))?;
    if bytes.len() != 16 {
        return Err(Error::InvalidKeySize(bytes.len()));
    }

    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
