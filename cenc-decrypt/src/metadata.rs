//! Per-packet encryption metadata carried as packet side data.

use crate::{Error, Reader, Result, scheme::EncryptionPattern};

/// Fixed header of the encryption info side data: six big-endian `u32`s.
const ENCRYPTION_INFO_HEADER: usize = 24;

/// One clear run followed by one protected run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subsample {
    pub clear_bytes: u32,
    pub protected_bytes: u32,
}

impl Subsample {
    pub fn new(clear_bytes: u32, protected_bytes: u32) -> Self {
        Self {
            clear_bytes,
            protected_bytes,
        }
    }
}

/// Encryption parameters of a single packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// Protection scheme four-character code, e.g. `cenc`.
    pub scheme: u32,
    pub pattern: EncryptionPattern,
    pub key_id: Vec<u8>,
    pub iv: Vec<u8>,
    /// Empty when the whole payload is protected.
    pub subsamples: Vec<Subsample>,
}

impl EncryptionInfo {
    /// Decodes the side data layout:
    ///
    /// ```text
    /// scheme | crypt_byte_block | skip_byte_block | key_id_size | iv_size | subsample_count
    /// key_id[key_id_size] | iv[iv_size] | (bytes_of_clear_data, bytes_of_protected_data)*
    /// ```
    pub fn from_side_data(data: &[u8]) -> Result<Self> {
        if data.len() < ENCRYPTION_INFO_HEADER {
            log::error!(
                "Encryption info side data is {} bytes, smaller than its header.",
                data.len()
            );
            return Err(Error::OutOfMemory);
        }

        Self::decode(data).map_err(|e| {
            log::error!("Could not read encryption info side data: {}", e);
            Error::OutOfMemory
        })
    }

    fn decode(data: &[u8]) -> std::io::Result<Self> {
        let mut reader = Reader::new(data.to_vec());

        let scheme = reader.read_u32()?;
        let crypt_block_count = reader.read_u32()?;
        let skip_block_count = reader.read_u32()?;
        let key_id_size = reader.read_u32()? as usize;
        let iv_size = reader.read_u32()? as usize;
        let subsample_count = reader.read_u32()? as u64;

        if subsample_count.saturating_mul(8) > reader.remaining() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "subsample table exceeds side data",
            ));
        }

        let key_id = reader.read_bytes(key_id_size)?;
        let iv = reader.read_bytes(iv_size)?;

        let mut subsamples = Vec::with_capacity(subsample_count as usize);
        for _ in 0..subsample_count {
            let clear_bytes = reader.read_u32()?;
            let protected_bytes = reader.read_u32()?;
            subsamples.push(Subsample {
                clear_bytes,
                protected_bytes,
            });
        }

        Ok(Self {
            scheme,
            pattern: EncryptionPattern::new(crypt_block_count, skip_block_count),
            key_id,
            iv,
            subsamples,
        })
    }

    /// Encodes into the layout read by [`EncryptionInfo::from_side_data`].
    pub fn to_side_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            ENCRYPTION_INFO_HEADER + self.key_id.len() + self.iv.len() + self.subsamples.len() * 8,
        );

        for field in [
            self.scheme,
            self.pattern.crypt_block_count,
            self.pattern.skip_block_count,
            self.key_id.len() as u32,
            self.iv.len() as u32,
            self.subsamples.len() as u32,
        ] {
            data.extend_from_slice(&field.to_be_bytes());
        }

        data.extend_from_slice(&self.key_id);
        data.extend_from_slice(&self.iv);

        for subsample in &self.subsamples {
            data.extend_from_slice(&subsample.clear_bytes.to_be_bytes());
            data.extend_from_slice(&subsample.protected_bytes.to_be_bytes());
        }

        data
    }
}

/// Kind of a side data entry attached to a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideDataKind {
    EncryptionInfo,
    NewExtradata,
    Other(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideData {
    pub kind: SideDataKind,
    pub data: Vec<u8>,
}

/// A compressed packet as handed over by the demuxer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub side_data: Vec<SideData>,
}

impl Packet {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            side_data: Vec::new(),
        }
    }

    /// A packet carrying `info` as its encryption side data.
    pub fn encrypted(data: Vec<u8>, info: &EncryptionInfo) -> Self {
        let mut packet = Self::new(data);
        packet.add_side_data(SideDataKind::EncryptionInfo, info.to_side_data());
        packet
    }

    pub fn add_side_data(&mut self, kind: SideDataKind, data: Vec<u8>) {
        self.side_data.push(SideData { kind, data });
    }

    pub fn side_data(&self, kind: SideDataKind) -> Option<&[u8]> {
        self.side_data
            .iter()
            .find(|x| x.kind == kind)
            .map(|x| x.data.as_slice())
    }

    pub fn is_encrypted(&self) -> bool {
        self.side_data(SideDataKind::EncryptionInfo).is_some()
    }

    /// `Ok(None)` for clear packets, an error when the side data is unreadable.
    pub fn encryption_info(&self) -> Result<Option<EncryptionInfo>> {
        self.side_data(SideDataKind::EncryptionInfo)
            .map(EncryptionInfo::from_side_data)
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
