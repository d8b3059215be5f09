use super::ParsedBox;
use crate::{Result, metadata::Subsample, scheme::EncryptionPattern};

/// Scheme Type Box (schm).
pub struct SchmBox {
    /// The scheme type as a 4-byte code (e.g., 'cenc', 'cbcs').
    pub scheme_type: u32,
    pub scheme_version: u32,
}

impl SchmBox {
    pub fn new(box_: &mut ParsedBox) -> Result<Self> {
        let reader = &mut box_.reader;

        Ok(Self {
            scheme_type: reader.read_u32()?,
            scheme_version: reader.read_u32()?,
        })
    }
}

/// Track Encryption Box (tenc).
pub struct TencBox {
    pub pattern: EncryptionPattern,
    pub is_protected: bool,
    /// 0 when every sample shares `constant_iv`.
    pub per_sample_iv_size: u8,
    pub default_kid: [u8; 16],
    pub constant_iv: Option<Vec<u8>>,
}

impl TencBox {
    pub fn new(box_: &mut ParsedBox) -> Result<Self> {
        let version = box_.version.unwrap_or(0);
        let reader = &mut box_.reader;

        reader.skip(1)?; // reserved

        // default_crypt_byte_block (4 bits) + default_skip_byte_block (4 bits)
        let pattern_byte = reader.read_u8()?;
        let pattern = if version > 0 {
            EncryptionPattern::new((pattern_byte >> 4) as u32, (pattern_byte & 0x0F) as u32)
        } else {
            EncryptionPattern::default()
        };

        let is_protected = reader.read_u8()? != 0;
        let per_sample_iv_size = reader.read_u8()?;

        let mut default_kid = [0u8; 16];
        default_kid.copy_from_slice(&reader.read_bytes(16)?);

        let constant_iv = if is_protected && per_sample_iv_size == 0 {
            let size = reader.read_u8()?;
            Some(reader.read_bytes(size as usize)?)
        } else {
            None
        };

        Ok(Self {
            pattern,
            is_protected,
            per_sample_iv_size,
            default_kid,
            constant_iv,
        })
    }
}

/// Track Fragment Header Box (tfhd).
pub struct TfhdBox {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub default_sample_size: Option<u32>,
}

impl TfhdBox {
    pub fn new(box_: &mut ParsedBox) -> Result<Self> {
        let flags = box_.flags.unwrap_or(0);
        let reader = &mut box_.reader;

        let track_id = reader.read_u32()?;
        let mut base_data_offset = None;
        let mut default_sample_size = None;

        if (flags & 0x000001) != 0 {
            base_data_offset = Some(reader.read_u64()?);
        }

        // Skip "sample_description_index" if present.
        if (flags & 0x000002) != 0 {
            reader.skip(4)?;
        }

        // Skip "default_sample_duration" if present.
        if (flags & 0x000008) != 0 {
            reader.skip(4)?;
        }

        if (flags & 0x000010) != 0 {
            default_sample_size = Some(reader.read_u32()?);
        }

        Ok(Self {
            track_id,
            base_data_offset,
            default_sample_size,
        })
    }
}

/// Track Fragment Run Box (trun), keeping only what locates sample data.
pub struct TrunBox {
    /// Offset of the first sample, relative to the fragment's base offset.
    pub data_offset: Option<i32>,
    /// Per sample sizes, `None` where the fragment default applies.
    pub sample_sizes: Vec<Option<u32>>,
}

impl TrunBox {
    /// `max_samples` bounds the declared sample count, since a run whose
    /// samples carry no per sample fields occupies no bytes in the box.
    pub fn new(box_: &mut ParsedBox, max_samples: u64) -> Result<Self> {
        let flags = box_.flags.unwrap_or(0);
        let reader = &mut box_.reader;

        let sample_count = reader.read_u32()?;
        let mut data_offset = None;

        if sample_count as u64 > max_samples {
            return Err(crate::Error::Mp4(format!(
                "trun declares {} samples, more than the segment can hold",
                sample_count
            )));
        }

        if (flags & 0x000001) != 0 {
            data_offset = Some(reader.read_i32()?);
        }

        // Skip "first_sample_flags" if present.
        if (flags & 0x000004) != 0 {
            reader.skip(4)?;
        }

        let entry_size = [0x000100, 0x000200, 0x000400, 0x000800]
            .iter()
            .filter(|x| (flags & **x) != 0)
            .count() as u64
            * 4;

        if (sample_count as u64) * entry_size > reader.remaining() {
            return Err(crate::Error::Mp4(format!(
                "trun declares {} samples but holds {} bytes",
                sample_count,
                reader.remaining()
            )));
        }

        let mut sample_sizes = Vec::new();

        for _ in 0..sample_count {
            // Skip "sample_duration" if present.
            if (flags & 0x000100) != 0 {
                reader.skip(4)?;
            }

            let sample_size = if (flags & 0x000200) != 0 {
                Some(reader.read_u32()?)
            } else {
                None
            };

            // Skip "sample_flags" and "sample_composition_time_offset" if present.
            if (flags & 0x000400) != 0 {
                reader.skip(4)?;
            }

            if (flags & 0x000800) != 0 {
                reader.skip(4)?;
            }

            sample_sizes.push(sample_size);
        }

        Ok(Self {
            data_offset,
            sample_sizes,
        })
    }
}

/// Sample encryption information for a single sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SencSample {
    /// Empty when the track uses a constant IV.
    pub iv: Vec<u8>,
    pub subsamples: Vec<Subsample>,
}

/// Sample Encryption Box (senc).
pub struct SencBox {
    pub samples: Vec<SencSample>,
}

impl SencBox {
    /// `iv_size` is the per sample IV size declared by the track's tenc box,
    /// `max_samples` bounds the declared sample count as for [`TrunBox`].
    pub fn new(box_: &mut ParsedBox, iv_size: u8, max_samples: u64) -> Result<Self> {
        let flags = box_.flags.unwrap_or(0);
        let reader = &mut box_.reader;

        let sample_count = reader.read_u32()?;
        let has_subsamples = (flags & 0x000002) != 0;

        if sample_count as u64 > max_samples {
            return Err(crate::Error::Mp4(format!(
                "senc declares {} samples, more than the segment can hold",
                sample_count
            )));
        }

        if (sample_count as u64) * (iv_size as u64) > reader.remaining() {
            return Err(crate::Error::Mp4(format!(
                "senc declares {} samples but holds {} bytes",
                sample_count,
                reader.remaining()
            )));
        }

        let mut samples = Vec::new();

        for _ in 0..sample_count {
            let iv = reader.read_bytes(iv_size as usize)?;
            let mut subsamples = Vec::new();

            if has_subsamples {
                let subsample_count = reader.read_u16()?;

                for _ in 0..subsample_count {
                    let clear_bytes = reader.read_u16()? as u32;
                    let protected_bytes = reader.read_u32()?;
                    subsamples.push(Subsample::new(clear_bytes, protected_bytes));
                }
            }

            samples.push(SencSample { iv, subsamples });
        }

        Ok(Self { samples })
    }
}
