/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-player/blob/7098f43f70119226bca2e5583833aaf27b498e33/lib/util/mp4_box_parsers.js
    2. ISO/IEC 23001-7 (Common encryption in ISO base media file format files)

*/

use super::{
    Mp4Parser,
    boxes::{SchmBox, SencBox, TencBox, TfhdBox, TrunBox},
    parser,
};
use crate::{
    Error, Result,
    cdm::Cdm,
    metadata::{EncryptionInfo, Packet, Subsample},
    scheme::{CENC, EncryptionPattern},
};
use std::{
    cell::{Cell, RefCell},
    ops::Range,
    rc::Rc,
};

/// Encryption defaults of a track, read from its init segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEncryption {
    pub scheme_type: u32,
    pub pattern: EncryptionPattern,
    pub is_protected: bool,
    pub per_sample_iv_size: u8,
    pub default_kid: [u8; 16],
    pub constant_iv: Option<Vec<u8>>,
}

impl TrackEncryption {
    /// Reads the first protected sample entry of `data`.
    ///
    /// Returns `None` when the init segment carries no tenc box. A tenc box
    /// without a sibling schm box is treated as `cenc`.
    pub fn from_init(data: &[u8]) -> Result<Option<Self>> {
        let scheme_type = Rc::new(Cell::new(None));
        let tenc = Rc::new(RefCell::new(None));

        let scheme_type_c = scheme_type.clone();
        let tenc_c = tenc.clone();

        Mp4Parser::new()
            .base_box("moov", parser::children)
            .base_box("trak", parser::children)
            .base_box("mdia", parser::children)
            .base_box("minf", parser::children)
            .base_box("stbl", parser::children)
            .full_box("stsd", parser::sample_description)
            .base_box("encv", parser::visual_sample_entry)
            .base_box("enca", parser::audio_sample_entry)
            .base_box("sinf", parser::children)
            .base_box("schi", parser::children)
            .full_box("schm", move |mut box_| {
                let schm = SchmBox::new(&mut box_)?;
                if scheme_type_c.get().is_none() {
                    scheme_type_c.set(Some(schm.scheme_type));
                }
                Ok(())
            })
            .full_box("tenc", move |mut box_| {
                let parsed = TencBox::new(&mut box_)?;
                let mut tenc = tenc_c.borrow_mut();
                if tenc.is_none() {
                    *tenc = Some(parsed);
                }
                Ok(())
            })
            .parse(data, true)?;

        let Some(tenc) = tenc.take() else {
            return Ok(None);
        };

        if tenc.is_protected && tenc.per_sample_iv_size == 0 && tenc.constant_iv.is_none() {
            return Err(Error::Mp4(
                "tenc declares neither a per sample nor a constant IV".to_owned(),
            ));
        }

        Ok(Some(Self {
            scheme_type: scheme_type.get().unwrap_or(CENC),
            pattern: tenc.pattern,
            is_protected: tenc.is_protected,
            per_sample_iv_size: tenc.per_sample_iv_size,
            default_kid: tenc.default_kid,
            constant_iv: tenc.constant_iv,
        }))
    }

    fn encryption_info(&self, iv: Vec<u8>, subsamples: Vec<Subsample>) -> EncryptionInfo {
        EncryptionInfo {
            scheme: self.scheme_type,
            pattern: self.pattern,
            key_id: self.default_kid.to_vec(),
            iv,
            subsamples,
        }
    }
}

/// One sample of a media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Location of the sample data inside the segment.
    pub range: Range<usize>,
    /// Sample data, with encryption side data when the track is protected.
    pub packet: Packet,
}

#[derive(Default)]
struct TrafState {
    tfhd: Option<TfhdBox>,
    runs: Vec<TrunBox>,
    senc: Option<SencBox>,
}

/// Splits a fragmented mp4 media segment into packets.
///
/// Every `moof/traf` is read for its `tfhd`, `trun` and `senc` boxes. Sample
/// data is located relative to the tfhd base data offset, or to the start
/// of the enclosing `moof` when none is given.
pub fn extract_samples(track: &TrackEncryption, segment: &[u8]) -> Result<Vec<Sample>> {
    let segment_len = segment.len() as u64;
    let moof_start = Rc::new(Cell::new(0u64));
    let traf = Rc::new(RefCell::new(TrafState::default()));
    let located = Rc::new(RefCell::new(Vec::new()));

    let moof_start_c = moof_start.clone();
    let traf_tfhd = traf.clone();
    let traf_trun = traf.clone();
    let traf_senc = traf.clone();
    let traf_c = traf.clone();
    let located_c = located.clone();
    let track_c = track.clone();
    let iv_size = track.per_sample_iv_size;

    Mp4Parser::new()
        .base_box("moof", move |box_| {
            moof_start_c.set(box_.start);
            parser::children(box_)
        })
        .base_box("traf", move |box_| {
            *traf_c.borrow_mut() = TrafState::default();
            parser::children(box_)?;

            let state = traf_c.take();
            let samples = locate_samples(&track_c, &state, moof_start.get(), segment_len)?;
            located_c.borrow_mut().extend(samples);
            Ok(())
        })
        .full_box("tfhd", move |mut box_| {
            traf_tfhd.borrow_mut().tfhd = Some(TfhdBox::new(&mut box_)?);
            Ok(())
        })
        .full_box("trun", move |mut box_| {
            traf_trun.borrow_mut().runs.push(TrunBox::new(&mut box_, segment_len)?);
            Ok(())
        })
        .full_box("senc", move |mut box_| {
            traf_senc.borrow_mut().senc = Some(SencBox::new(&mut box_, iv_size, segment_len)?);
            Ok(())
        })
        .parse(segment, false)?;

    let samples = located
        .take()
        .into_iter()
        .map(|(range, info)| {
            let data = segment[range.clone()].to_vec();
            let packet = match info {
                Some(info) => Packet::encrypted(data, &info),
                None => Packet::new(data),
            };
            Sample { range, packet }
        })
        .collect();

    Ok(samples)
}

fn locate_samples(
    track: &TrackEncryption,
    state: &TrafState,
    moof_start: u64,
    segment_len: u64,
) -> Result<Vec<(Range<usize>, Option<EncryptionInfo>)>> {
    let Some(tfhd) = &state.tfhd else {
        return Err(Error::Mp4("traf box without a tfhd box".to_owned()));
    };

    let base = tfhd.base_data_offset.unwrap_or(moof_start);
    let mut position = base;
    let mut samples = Vec::new();

    for run in &state.runs {
        if let Some(data_offset) = run.data_offset {
            position = base.checked_add_signed(data_offset as i64).ok_or_else(|| {
                Error::Mp4(format!("trun data offset {} points before the segment", data_offset))
            })?;
        }

        for sample_size in &run.sample_sizes {
            let Some(size) = sample_size.or(tfhd.default_sample_size) else {
                return Err(Error::Mp4(format!(
                    "no sample size for a sample of track {}",
                    tfhd.track_id
                )));
            };

            let end = match position.checked_add(size as u64) {
                Some(end) if position <= segment_len => end,
                _ => {
                    return Err(Error::Mp4(format!(
                        "sample data at {} ({} bytes) lies outside the segment",
                        position, size
                    )));
                }
            };

            if end > segment_len {
                return Err(Error::Mp4(format!(
                    "sample data {}..{} lies outside the segment ({} bytes)",
                    position, end, segment_len
                )));
            }

            samples.push((position as usize..end as usize, None));
            position = end;
        }
    }

    if !track.is_protected {
        return Ok(samples);
    }

    let Some(senc) = &state.senc else {
        return Err(Error::NotSupported(format!(
            "protected track {} has no senc box",
            tfhd.track_id
        )));
    };

    if senc.samples.len() != samples.len() {
        return Err(Error::Mp4(format!(
            "senc describes {} samples but trun describes {}",
            senc.samples.len(),
            samples.len()
        )));
    }

    for ((_, info), entry) in samples.iter_mut().zip(&senc.samples) {
        let iv = match &track.constant_iv {
            Some(constant_iv) if track.per_sample_iv_size == 0 => constant_iv.clone(),
            _ => entry.iv.clone(),
        };
        *info = Some(track.encryption_info(iv, entry.subsamples.clone()));
    }

    Ok(samples)
}

/// Decrypts every protected sample of `segment` in place of a copy.
///
/// Box structure is left untouched, only sample data changes.
pub fn decrypt_segment<C: Cdm + ?Sized>(
    cdm: &C,
    track: &TrackEncryption,
    segment: &[u8],
) -> Result<Vec<u8>> {
    let mut output = segment.to_vec();
    let samples = extract_samples(track, segment)?;

    log::debug!("decrypting {} samples", samples.len());

    for sample in samples {
        if sample.packet.is_encrypted() {
            sample.packet.decrypt(cdm, &mut output[sample.range])?;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{CBCS, CENS};

    const KID: [u8; 16] = [0x42; 16];

    fn mp4_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(name);
        data.extend_from_slice(payload);
        data
    }

    fn full_box(name: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = (((version as u32) << 24) | flags).to_be_bytes().to_vec();
        body.extend_from_slice(payload);
        mp4_box(name, &body)
    }

    fn init(
        scheme: &[u8; 4],
        tenc_version: u8,
        pattern: u8,
        iv_size: u8,
        constant_iv: &[u8],
    ) -> Vec<u8> {
        let mut tenc = vec![0, pattern, 1, iv_size];
        tenc.extend_from_slice(&KID);
        if iv_size == 0 {
            tenc.push(constant_iv.len() as u8);
            tenc.extend_from_slice(constant_iv);
        }

        let mut schm = scheme.to_vec();
        schm.extend_from_slice(&0x00010000u32.to_be_bytes());

        let sinf = mp4_box(
            b"sinf",
            &[
                mp4_box(b"frma", b"avc1"),
                full_box(b"schm", 0, 0, &schm),
                mp4_box(b"schi", &full_box(b"tenc", tenc_version, 0, &tenc)),
            ]
            .concat(),
        );

        let encv = mp4_box(b"encv", &[vec![0; 78], sinf].concat());
        let stsd = full_box(b"stsd", 0, 0, &[1u32.to_be_bytes().to_vec(), encv].concat());
        let stbl = mp4_box(b"stbl", &stsd);
        let minf = mp4_box(b"minf", &stbl);
        let mdia = mp4_box(b"mdia", &minf);
        let trak = mp4_box(b"trak", &mdia);
        [mp4_box(b"ftyp", b"iso6"), mp4_box(b"moov", &trak)].concat()
    }

    fn moof(sizes: &[u32], senc: &[u8], data_offset: i32) -> Vec<u8> {
        let tfhd = full_box(b"tfhd", 0, 0x020000, &1u32.to_be_bytes());

        let mut trun = (sizes.len() as u32).to_be_bytes().to_vec();
        trun.extend_from_slice(&data_offset.to_be_bytes());
        for size in sizes {
            trun.extend_from_slice(&size.to_be_bytes());
        }
        let trun = full_box(b"trun", 0, 0x000201, &trun);

        let mut traf = [tfhd, trun].concat();
        if !senc.is_empty() {
            traf.extend_from_slice(senc);
        }

        mp4_box(
            b"moof",
            &[
                full_box(b"mfhd", 0, 0, &1u32.to_be_bytes()),
                mp4_box(b"traf", &traf),
            ]
            .concat(),
        )
    }

    /// A `styp`, one moof and an mdat holding `samples` back to back.
    fn segment(samples: &[Vec<u8>], senc: &[u8]) -> Vec<u8> {
        let styp = mp4_box(b"styp", b"msdh");
        let sizes: Vec<u32> = samples.iter().map(|x| x.len() as u32).collect();
        let moof_len = moof(&sizes, senc, 0).len();
        let moof = moof(&sizes, senc, (moof_len + 8) as i32);
        [styp, moof, mp4_box(b"mdat", &samples.concat())].concat()
    }

    fn senc(entries: &[(Vec<u8>, Vec<(u16, u32)>)]) -> Vec<u8> {
        let mut body = (entries.len() as u32).to_be_bytes().to_vec();
        for (iv, subsamples) in entries {
            body.extend_from_slice(iv);
            body.extend_from_slice(&(subsamples.len() as u16).to_be_bytes());
            for (clear, protected) in subsamples {
                body.extend_from_slice(&clear.to_be_bytes());
                body.extend_from_slice(&protected.to_be_bytes());
            }
        }
        full_box(b"senc", 0, 0x02, &body)
    }

    #[test]
    fn reads_track_encryption_from_init() {
        let track = TrackEncryption::from_init(&init(b"cens", 1, 0x19, 8, &[]))
            .unwrap()
            .unwrap();

        assert_eq!(track.scheme_type, CENS);
        assert_eq!(track.pattern, EncryptionPattern::new(1, 9));
        assert_eq!(track.per_sample_iv_size, 8);
        assert_eq!(track.default_kid, KID);
        assert!(track.is_protected);
        assert!(track.constant_iv.is_none());
    }

    #[test]
    fn reads_constant_iv() {
        let track = TrackEncryption::from_init(&init(b"cbcs", 1, 0x19, 0, &[7; 16]))
            .unwrap()
            .unwrap();

        assert_eq!(track.scheme_type, CBCS);
        assert_eq!(track.constant_iv, Some(vec![7; 16]));
    }

    #[test]
    fn version_zero_tenc_has_no_pattern() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0x19, 16, &[]))
            .unwrap()
            .unwrap();
        assert!(track.pattern.is_none());
    }

    #[test]
    fn clear_init_has_no_track_encryption() {
        let init = mp4_box(b"moov", &mp4_box(b"trak", &[]));
        assert_eq!(TrackEncryption::from_init(&init).unwrap(), None);
    }

    #[test]
    fn locates_samples_and_attaches_side_data() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        let samples = vec![vec![1u8; 40], vec![2u8; 24]];
        let iv_a = [0xA0; 8];
        let iv_b = [0xB0; 8];
        let senc = senc(&[
            (iv_a.to_vec(), vec![(8, 32)]),
            (iv_b.to_vec(), vec![(4, 16), (4, 0)]),
        ]);
        let data = segment(&samples, &senc);

        let extracted = extract_samples(&track, &data).unwrap();
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted[0].packet.data, samples[0]);
        assert_eq!(extracted[1].packet.data, samples[1]);
        assert_eq!(extracted[0].range.end, extracted[1].range.start);
        assert_eq!(extracted[1].range.end, data.len());

        let info = extracted[1].packet.encryption_info().unwrap().unwrap();
        assert_eq!(info.scheme, CENC);
        assert_eq!(info.iv, iv_b);
        assert_eq!(info.key_id, KID);
        assert_eq!(
            info.subsamples,
            vec![Subsample::new(4, 16), Subsample::new(4, 0)]
        );
    }

    #[test]
    fn constant_iv_is_used_for_every_sample() {
        let track = TrackEncryption::from_init(&init(b"cbcs", 1, 0x19, 0, &[9; 16]))
            .unwrap()
            .unwrap();
        let senc = senc(&[(vec![], vec![(0, 16)])]);
        let data = segment(&[vec![0; 16]], &senc);

        let extracted = extract_samples(&track, &data).unwrap();
        let info = extracted[0].packet.encryption_info().unwrap().unwrap();
        assert_eq!(info.iv, vec![9; 16]);
        assert_eq!(info.pattern, EncryptionPattern::new(1, 9));
    }

    #[test]
    fn unprotected_track_yields_clear_packets() {
        let mut track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        track.is_protected = false;

        let extracted = extract_samples(&track, &segment(&[vec![5; 10]], &[])).unwrap();
        assert!(!extracted[0].packet.is_encrypted());
    }

    #[test]
    fn protected_track_needs_matching_senc() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();

        let missing = segment(&[vec![0; 16]], &[]);
        assert!(matches!(
            extract_samples(&track, &missing),
            Err(Error::NotSupported(_))
        ));

        let short = segment(
            &[vec![0; 16], vec![0; 16]],
            &senc(&[(vec![0; 8], vec![(0, 16)])]),
        );
        assert!(matches!(extract_samples(&track, &short), Err(Error::Mp4(_))));
    }

    #[test]
    fn sample_outside_segment_is_rejected() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        let mut data = segment(&[vec![0; 32]], &senc(&[(vec![0; 8], vec![])]));
        data.truncate(data.len() - 4);

        // mdat now runs past the end, and so does the sample.
        assert!(extract_samples(&track, &data).is_err());
    }

    /// A lone moof whose traf holds `boxes`, followed by `mdat_len` bytes.
    fn fragment(boxes: &[Vec<u8>], mdat_len: usize) -> Vec<u8> {
        [
            mp4_box(b"moof", &mp4_box(b"traf", &boxes.concat())),
            mp4_box(b"mdat", &vec![0; mdat_len]),
        ]
        .concat()
    }

    /// tfhd with a default sample size and, when given, a base data offset.
    fn tfhd(base_data_offset: Option<u64>, default_sample_size: u32) -> Vec<u8> {
        let mut body = 1u32.to_be_bytes().to_vec();
        let mut flags = 0x000010;
        if let Some(offset) = base_data_offset {
            body.extend_from_slice(&offset.to_be_bytes());
            flags |= 0x000001;
        }
        body.extend_from_slice(&default_sample_size.to_be_bytes());
        full_box(b"tfhd", 0, flags, &body)
    }

    #[test]
    fn base_data_offset_near_overflow_is_rejected() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        let data = fragment(
            &[
                tfhd(Some(u64::MAX - 4), 16),
                full_box(b"trun", 0, 0, &1u32.to_be_bytes()),
            ],
            16,
        );

        assert!(matches!(extract_samples(&track, &data), Err(Error::Mp4(_))));
    }

    #[test]
    fn base_data_offset_past_segment_is_rejected() {
        let mut track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        track.is_protected = false;
        let data = fragment(
            &[tfhd(Some(1 << 40), 0), full_box(b"trun", 0, 0, &1u32.to_be_bytes())],
            0,
        );

        assert!(matches!(extract_samples(&track, &data), Err(Error::Mp4(_))));
    }

    #[test]
    fn trun_without_sample_fields_cannot_claim_unbounded_samples() {
        let track = TrackEncryption::from_init(&init(b"cenc", 0, 0, 8, &[]))
            .unwrap()
            .unwrap();
        let data = fragment(
            &[tfhd(None, 0), full_box(b"trun", 0, 0, &u32::MAX.to_be_bytes())],
            0,
        );

        assert!(matches!(
            extract_samples(&track, &data),
            Err(Error::Mp4(x)) if x.contains("trun declares")
        ));
    }

    #[test]
    fn constant_iv_senc_cannot_claim_unbounded_samples() {
        let track = TrackEncryption::from_init(&init(b"cbcs", 1, 0x19, 0, &[9; 16]))
            .unwrap()
            .unwrap();
        let data = fragment(
            &[
                tfhd(None, 16),
                full_box(b"trun", 0, 0, &1u32.to_be_bytes()),
                full_box(b"senc", 0, 0, &u32::MAX.to_be_bytes()),
            ],
            16,
        );

        assert!(matches!(
            extract_samples(&track, &data),
            Err(Error::Mp4(x)) if x.contains("senc declares")
        ));
    }
}
