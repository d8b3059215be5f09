use crate::{
    Error, Result,
    cdm::{Cdm, DecryptRequest, DecryptStatus},
    iv::IvState,
    metadata::{EncryptionInfo, Packet},
    scheme::ProtectionScheme,
};

impl Packet {
    /// Decrypts the payload into `dest`.
    ///
    /// # Panics
    ///
    /// If the packet carries no encryption info or `dest` is shorter than the
    /// payload. Both are caller bugs.
    pub fn decrypt<C: Cdm + ?Sized>(&self, cdm: &C, dest: &mut [u8]) -> Result<()> {
        assert!(self.is_encrypted(), "This packet isn't encrypted");
        assert!(
            self.data.len() <= dest.len(),
            "Output buffer ({} bytes) is smaller than the packet ({} bytes)",
            dest.len(),
            self.data.len()
        );

        let Some(info) = self.encryption_info()? else {
            log::error!("Unable to get side data from packet.");
            return Err(Error::UnknownError);
        };

        let scheme = ProtectionScheme::resolve(info.scheme, info.pattern)?;
        let state = IvState::new(&info.iv)?;

        if info.subsamples.is_empty() {
            let request = DecryptRequest {
                scheme: scheme.encryption_scheme(),
                pattern: info.pattern,
                block_offset: 0,
                key_id: &info.key_id,
                iv: state.iv(),
                data: &self.data,
            };
            check_status(cdm.decrypt(&request, dest), &info.key_id)
        } else {
            decrypt_subsamples(cdm, scheme, &info, state, &self.data, dest)
        }
    }

    /// Decrypts into a new buffer of the payload's size.
    pub fn decrypt_to_vec<C: Cdm + ?Sized>(&self, cdm: &C) -> Result<Vec<u8>> {
        let mut dest = vec![0u8; self.data.len()];
        self.decrypt(cdm, &mut dest)?;
        Ok(dest)
    }
}

fn decrypt_subsamples<C: Cdm + ?Sized>(
    cdm: &C,
    scheme: ProtectionScheme,
    info: &EncryptionInfo,
    mut state: IvState,
    src: &[u8],
    dest: &mut [u8],
) -> Result<()> {
    let mut offset = 0usize;
    let mut total_remaining = src.len();

    for subsample in &info.subsamples {
        let clear_bytes = subsample.clear_bytes as usize;
        let protected_bytes = subsample.protected_bytes as usize;

        if total_remaining < clear_bytes || total_remaining - clear_bytes < protected_bytes {
            log::error!("Invalid subsample size");
            return Err(Error::InvalidContainerData(
                "subsample exceeds the remaining payload",
            ));
        }

        dest[offset..offset + clear_bytes].copy_from_slice(&src[offset..offset + clear_bytes]);
        offset += clear_bytes;
        total_remaining -= clear_bytes;

        if protected_bytes == 0 {
            continue;
        }

        let protected = &src[offset..offset + protected_bytes];
        let request = DecryptRequest {
            scheme: scheme.encryption_scheme(),
            pattern: info.pattern,
            block_offset: state.block_offset(),
            key_id: &info.key_id,
            iv: state.iv(),
            data: protected,
        };
        check_status(
            cdm.decrypt(&request, &mut dest[offset..offset + protected_bytes]),
            &info.key_id,
        )?;

        state = state.advance(scheme, info.pattern, protected)?;

        offset += protected_bytes;
        total_remaining -= protected_bytes;
    }

    if total_remaining != 0 {
        log::error!("Extra remaining data after subsample handling");
        return Err(Error::InvalidContainerData(
            "subsamples do not cover the whole payload",
        ));
    }

    Ok(())
}

fn check_status(status: DecryptStatus, key_id: &[u8]) -> Result<()> {
    match status {
        DecryptStatus::Success => Ok(()),
        DecryptStatus::NotSupported => Err(Error::NotSupported(
            "the CDM cannot decrypt this content".to_owned(),
        )),
        DecryptStatus::KeyNotFound => Err(Error::KeyNotFound(hex::encode(key_id))),
        DecryptStatus::Unknown => Err(Error::UnknownError),
    }
}
