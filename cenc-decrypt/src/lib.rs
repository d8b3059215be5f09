#![cfg_attr(docsrs, feature(doc_cfg))]

//! Subsample decryption of Common Encryption (CENC) protected packets.
//!
//! Packets carry their encryption parameters as side data. The decryption
//! engine walks the subsample map, keeps the IV and block offset in step for
//! the packet's protection scheme and hands each protected run to a [`Cdm`].
//!
//! # Supported Encryption Schemes
//!
//! | Scheme | Description | Cipher Mode |
//! |--------|-------------|-------------|
//! | `cenc` | AES-CTR full sample encryption | AES-128-CTR |
//! | `cens` | AES-CTR pattern encryption | AES-128-CTR |
//! | `cbc1` | AES-CBC full sample encryption | AES-128-CBC |
//! | `cbcs` | AES-CBC pattern encryption, constant IV | AES-128-CBC |
//!
//! # Quick Start
//!
//! ```no_run
//! use cenc_decrypt::{ClearKeyCdm, mp4::{TrackEncryption, decrypt_segment}};
//! use std::fs;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cdm = ClearKeyCdm::builder()
//!         .key("eb676abbcb345e96bbcf616630f1a3da", "100b6c20940f779a4589152b57d2dacb")?
//!         .build()?;
//!
//!     let init = fs::read("init.mp4")?;
//!     let segment = fs::read("segment.m4s")?;
//!
//!     if let Some(track) = TrackEncryption::from_init(&init)? {
//!         fs::write("output.m4s", decrypt_segment(&cdm, &track, &segment)?)?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Single Packets
//!
//! ```no_run
//! use cenc_decrypt::{ClearKeyCdm, EncryptionInfo, Packet, Subsample, scheme::CENC};
//!
//! let cdm = ClearKeyCdm::builder()
//!     .key("eb676abbcb345e96bbcf616630f1a3da", "100b6c20940f779a4589152b57d2dacb")?
//!     .build()?;
//!
//! let info = EncryptionInfo {
//!     scheme: CENC,
//!     key_id: hex::decode("eb676abbcb345e96bbcf616630f1a3da")?,
//!     iv: vec![0; 8],
//!     subsamples: vec![Subsample::new(5, 27)],
//!     ..Default::default()
//! };
//!
//! let packet = Packet::encrypted(vec![0; 32], &info);
//! let clear = packet.decrypt_to_vec(&cdm)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cdm;
mod decrypter;
mod error;
mod iv;
mod metadata;
mod reader;

pub mod mp4;
pub mod scheme;

pub use cdm::{Cdm, ClearKeyCdm, ClearKeyCdmBuilder, DecryptRequest, DecryptStatus, parse_hex_16};
pub use error::{Error, Result};
pub use iv::{AES_BLOCK_SIZE, IvState, increment_iv};
pub use metadata::{EncryptionInfo, Packet, SideData, SideDataKind, Subsample};
pub use reader::Reader;
pub use scheme::{EncryptionPattern, EncryptionScheme, ProtectionScheme};
