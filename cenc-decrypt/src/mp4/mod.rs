//! Fragmented mp4 reading: box parser, the encryption related boxes and
//! sample extraction from media segments.

mod boxes;
mod fragment;
pub mod parser;

pub use boxes::{SchmBox, SencBox, SencSample, TencBox, TfhdBox, TrunBox};
pub use fragment::{Sample, TrackEncryption, decrypt_segment, extract_samples};
pub use parser::{Mp4Parser, ParsedBox};
