/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-player/blob/7098f43f70119226bca2e5583833aaf27b498e33/lib/util/mp4_parser.js

*/

use crate::{Error, Reader, Result};
use std::{collections::HashMap, rc::Rc};

/// `Result` type returned by box callbacks.
pub type HandlerResult = Result<()>;
/// Callback invoked with the payload of a declared box.
pub type CallbackType = Rc<dyn Fn(ParsedBox) -> HandlerResult>;

/// Callback driven mp4 box parser.
///
/// Only declared boxes are visited; everything else is skipped.
#[derive(Clone, Default)]
pub struct Mp4Parser {
    headers: HashMap<u32, BoxType>,
    box_definitions: HashMap<u32, CallbackType>,
}

impl Mp4Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a box type as a Basic Box.
    pub fn base_box<F>(mut self, type_: &str, definition: F) -> Self
    where
        F: Fn(ParsedBox) -> HandlerResult + 'static,
    {
        let type_code = type_from_string(type_);
        self.headers.insert(type_code, BoxType::BasicBox);
        self.box_definitions.insert(type_code, Rc::new(definition));
        self
    }

    /// Declare a box type as a Full Box.
    pub fn full_box<F>(mut self, type_: &str, definition: F) -> Self
    where
        F: Fn(ParsedBox) -> HandlerResult + 'static,
    {
        let type_code = type_from_string(type_);
        self.headers.insert(type_code, BoxType::FullBox);
        self.box_definitions.insert(type_code, Rc::new(definition));
        self
    }

    /// Parse the given data using the added callbacks.
    ///
    /// With `partial_okay` a box running past the end of `data` is truncated
    /// instead of failing, which lets an init segment be read from a prefix.
    pub fn parse(&self, data: &[u8], partial_okay: bool) -> HandlerResult {
        let mut reader = Reader::new(data.to_vec());

        while reader.has_more_data() {
            self.parse_next(0, &mut reader, partial_okay)?;
        }

        Ok(())
    }

    fn parse_next(&self, abs_start: u64, reader: &mut Reader, partial_okay: bool) -> HandlerResult {
        let start = reader.get_position();

        let mut size = reader.read_u32()? as u64;
        let type_ = reader.read_u32()?;
        let mut has_64_bit_size = false;

        match size {
            0 => size = reader.get_length() - start,
            1 => {
                size = reader.read_u64()?;
                has_64_bit_size = true;
            }
            _ => (),
        }

        if size < reader.get_position() - start {
            return Err(Error::Mp4(format!(
                "{} box declares size {} smaller than its header",
                type_to_string(type_),
                size
            )));
        }

        let Some(box_end) = start.checked_add(size) else {
            return Err(Error::Mp4(format!(
                "{} box size {} overflows",
                type_to_string(type_),
                size
            )));
        };

        let Some(box_definition) = self.box_definitions.get(&type_) else {
            // Skip to the end of the box, or of the data for a truncated box.
            let skip_length = (box_end - reader.get_position()).min(reader.remaining());
            reader.skip(skip_length)?;
            return Ok(());
        };

        let mut version = None;
        let mut flags = None;

        if self.headers.get(&type_) == Some(&BoxType::FullBox) {
            let version_and_flags = reader.read_u32()?;
            version = Some(version_and_flags >> 24);
            flags = Some(version_and_flags & 0xFFFFFF);
        }

        let mut end = box_end;

        if end > reader.get_length() {
            if !partial_okay {
                return Err(Error::Mp4(format!(
                    "{} box runs past the end of the data",
                    type_to_string(type_)
                )));
            }
            end = reader.get_length();
        }

        let payload = reader.read_bytes(end.saturating_sub(reader.get_position()) as usize)?;

        box_definition(ParsedBox {
            name: type_to_string(type_),
            parser: self.clone(),
            partial_okay,
            start: start + abs_start,
            size: size as usize,
            version,
            flags,
            reader: Reader::new(payload),
            has_64_bit_size,
        })
    }
}

// CALLBACKS

/// Treat the body of a box as a series of boxes.
pub fn children(mut box_: ParsedBox) -> HandlerResult {
    let header_size = box_.header_size();

    while box_.reader.has_more_data() {
        box_.parser
            .parse_next(box_.start + header_size, &mut box_.reader, box_.partial_okay)?;
    }

    Ok(())
}

/// Treat the body of a box as a sample description: a 4 byte entry count
/// followed by that many boxes.
pub fn sample_description(mut box_: ParsedBox) -> HandlerResult {
    let header_size = box_.header_size();
    let count = box_.reader.read_u32()?;

    for _ in 0..count {
        if !box_.reader.has_more_data() {
            break;
        }

        box_.parser
            .parse_next(box_.start + header_size, &mut box_.reader, box_.partial_okay)?;
    }

    Ok(())
}

/// Treat the body of a box as a visual sample entry: 78 bytes of codec
/// parameters followed by child boxes.
pub fn visual_sample_entry(mut box_: ParsedBox) -> HandlerResult {
    box_.reader.skip(78)?;
    children(box_)
}

/// Treat the body of a box as an audio sample entry: version dependent codec
/// parameters followed by child boxes.
pub fn audio_sample_entry(mut box_: ParsedBox) -> HandlerResult {
    // reserved(6) + data reference index(2)
    box_.reader.skip(8)?;
    let version = box_.reader.read_u16()?;
    // revision(2) + reserved(4)
    box_.reader.skip(6)?;

    match version {
        2 => box_.reader.skip(48)?,
        1 => box_.reader.skip(12 + 16)?,
        _ => box_.reader.skip(12)?,
    }

    children(box_)
}

// UTILS

/// Convert an ascii string name to the integer type for a box.
pub fn type_from_string(name: &str) -> u32 {
    assert!(name.len() == 4, "MP4 box names must be 4 characters long");
    name.bytes().fold(0, |code, chr| (code << 8) | chr as u32)
}

/// Convert an integer type from a box into an ascii string name.
pub fn type_to_string(type_: u32) -> String {
    String::from_utf8_lossy(&type_.to_be_bytes()).into_owned()
}

#[derive(Clone, Copy, PartialEq)]
enum BoxType {
    BasicBox,
    FullBox,
}

/// Parsed mp4 box.
pub struct ParsedBox {
    /// The box name, a 4-character string (fourcc).
    pub name: String,
    /// Parser configuration to use for child boxes.
    pub parser: Mp4Parser,
    pub partial_okay: bool,
    /// Absolute start of this box (before the header) in the parsed buffer.
    pub start: u64,
    /// The size of this box (including the header).
    pub size: usize,
    /// The version for a full box, `None` for basic boxes.
    pub version: Option<u32>,
    /// The flags for a full box, `None` for basic boxes.
    pub flags: Option<u32>,
    /// Reader over this box's payload only.
    pub reader: Reader,
    pub has_64_bit_size: bool,
}

impl ParsedBox {
    pub fn header_size(&self) -> u64 {
        let basic_header_size = 8;
        let large_size_field = if self.has_64_bit_size { 8 } else { 0 };
        let version_and_flags_size = if self.flags.is_some() { 4 } else { 0 };
        basic_header_size + large_size_field + version_and_flags_size
    }
}
