//! MIME type parsing for source buffer admission.

use crate::pipeline::SourceType;

const CONTAINERS: &[&str] = &["mp4", "webm", "mp2t"];

const VIDEO_CODECS: &[&str] = &["avc1", "avc3", "hvc1", "hev1", "vp8", "vp9", "vp09", "av01"];

const AUDIO_CODECS: &[&str] = &["mp4a", "opus", "vorbis", "flac", "ac-3", "ec-3"];

/// A parsed and supported `type/subtype; codecs="..."` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub source_type: SourceType,
    /// Container subtype, e.g. `mp4`.
    pub container: String,
    /// The single codec string, e.g. `avc1.42E01E`.
    pub codec: Option<String>,
}

/// Parses `mime`, returning `None` when it is malformed or unsupported.
///
/// ```
/// use mse_source::{mime, SourceType};
///
/// let parsed = mime::parse(r#"video/mp4; codecs="avc1.42E01E""#).unwrap();
/// assert_eq!(parsed.source_type, SourceType::Video);
/// assert_eq!(parsed.codec.as_deref(), Some("avc1.42E01E"));
/// assert!(mime::parse("video/x-flv").is_none());
/// ```
pub fn parse(mime: &str) -> Option<ContentType> {
    let mut parts = mime.split(';');
    let essence = parts.next()?.trim().to_ascii_lowercase();
    let (type_, subtype) = essence.split_once('/')?;

    let source_type = match type_ {
        "video" => SourceType::Video,
        "audio" => SourceType::Audio,
        _ => return None,
    };

    if !CONTAINERS.contains(&subtype) {
        return None;
    }

    let mut codec = None;

    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            if param.trim().is_empty() {
                continue;
            }
            return None;
        };

        if !key.trim().eq_ignore_ascii_case("codecs") {
            continue;
        }

        let codecs: Vec<&str> = value
            .trim()
            .trim_matches('"')
            .split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .collect();

        // Only a single elementary stream per source buffer.
        let [single] = codecs.as_slice() else {
            return None;
        };

        // The codec must belong to the declared top-level type.
        if codec_source_type(single) != Some(source_type) {
            return None;
        }

        codec = Some((*single).to_owned());
    }

    Some(ContentType {
        source_type,
        container: subtype.to_owned(),
        codec,
    })
}

/// Classifies a codec by its family, the part before the first `.`.
fn codec_source_type(codec: &str) -> Option<SourceType> {
    let family = codec.split('.').next().unwrap_or_default().to_ascii_lowercase();

    if VIDEO_CODECS.contains(&family.as_str()) {
        Some(SourceType::Video)
    } else if AUDIO_CODECS.contains(&family.as_str()) {
        Some(SourceType::Audio)
    } else {
        None
    }
}

/// `true` when `mime` would be admitted by [`parse`].
pub fn is_type_supported(mime: &str) -> bool {
    parse(mime).is_some()
}
