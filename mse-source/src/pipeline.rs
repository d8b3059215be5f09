//! Pipeline controller capability, the signals it raises and a reference
//! implementation.

use crate::{mime, presentation::PresentationElement};
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, PoisonError, Weak},
};
use thiserror::Error;

/// Elementary stream type of a source buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceType {
    #[default]
    Unknown,
    Audio,
    Video,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Audio => "audio",
            Self::Video => "video",
        })
    }
}

/// Outcome of asking the pipeline to admit a new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddSourceStatus {
    Success(SourceType),
    /// The type could not be parsed or is not playable.
    NotSupported,
    /// No further source of this type can be added.
    NotAllowed,
}

/// How much media the pipeline can present, as reported to the element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum MediaReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineStatus {
    #[default]
    Initializing,
    Playing,
    Paused,
    SeekingPlay,
    SeekingPause,
    Stalled,
    Ended,
    Errored,
}

/// Error raised while demuxing, decrypting or decoding a source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    #[error("decryption failed: {0}")]
    Decrypt(#[from] cenc_decrypt::Error),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("demux failed: {0}")]
    Demux(String),
}

/// Format of the initialization data carried by an `encrypted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitDataType {
    Cenc,
    KeyIds,
    WebM,
}

/// Owner of duration, source admission and end of stream on the playback side.
pub trait PipelineController: Send {
    fn add_source(&mut self, mime: &str) -> AddSourceStatus;
    fn end_of_stream(&mut self);
    /// Presentation duration in seconds, NaN when unknown.
    fn duration(&self) -> f64;
    fn set_duration(&mut self, duration: f64);
    /// Drops every source and returns to the initial state.
    fn reset(&mut self);
}

pub(crate) type ElementSlot = Arc<Mutex<Option<Weak<dyn PresentationElement>>>>;

/// Handle a pipeline uses to signal the attached presentation element.
///
/// Signals raised while no element is attached, or after the element is
/// gone, are dropped.
#[derive(Clone)]
pub struct PipelineClient {
    slot: ElementSlot,
}

impl PipelineClient {
    pub(crate) fn new(slot: ElementSlot) -> Self {
        Self { slot }
    }

    /// A client with no media source behind it.
    pub fn detached() -> Self {
        Self::new(Arc::new(Mutex::new(None)))
    }

    fn element(&self) -> Option<Arc<dyn PresentationElement>> {
        let element = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);

        if element.is_none() {
            log::trace!("no presentation element attached, dropping pipeline signal");
        }

        element
    }

    pub fn ready_state_changed(&self, state: MediaReadyState) {
        if let Some(element) = self.element() {
            element.on_ready_state_changed(state);
        }
    }

    pub fn pipeline_status_changed(&self, status: PipelineStatus) {
        if let Some(element) = self.element() {
            element.on_pipeline_status_changed(status);
        }
    }

    pub fn media_error(&self, source: SourceType, error: MediaError) {
        if let Some(element) = self.element() {
            element.on_media_error(source, error);
        }
    }

    pub fn waiting_for_key(&self) {
        if let Some(element) = self.element() {
            element.schedule_waiting_for_key();
        }
    }

    pub fn encrypted(&self, init_data_type: InitDataType, init_data: Vec<u8>) {
        if let Some(element) = self.element() {
            element.schedule_encrypted(init_data_type, init_data);
        }
    }
}

/// Pipeline that admits one audio and one video source and keeps the
/// duration, without playing anything.
pub struct BasicPipeline {
    client: PipelineClient,
    sources: HashSet<SourceType>,
    duration: f64,
    ended: bool,
}

impl BasicPipeline {
    pub fn new(client: PipelineClient) -> Self {
        Self {
            client,
            sources: HashSet::new(),
            duration: f64::NAN,
            ended: false,
        }
    }

    pub fn client(&self) -> &PipelineClient {
        &self.client
    }

    pub fn has_source(&self, source_type: SourceType) -> bool {
        self.sources.contains(&source_type)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl PipelineController for BasicPipeline {
    fn add_source(&mut self, mime: &str) -> AddSourceStatus {
        let Some(content_type) = mime::parse(mime) else {
            log::debug!("rejecting unsupported type {:?}", mime);
            return AddSourceStatus::NotSupported;
        };

        if !self.sources.insert(content_type.source_type) {
            log::debug!("{} source already present", content_type.source_type);
            return AddSourceStatus::NotAllowed;
        }

        AddSourceStatus::Success(content_type.source_type)
    }

    fn end_of_stream(&mut self) {
        self.ended = true;
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    fn reset(&mut self) {
        self.sources.clear();
        self.duration = f64::NAN;
        self.ended = false;
    }
}
