use crate::{
    DomError, Result,
    mime,
    pipeline::{
        AddSourceStatus, BasicPipeline, ElementSlot, PipelineClient, PipelineController,
        SourceType,
    },
    precondition::{self, NO_ADDITIONAL_SOURCE_BUFFERS, Operation, Snapshot},
    presentation::PresentationElement,
    registry::{Registry, random_url},
    source_buffer::SourceBuffer,
};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadyState {
    #[default]
    Closed,
    Open,
    Ended,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Ended => "ended",
        })
    }
}

/// Event queued for delivery to script listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSourceEvent {
    SourceOpen,
    SourceEnded,
    SourceClose,
}

/// Argument of `endOfStream()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStreamError {
    Network,
    Decode,
}

/// Media source attachment lifecycle.
///
/// Owns its source buffers and pipeline controller and holds the attached
/// presentation element weakly. Construction registers the source under a
/// fresh blob url; dropping it unregisters that url first.
pub struct MediaSource {
    ready_state: ReadyState,
    url: String,
    registry: Arc<Registry>,
    controller: Box<dyn PipelineController>,
    source_buffers: HashMap<SourceType, Arc<SourceBuffer>>,
    element: ElementSlot,
    events: Vec<MediaSourceEvent>,
}

impl MediaSource {
    /// Creates a closed media source whose controller is built from the
    /// client it should signal through.
    pub fn new<F, C>(registry: &Arc<Registry>, make_controller: F) -> Arc<Mutex<Self>>
    where
        F: FnOnce(PipelineClient) -> C,
        C: PipelineController + 'static,
    {
        let element: ElementSlot = Arc::new(Mutex::new(None));
        let controller = make_controller(PipelineClient::new(element.clone()));

        let url = loop {
            let url = random_url();
            if !registry.contains(&url) {
                break url;
            }
        };

        let source = Arc::new(Mutex::new(Self {
            ready_state: ReadyState::Closed,
            url: url.clone(),
            registry: registry.clone(),
            controller: Box::new(controller),
            source_buffers: HashMap::new(),
            element,
            events: Vec::new(),
        }));

        registry.register(&url, Arc::downgrade(&source));
        source
    }

    /// Creates a media source driving a [`BasicPipeline`].
    pub fn with_basic_pipeline(registry: &Arc<Registry>) -> Arc<Mutex<Self>> {
        Self::new(registry, BasicPipeline::new)
    }

    pub fn is_type_supported(mime: &str) -> bool {
        mime::is_type_supported(mime)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Drains the events queued by state transitions.
    pub fn take_events(&mut self) -> Vec<MediaSourceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn source_buffer(&self, source_type: SourceType) -> Option<Arc<SourceBuffer>> {
        self.source_buffers.get(&source_type).cloned()
    }

    fn element_slot(&self) -> MutexGuard<'_, Option<Weak<dyn PresentationElement>>> {
        self.element.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ready_state: self.ready_state,
            any_updating: self.source_buffers.values().any(|x| x.is_updating()),
        }
    }

    fn check(&self, operation: Operation) -> Result<()> {
        precondition::evaluate(operation, self.snapshot()).check(operation)
    }

    /// Attaches to a presentation element and opens.
    ///
    /// # Panics
    ///
    /// If already attached.
    pub fn attach(&mut self, element: Weak<dyn PresentationElement>) {
        assert!(
            self.ready_state == ReadyState::Closed,
            "MediaSource already attached to a presentation element."
        );

        self.ready_state = ReadyState::Open;
        *self.element_slot() = Some(element);
        self.events.push(MediaSourceEvent::SourceOpen);
        log::debug!("{} opened", self.url);
    }

    /// Releases the element, resets the pipeline and closes every buffer.
    ///
    /// # Panics
    ///
    /// If not attached.
    pub fn detach(&mut self) {
        assert!(
            self.ready_state != ReadyState::Closed,
            "MediaSource not attached to a presentation element."
        );

        self.ready_state = ReadyState::Closed;
        *self.element_slot() = None;
        self.controller.reset();

        for buffer in self.source_buffers.values() {
            buffer.close_media_source();
        }
        self.source_buffers.clear();

        self.events.push(MediaSourceEvent::SourceClose);
        log::debug!("{} closed", self.url);
    }

    pub fn add_source_buffer(&mut self, mime: &str) -> Result<Arc<SourceBuffer>> {
        self.check(Operation::AddSourceBuffer)?;

        let source_type = match self.controller.add_source(mime) {
            AddSourceStatus::Success(source_type) => source_type,
            AddSourceStatus::NotSupported => {
                return Err(DomError::NotSupported(format!(
                    "The given type ('{}') is unsupported.",
                    mime
                )));
            }
            AddSourceStatus::NotAllowed => {
                return Err(DomError::NotSupported(
                    NO_ADDITIONAL_SOURCE_BUFFERS.to_owned(),
                ));
            }
        };

        assert_ne!(
            source_type,
            SourceType::Unknown,
            "pipeline admitted a source of unknown type"
        );
        assert!(
            !self.source_buffers.contains_key(&source_type),
            "{} SourceBuffer already registered",
            source_type
        );

        let buffer = Arc::new(SourceBuffer::new(source_type));
        self.source_buffers.insert(source_type, buffer.clone());
        log::debug!("{} added {} SourceBuffer for {:?}", self.url, source_type, mime);
        Ok(buffer)
    }

    pub fn end_of_stream(&mut self, error: Option<EndOfStreamError>) -> Result<()> {
        self.check(Operation::EndOfStream)?;

        if error.is_some() {
            return Err(DomError::NotSupported(
                "Calling endOfStream() with an argument is not supported.".to_owned(),
            ));
        }

        self.ready_state = ReadyState::Ended;
        self.events.push(MediaSourceEvent::SourceEnded);
        self.controller.end_of_stream();
        log::debug!("{} ended", self.url);
        Ok(())
    }

    /// Presentation duration in seconds, NaN when unknown.
    pub fn duration(&self) -> f64 {
        self.controller.duration()
    }

    pub fn set_duration(&mut self, duration: f64) -> Result<()> {
        if duration.is_nan() {
            return Err(DomError::Type("Cannot set duration to NaN.".to_owned()));
        }

        self.check(Operation::SetDuration)?;
        self.controller.set_duration(duration);
        Ok(())
    }

    pub fn source_buffers(&self) -> Result<Vec<Arc<SourceBuffer>>> {
        Err(DomError::NotImplemented("sourceBuffers"))
    }

    pub fn active_source_buffers(&self) -> Result<Vec<Arc<SourceBuffer>>> {
        Err(DomError::NotImplemented("activeSourceBuffers"))
    }

    pub fn remove_source_buffer(&mut self, _buffer: &SourceBuffer) -> Result<()> {
        Err(DomError::NotImplemented("removeSourceBuffer"))
    }

    pub fn set_live_seekable_range(&mut self, _start: f64, _end: f64) -> Result<()> {
        Err(DomError::NotImplemented("setLiveSeekableRange"))
    }

    pub fn clear_live_seekable_range(&mut self) -> Result<()> {
        Err(DomError::NotImplemented("clearLiveSeekableRange"))
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        self.registry.unregister(&self.url);
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("ready_state", &self.ready_state)
            .field("url", &self.url)
            .field("source_buffers", &self.source_buffers)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
