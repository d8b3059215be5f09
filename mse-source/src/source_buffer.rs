use crate::pipeline::SourceType;
use std::sync::atomic::{AtomicBool, Ordering};

/// A source buffer registered with a media source.
///
/// `updating` is driven by whoever appends data; the media source only reads
/// it to gate `end_of_stream` and `set_duration`.
#[derive(Debug)]
pub struct SourceBuffer {
    source_type: SourceType,
    updating: AtomicBool,
    attached: AtomicBool,
}

impl SourceBuffer {
    pub(crate) fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            updating: AtomicBool::new(false),
            attached: AtomicBool::new(true),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn set_updating(&self, updating: bool) {
        self.updating.store(updating, Ordering::Release);
    }

    /// `false` once the owning media source was detached.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn close_media_source(&self) {
        self.attached.store(false, Ordering::Release);
        self.updating.store(false, Ordering::Release);
    }
}
