//! The presentation element a media source is attached to.

use crate::pipeline::{InitDataType, MediaError, MediaReadyState, PipelineStatus, SourceType};

/// Receiver of pipeline signals, typically a video element.
///
/// The media source only keeps a weak reference; implementations use
/// interior mutability. `schedule_*` calls queue an event for later delivery
/// and must not call back into the media source.
pub trait PresentationElement: Send + Sync {
    fn on_ready_state_changed(&self, state: MediaReadyState);
    fn on_pipeline_status_changed(&self, status: PipelineStatus);
    fn on_media_error(&self, source: SourceType, error: MediaError);
    fn schedule_waiting_for_key(&self);
    fn schedule_encrypted(&self, init_data_type: InitDataType, init_data: Vec<u8>);
}
