#![cfg_attr(docsrs, feature(doc_cfg))]

//! Media Source lifecycle for an embedded player.
//!
//! A [`MediaSource`] moves between `closed`, `open` and `ended` as it is
//! attached to a presentation element, fed source buffers and ended. Source
//! admission, duration and end of stream are delegated to a
//! [`PipelineController`]; signals raised by the pipeline reach the attached
//! [`PresentationElement`] through a [`PipelineClient`].
//!
//! # Quick Start
//!
//! ```
//! use mse_source::{MediaSource, ReadyState, Registry};
//!
//! let registry = Registry::new();
//! let source = MediaSource::with_basic_pipeline(&registry);
//! let url = source.lock().unwrap().url().to_owned();
//!
//! assert!(url.starts_with("blob:"));
//! assert!(registry.lookup(&url).is_some());
//! assert_eq!(source.lock().unwrap().ready_state(), ReadyState::Closed);
//!
//! drop(source);
//! assert!(registry.lookup(&url).is_none());
//! ```

mod error;
mod media_source;
mod precondition;
mod presentation;
mod registry;
mod source_buffer;

pub mod mime;
pub mod pipeline;

pub use error::{DomError, Result};
pub use media_source::{EndOfStreamError, MediaSource, MediaSourceEvent, ReadyState};
pub use pipeline::{
    AddSourceStatus, BasicPipeline, InitDataType, MediaError, MediaReadyState, PipelineClient,
    PipelineController, PipelineStatus, SourceType,
};
pub use precondition::{Operation, Precondition, Snapshot, evaluate};
pub use presentation::PresentationElement;
pub use registry::{Registry, random_url};
pub use source_buffer::SourceBuffer;
