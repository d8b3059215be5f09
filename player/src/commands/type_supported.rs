use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use mse_source::{
    InitDataType, MediaError, MediaReadyState, MediaSource, PipelineStatus, PresentationElement,
    Registry, SourceType,
};
use std::sync::Arc;

/// Check MIME types against the media source admission rules.
#[derive(Debug, Clone, Args)]
pub struct TypeSupported {
    /// MIME types to check, e.g. 'video/mp4; codecs="avc1.42E01E"'.
    #[arg(required = true)]
    types: Vec<String>,

    /// Also add a source buffer for every type to an open media source.
    /// Only one source buffer per stream type (audio, video) is admitted.
    #[arg(long)]
    add: bool,

    /// Duration in seconds to set before ending the stream.
    #[arg(long, requires = "add")]
    duration: Option<f64>,
}

/// Logs the signals a media source forwards to its presentation.
struct LogElement;

impl PresentationElement for LogElement {
    fn on_ready_state_changed(&self, state: MediaReadyState) {
        log::debug!("ready state changed to {:?}", state);
    }

    fn on_pipeline_status_changed(&self, status: PipelineStatus) {
        log::debug!("pipeline status changed to {:?}", status);
    }

    fn on_media_error(&self, source: SourceType, error: MediaError) {
        log::error!("{} source: {}", source, error);
    }

    fn schedule_waiting_for_key(&self) {
        log::info!("waiting for key");
    }

    fn schedule_encrypted(&self, init_data_type: InitDataType, init_data: Vec<u8>) {
        log::info!(
            "encrypted ({:?}) {}",
            init_data_type,
            hex::encode(init_data)
        );
    }
}

impl TypeSupported {
    pub fn execute(self) -> Result<()> {
        for mime in &self.types {
            let supported = MediaSource::is_type_supported(mime);
            println!(
                "{} {}",
                if supported {
                    "supported".green()
                } else {
                    "unsupported".red()
                },
                mime
            );
        }

        if self.add {
            self.session()?;
        }

        Ok(())
    }

    fn session(&self) -> Result<()> {
        let registry = Registry::new();
        let element: Arc<dyn PresentationElement> = Arc::new(LogElement);
        let source = MediaSource::with_basic_pipeline(&registry);
        let mut source = match source.lock() {
            Ok(x) => x,
            Err(_) => bail!("media source lock poisoned"),
        };

        source.attach(Arc::downgrade(&element));
        log::info!("{} is {}", source.url(), source.ready_state());

        for mime in &self.types {
            match source.add_source_buffer(mime) {
                Ok(buffer) => println!(
                    "{} {} source buffer for {}",
                    "added".green(),
                    buffer.source_type(),
                    mime
                ),
                Err(e) => println!("{} {}: {}", "rejected".red(), mime, e),
            }
        }

        if let Some(duration) = self.duration {
            source.set_duration(duration)?;
            log::info!("duration set to {}s", source.duration());
        }

        source.end_of_stream(None)?;

        for event in source.take_events() {
            log::debug!("event {:?}", event);
        }

        log::info!("{} is {}", source.url(), source.ready_state());
        Ok(())
    }
}
