pub mod app;
pub mod view;

use std::sync::Arc;

use anyhow::Result;
use slide_common::SlideConfig;
use slide_core::{EventSink, Presenter};

pub use app::{App, Command, Field, Mode};

/// Run the interactive presenter until the user quits.
pub async fn run_presenter(config: &SlideConfig) -> Result<()> {
    let (events, rx) = EventSink::channel();
    let presenter = Arc::new(Presenter::from_config(config, events)?);
    tracing::info!(model = %config.model, "presenter started");
    app::run_app(presenter, rx).await
}
