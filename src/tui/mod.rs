//! TUI module for terminal user interfaces

mod validation_view;

pub use validation_view::{ChannelProgress, ProgressEvent, ValidationView};

use crate::proxy::{Candidate, Dispatcher, Probe, RunSummary};
use crate::Result;

/// Run the dispatcher in the background while a [`ValidationView`] shows its
/// progress. Returns `None` if the user quit before the run completed.
pub async fn run_with_view<P: Probe + 'static>(
    dispatcher: Dispatcher<P>,
    candidates: Vec<Candidate>,
) -> Result<Option<RunSummary>> {
    let output_dir = dispatcher.store().dir().display().to_string();
    let mut view = ValidationView::new(candidates.len(), output_dir);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let progress = ChannelProgress::new(tx);
        dispatcher.run(candidates, &progress).await
    });

    view.run(rx, task).await
}
