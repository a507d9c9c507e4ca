use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::filter::FilterQuery;

pub const DEFAULT_FILTER_DEBOUNCE: Duration = Duration::from_millis(300);

/// Forwards only the last pushed value once no new value has arrived for
/// `delay`. Keystroke-driven queries go through one of these before a
/// FILTER request is sent.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

pub type FilterDebouncer = Debouncer<FilterQuery>;

impl<T: Send + 'static> Debouncer<T> {
    /// Must be called from within a tokio runtime.
    pub fn spawn(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (output, output_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(delay, input_rx, output));
        (Self { input, task }, output_rx)
    }

    /// Returns false once the output side has been dropped.
    pub fn push(&self, value: T) -> bool {
        !self.task.is_finished() && self.input.send(value).is_ok()
    }
}

async fn run<T>(delay: Duration, mut input: mpsc::UnboundedReceiver<T>, output: mpsc::UnboundedSender<T>) {
    let mut pending: Option<T> = None;
    loop {
        let Some(value) = pending.take() else {
            match input.recv().await {
                Some(value) => pending = Some(value),
                None => break,
            }
            continue;
        };

        tokio::select! {
            next = input.recv() => match next {
                Some(newer) => pending = Some(newer),
                None => {
                    // flush on close
                    let _ = output.send(value);
                    break;
                }
            },
            _ = tokio::time::sleep(delay) => {
                if output.send(value).is_err() {
                    break;
                }
            }
        }
    }
}
