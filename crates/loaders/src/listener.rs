//! Scoped native listeners
//!
//! Every loader attaches its listeners through a [`ListenerGuard`], which
//! forwards events into a channel and detaches everything it attached when
//! dropped. Resolution, rejection, timeout and cancellation all leave the
//! element with no listeners from the load.

use std::sync::Arc;
use std::time::Duration;

use media_preload_scheduler::{CancellationToken, MediaError, MediaResult};
use tokio::sync::mpsc;

use crate::platform::{ElementHandle, ListenerId, MediaEvent};

/// Listeners attached for the duration of one load
pub struct ListenerGuard {
    element: ElementHandle,
    ids: Vec<ListenerId>,
}

impl ListenerGuard {
    /// Attach one forwarding listener per event
    pub fn channel(
        element: &ElementHandle,
        events: &[MediaEvent],
    ) -> (Self, mpsc::UnboundedReceiver<MediaEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let ids = events
            .iter()
            .map(|&event| {
                let tx = tx.clone();
                element.add_listener(
                    event,
                    Arc::new(move |fired: MediaEvent| {
                        // Receiver gone means the load already settled
                        let _ = tx.send(fired);
                    }),
                )
            })
            .collect();

        let guard = Self {
            element: element.clone(),
            ids,
        };
        (guard, rx)
    }

    /// Number of listeners still attached
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if no listeners are attached
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.element.remove_listener(id);
        }
    }
}

/// Wait until `resolve` maps an event to an outcome
///
/// Cancellation wins over everything else and yields `Aborted`; the deadline
/// yields `Timeout`.
pub(crate) async fn await_signal<T>(
    events: &mut mpsc::UnboundedReceiver<MediaEvent>,
    token: &CancellationToken,
    timeout: Duration,
    mut resolve: impl FnMut(MediaEvent) -> Option<MediaResult<T>>,
) -> MediaResult<T> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MediaError::Aborted),
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(outcome) = resolve(event) {
                        return outcome;
                    }
                }
                None => {
                    return Err(MediaError::NetworkOrDecode(
                        "element dropped its listeners".to_string(),
                    ))
                }
            },
            _ = &mut deadline => return Err(MediaError::Timeout(timeout)),
        }
    }
}

/// Error for a native `Error` event on `element`
pub(crate) fn native_error(element: &ElementHandle) -> MediaError {
    MediaError::NetworkOrDecode(
        element
            .error_message()
            .unwrap_or_else(|| "media element reported an error".to_string()),
    )
}
