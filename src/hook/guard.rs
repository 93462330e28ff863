use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::event::{Record, RequestEvent};
use crate::exporter::Exporter;

/// Finishes one instrumented request. Only the first [`RequestGuard::finish`]
/// has an effect.
#[derive(Debug)]
pub struct RequestGuard {
    event: Mutex<Option<RequestEvent>>,
    exporter: Exporter,
    await_export: bool,
}

impl RequestGuard {
    #[must_use]
    pub fn new(event: RequestEvent, exporter: Exporter, await_export: bool) -> Self {
        RequestGuard {
            event: Mutex::new(Some(event)),
            exporter,
            await_export,
        }
    }

    fn take_event(&self) -> Option<RequestEvent> {
        self.event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The event as it will be exported, `None` once finished.
    #[must_use]
    pub fn pending_event(&self) -> Option<RequestEvent> {
        self.event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Finalizes the event with `status_code` and hands it to the exporter.
    pub async fn finish(&self, status_code: u16) {
        let Some(mut event) = self.take_event() else {
            debug!("HOOK | Request already finished, ignoring status {status_code}");
            return;
        };

        if let Err(e) = event.finalize(status_code) {
            debug!("HOOK | {e}");
            return;
        }

        debug!(
            "HOOK | {} {} finished with {} in {} ns",
            event.method, event.pathname, event.status_code, event.duration
        );

        let records = vec![Record::from(event)];
        if self.await_export {
            self.exporter.send_immediate(records).await;
        } else {
            self.exporter.send_now(records);
        }
    }
}
