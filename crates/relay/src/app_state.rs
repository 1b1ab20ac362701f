use crate::api::ApiContext;
use shared::protocol::DocumentEvent;
use tokio::sync::{broadcast, Mutex};

pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<DocumentEvent>,
    /// Held from the storage write until its event is broadcast, so events go
    /// out in revision order.
    pub(crate) writes: Mutex<()>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, events: broadcast::Sender<DocumentEvent>) -> Self {
        Self {
            api,
            events,
            writes: Mutex::new(()),
        }
    }
}
