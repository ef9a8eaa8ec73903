//! Shared cancellation signal. Blocking workers poll it; async tasks await it.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct StopSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `stop` has been called, immediately if it already was.
    pub async fn stopped(&self) {
        let mut receiver = self.receiver.clone();
        // Sender is owned by every clone, so it outlives this receiver.
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
