use std::sync::atomic::{AtomicBool, Ordering};
use std::{borrow::BorrowMut, sync::Arc};

use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// A one-shot stop signal that can be observed by any number of listeners.
///
/// The runner uses one handle for the whole scenario and one per virtual user, so that the
/// scheduler can retire a single virtual user without affecting the others.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
    signalled: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
            signalled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        // Latch first so listeners created after this call still observe the signal.
        self.signalled.store(true, Ordering::Release);

        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::trace!("No listeners for shutdown signal: {e:?}");
        }
    }

    /// Whether [ShutdownHandle::shutdown] has been called on this handle or any of its clones.
    pub fn is_shutdown(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe(), self.signalled.clone())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
    signalled: Arc<AtomicBool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>, signalled: Arc<AtomicBool>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            signalled,
        }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the virtual user or scenario can shut down.
    ///
    /// Once the signal has been observed this keeps returning true.
    pub fn should_shutdown(&mut self) -> bool {
        if self.signalled.load(Ordering::Acquire) {
            return true;
        }

        match self.receiver.try_lock() {
            Ok(mut guard) => {
                match guard.try_recv() {
                    Ok(_) => true,
                    Err(tokio::sync::broadcast::error::TryRecvError::Closed) => true,
                    // If the receiver is empty or lagged then we should not shutdown.
                    Err(_) => false,
                }
            }
            Err(_) => false,
        }
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future so
    /// that the shutdown signal can be used to cancel other work in progress, such as the pacing
    /// sleep between iterations.
    pub async fn wait_for_shutdown(&mut self) {
        if self.signalled.load(Ordering::Acquire) {
            return;
        }

        // Any result means the signal was sent, lagged past or the handle is gone.
        let _ = self.receiver.borrow_mut().lock().await.recv().await;
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
