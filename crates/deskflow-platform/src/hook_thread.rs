use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::bounded;

use crate::backend::{HookSession, HookSet, HookSink, InputBackend, LoopMessage, LoopSignal};
use crate::error::{PlatformError, Result};

struct Running {
    signal: Arc<dyn LoopSignal>,
    handle: JoinHandle<()>,
}

/// One dedicated thread that opens a hook session and drains its message
/// loop until stopped.
pub struct HookThread {
    name: String,
    running: Option<Running>,
}

impl HookThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: None,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn signal(&self) -> Option<Arc<dyn LoopSignal>> {
        self.running.as_ref().map(|r| Arc::clone(&r.signal))
    }

    /// Spawns the thread unless it is already running. `on_message` sees
    /// one `Wake` right after the session opens and then every non-quit
    /// message. Returns the hook installation error if the session could
    /// not be opened.
    pub fn start<F>(
        &mut self,
        backend: Arc<dyn InputBackend>,
        hooks: HookSet,
        sink: HookSink,
        mut on_message: F,
    ) -> Result<()>
    where
        F: FnMut(&mut dyn HookSession, LoopMessage) + Send + 'static,
    {
        if self.running.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<Arc<dyn LoopSignal>>>(1);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut session = match backend.open_session(hooks, sink) {
                    Ok(session) => session,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(session.signal()));
                log::debug!("{name}: message loop running");

                on_message(session.as_mut(), LoopMessage::Wake);
                loop {
                    match session.next_message() {
                        LoopMessage::Quit => break,
                        message => on_message(session.as_mut(), message),
                    }
                }
                log::debug!("{name}: message loop finished");
            })
            .map_err(|e| PlatformError::Thread(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| PlatformError::Thread(format!("{} exited during startup", self.name)));

        match ready {
            Ok(Ok(signal)) => {
                self.running = Some(Running { signal, handle });
                Ok(())
            }
            Ok(Err(e)) | Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    /// Posts quit and joins. Does nothing when not running.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.signal.quit();
            if running.handle.join().is_err() {
                log::warn!("{}: hook thread panicked", self.name);
            }
        }
    }
}

impl Drop for HookThread {
    fn drop(&mut self) {
        self.stop();
    }
}
