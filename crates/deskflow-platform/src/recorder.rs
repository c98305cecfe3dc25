use std::sync::Arc;

use deskflow_core::{Flow, RawEvent, to_steps};
use parking_lot::Mutex;

use crate::backend::{HookEvent, HookSet, HookSink, InputBackend};
use crate::error::Result;
use crate::hook_thread::HookThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

struct Buffer {
    state: RecorderState,
    events: Vec<RawEvent>,
}

/// Captures live keyboard and mouse input on its own hook thread and turns
/// it into steps once stopped.
pub struct InputRecorder {
    backend: Arc<dyn InputBackend>,
    buffer: Arc<Mutex<Buffer>>,
    thread: HookThread,
}

impl InputRecorder {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            buffer: Arc::new(Mutex::new(Buffer {
                state: RecorderState::Idle,
                events: Vec::new(),
            })),
            thread: HookThread::new("deskflow-recorder"),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.buffer.lock().state
    }

    pub fn is_recording(&self) -> bool {
        matches!(
            self.state(),
            RecorderState::Recording | RecorderState::Paused
        )
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RecorderState::Paused
    }

    pub fn event_count(&self) -> usize {
        self.buffer.lock().events.len()
    }

    /// Clears earlier events and installs both hooks. Has no effect while
    /// already recording. On hook failure the recorder stays idle.
    pub fn start(&mut self) -> Result<()> {
        {
            let mut buffer = self.buffer.lock();
            if matches!(buffer.state, RecorderState::Recording | RecorderState::Paused) {
                return Ok(());
            }
            buffer.events.clear();
            buffer.state = RecorderState::Recording;
        }

        let sink: HookSink = {
            let buffer = Arc::clone(&self.buffer);
            Arc::new(move |hook: HookEvent| {
                if hook.injected {
                    return;
                }
                let mut buffer = buffer.lock();
                if buffer.state == RecorderState::Recording {
                    buffer.events.push(hook.event);
                }
            })
        };

        let started = self
            .thread
            .start(Arc::clone(&self.backend), HookSet::ALL, sink, |_, _| {});
        if let Err(e) = &started {
            log::warn!("recording unavailable: {e}");
            self.buffer.lock().state = RecorderState::Idle;
        }
        started
    }

    /// Toggles between recording and paused; returns the new state.
    pub fn pause(&self) -> RecorderState {
        let mut buffer = self.buffer.lock();
        buffer.state = match buffer.state {
            RecorderState::Recording => RecorderState::Paused,
            RecorderState::Paused => RecorderState::Recording,
            other => other,
        };
        buffer.state
    }

    pub fn stop(&mut self) {
        self.thread.stop();
        let mut buffer = self.buffer.lock();
        if buffer.state != RecorderState::Idle {
            buffer.state = RecorderState::Stopped;
        }
        log::info!("recording stopped with {} events", buffer.events.len());
    }

    pub fn events(&self) -> Vec<RawEvent> {
        self.buffer.lock().events.clone()
    }

    pub fn to_steps(&self) -> Flow {
        to_steps(&self.buffer.lock().events)
    }
}

impl Drop for InputRecorder {
    fn drop(&mut self) {
        self.thread.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::fake::FakeBackend;
    use deskflow_core::{MouseButton, Step};

    #[test]
    fn test_state_machine() {
        let backend = Arc::new(FakeBackend::new());
        let mut recorder = InputRecorder::new(backend);
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(recorder.pause(), RecorderState::Idle);

        recorder.start().unwrap();
        assert!(recorder.is_recording());
        assert_eq!(recorder.pause(), RecorderState::Paused);
        assert!(recorder.is_paused());
        assert!(recorder.is_recording());
        assert_eq!(recorder.pause(), RecorderState::Recording);

        recorder.stop();
        assert_eq!(recorder.state(), RecorderState::Stopped);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_records_only_while_not_paused() {
        let backend = Arc::new(FakeBackend::new());
        let mut recorder = InputRecorder::new(backend.clone());
        recorder.start().unwrap();

        backend.inject(RawEvent::key_down(0x41, 0), false);
        backend.inject(RawEvent::key_up(0x41, 10), false);
        recorder.pause();
        backend.inject(RawEvent::key_down(0x42, 20), false);
        recorder.pause();
        backend.inject(RawEvent::mouse_down(MouseButton::Left, 4, 5, 30), false);
        backend.inject(RawEvent::mouse_up(MouseButton::Left, 4, 5, 40), false);
        recorder.stop();

        assert_eq!(recorder.event_count(), 4);
        let flow = recorder.to_steps();
        let steps: Vec<_> = flow.root_steps().collect();
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Keys { target, .. } if target == "a"));
        assert!(matches!(steps[1], Step::MouseClick { button: MouseButton::Left, .. }));
    }

    #[test]
    fn test_injected_events_are_dropped() {
        let backend = Arc::new(FakeBackend::new());
        let mut recorder = InputRecorder::new(backend.clone());
        recorder.start().unwrap();

        backend.inject(RawEvent::key_down(0x11, 0), true);
        backend.inject(RawEvent::mouse_move(10, 10, 5), false);
        recorder.stop();

        assert_eq!(recorder.events(), vec![RawEvent::mouse_move(10, 10, 5)]);
    }

    #[test]
    fn test_restart_clears_events() {
        let backend = Arc::new(FakeBackend::new());
        let mut recorder = InputRecorder::new(backend.clone());
        recorder.start().unwrap();
        backend.inject(RawEvent::key_down(0x41, 0), false);
        recorder.stop();
        assert_eq!(recorder.event_count(), 1);

        recorder.start().unwrap();
        assert_eq!(recorder.event_count(), 0);
        recorder.stop();
    }

    #[test]
    fn test_hook_failure_leaves_recorder_idle() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_hook_install(true);
        let mut recorder = InputRecorder::new(backend);

        assert!(matches!(recorder.start(), Err(PlatformError::HookInstall(_))));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }
}
