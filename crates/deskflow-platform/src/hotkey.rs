use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, unbounded};
use deskflow_core::{HotkeyCombo, MouseButton, RawEventKind};
use parking_lot::Mutex;

use crate::backend::{HookEvent, HookSession, HookSet, HookSink, InputBackend, LoopMessage};
use crate::error::{PlatformError, Result};
use crate::hook_thread::HookThread;

pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

enum Command {
    Register {
        id: i32,
        combo: HotkeyCombo,
        text: String,
    },
    Unregister(i32),
}

#[derive(Default)]
struct Registry {
    pending: VecDeque<Command>,
    callbacks: HashMap<i32, HotkeyCallback>,
    combos: HashMap<i32, (HotkeyCombo, String)>,
    middle_click: Option<HotkeyCallback>,
}

struct Worker {
    tx: Sender<HotkeyCallback>,
    handle: JoinHandle<()>,
}

/// Routes global hotkeys and middle clicks to callbacks. Registration from
/// any thread is queued and applied by the hook thread after a wake signal.
/// Callbacks run on a separate worker thread, never inside the hook loop.
pub struct HotkeyDispatcher {
    backend: Arc<dyn InputBackend>,
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicI32,
    thread: HookThread,
    worker: Option<Worker>,
}

impl HotkeyDispatcher {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            registry: Arc::default(),
            next_id: AtomicI32::new(1),
            thread: HookThread::new("deskflow-hotkeys"),
            worker: None,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Returns the new id, or 0 when `combo` has no usable key. A previous
    /// registration of the same combo is replaced.
    pub fn register(&self, combo: &str, callback: HotkeyCallback) -> i32 {
        let parsed = HotkeyCombo::parse(combo);
        if !parsed.is_valid() {
            log::warn!("invalid hotkey '{combo}', not registered");
            return 0;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut registry = self.registry.lock();
            let replaced: Vec<i32> = registry
                .combos
                .iter()
                .filter(|(_, (c, _))| *c == parsed)
                .map(|(id, _)| *id)
                .collect();
            for old in replaced {
                log::debug!("hotkey '{combo}' re-registered, dropping id {old}");
                registry.callbacks.remove(&old);
                registry.combos.remove(&old);
                registry.pending.push_back(Command::Unregister(old));
            }

            registry.callbacks.insert(id, callback);
            registry.combos.insert(id, (parsed, combo.to_owned()));
            registry.pending.push_back(Command::Register {
                id,
                combo: parsed,
                text: combo.to_owned(),
            });
        }
        self.wake();
        id
    }

    /// Returns whether `id` was registered.
    pub fn unregister(&self, id: i32) -> bool {
        let known = {
            let mut registry = self.registry.lock();
            let known = registry.callbacks.remove(&id).is_some();
            if known {
                registry.combos.remove(&id);
                registry.pending.push_back(Command::Unregister(id));
            }
            known
        };
        if known {
            self.wake();
        }
        known
    }

    pub fn registered_count(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    /// Takes effect on the next `start`, which installs the mouse hook only
    /// when a middle-click callback is set.
    pub fn set_middle_click(&self, callback: Option<HotkeyCallback>) {
        self.registry.lock().middle_click = callback;
    }

    /// Starts the hook thread. A failing mouse hook only disables the
    /// middle-click trigger; hotkeys keep working.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_running() {
            return Ok(());
        }

        let (tx, rx) = unbounded::<HotkeyCallback>();
        let handle = thread::Builder::new()
            .name("deskflow-hotkey-worker".into())
            .spawn(move || {
                for callback in rx {
                    if catch_unwind(AssertUnwindSafe(&*callback)).is_err() {
                        log::warn!("hotkey callback panicked");
                    }
                }
            })
            .map_err(|e| PlatformError::Thread(e.to_string()))?;

        let wants_mouse = {
            let mut registry = self.registry.lock();
            registry.pending.clear();
            let mut existing: Vec<_> = registry
                .combos
                .iter()
                .map(|(id, (combo, text))| (*id, *combo, text.clone()))
                .collect();
            existing.sort_by_key(|(id, _, _)| *id);
            registry.pending.extend(
                existing
                    .into_iter()
                    .map(|(id, combo, text)| Command::Register { id, combo, text }),
            );
            registry.middle_click.is_some()
        };

        let hooks = HookSet {
            keyboard: false,
            mouse: wants_mouse,
        };
        let started = match self.start_loop(hooks, &tx) {
            Err(e) if wants_mouse => {
                log::warn!("middle-click trigger disabled: {e}");
                self.start_loop(HookSet::NONE, &tx)
            }
            other => other,
        };

        match started {
            Ok(()) => {
                self.worker = Some(Worker { tx, handle });
                Ok(())
            }
            Err(e) => {
                log::warn!("hotkeys disabled: {e}");
                drop(tx);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn start_loop(&mut self, hooks: HookSet, tx: &Sender<HotkeyCallback>) -> Result<()> {
        let sink: HookSink = {
            let registry = Arc::clone(&self.registry);
            let tx = tx.clone();
            Arc::new(move |hook: HookEvent| {
                let event = hook.event;
                if hook.injected
                    || event.kind != RawEventKind::MouseDown
                    || event.button != MouseButton::Middle
                {
                    return;
                }
                let callback = registry.lock().middle_click.clone();
                if let Some(callback) = callback {
                    let _ = tx.send(callback);
                }
            })
        };

        let registry = Arc::clone(&self.registry);
        let tx = tx.clone();
        self.thread.start(
            Arc::clone(&self.backend),
            hooks,
            sink,
            move |session, message| match message {
                LoopMessage::Wake => apply_pending(&registry, session),
                LoopMessage::Hotkey(id) => {
                    let callback = registry.lock().callbacks.get(&id).cloned();
                    if let Some(callback) = callback {
                        let _ = tx.send(callback);
                    }
                }
                LoopMessage::Quit => {}
            },
        )
    }

    /// Stops the hook thread and waits for queued callbacks to finish.
    pub fn stop(&mut self) {
        self.thread.stop();
        if let Some(worker) = self.worker.take() {
            drop(worker.tx);
            if worker.handle.join().is_err() {
                log::warn!("hotkey worker panicked");
            }
        }
    }

    fn wake(&self) {
        if let Some(signal) = self.thread.signal() {
            signal.wake();
        }
    }
}

impl Drop for HotkeyDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_pending(registry: &Mutex<Registry>, session: &mut dyn HookSession) {
    let commands: Vec<Command> = registry.lock().pending.drain(..).collect();
    for command in commands {
        match command {
            Command::Register { id, combo, text } => {
                if let Err(e) = session.register_hotkey(id, combo) {
                    log::warn!("hotkey '{text}' unavailable: {e}");
                }
            }
            Command::Unregister(id) => session.unregister_hotkey(id),
        }
    }
}
