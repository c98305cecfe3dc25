use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use deskflow_bridge::{
    HostServices, RpcServer, ScriptRunner, ScriptStore, UiBridge, UiRequest, build_registry,
};
use deskflow_core::{
    CancelToken, ExecutionContext, ExecutionSummary, Flow, LogEntry, LogLevel, LogOutput,
    LogStorage, VariableStore, execute_flow,
};
use deskflow_platform::{HotkeyCallback, HotkeyDispatcher, Platform};
use parking_lot::Mutex;

use crate::actions::HostActions;
use crate::settings::HostSettings;

pub fn load_flow(path: &Path) -> Result<Flow> {
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Flow::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

/// Log of background runs: every entry goes to the tracing subscriber and
/// the most recent ones are kept for the console.
struct BackgroundLog<'a> {
    recent: &'a Mutex<LogStorage>,
}

impl LogOutput for BackgroundLog<'_> {
    fn log(&mut self, entry: LogEntry) {
        let run = entry.run_id.as_deref().unwrap_or("-");
        let activity = entry.activity.as_str();
        match entry.level {
            LogLevel::Error => tracing::error!(run, activity, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(run, activity, "{}", entry.message),
            LogLevel::Info => tracing::info!(run, activity, "{}", entry.message),
            LogLevel::Debug => tracing::debug!(run, activity, "{}", entry.message),
        }
        self.recent.lock().push(entry);
    }
}

struct LauncherInner {
    platform: Platform,
    actions: Arc<HostActions>,
    default_delay_ms: u64,
    active: Mutex<HashMap<u64, CancelToken>>,
    next_run: AtomicU64,
    recent: Mutex<LogStorage>,
}

/// Removes a run's cancel token once the run ends, panicking or not.
struct ActiveRun<'a> {
    inner: &'a LauncherInner,
    key: u64,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.inner.active.lock().remove(&self.key);
    }
}

/// Starts flow runs and keeps the cancel tokens of the ones in progress.
#[derive(Clone)]
pub struct FlowLauncher {
    inner: Arc<LauncherInner>,
}

impl FlowLauncher {
    pub fn new(platform: Platform, actions: Arc<HostActions>, default_delay_ms: u64) -> Self {
        Self {
            inner: Arc::new(LauncherInner {
                platform,
                actions,
                default_delay_ms,
                active: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(1),
                recent: Mutex::new(LogStorage::new()),
            }),
        }
    }

    /// Runs `flow` on the calling thread.
    pub fn run<L: LogOutput>(
        &self,
        flow: &Flow,
        variables: VariableStore,
        log: &mut L,
    ) -> ExecutionSummary {
        let cancel = CancelToken::new();
        let key = self.inner.next_run.fetch_add(1, Ordering::Relaxed);
        self.inner.active.lock().insert(key, cancel.clone());
        let _active = ActiveRun {
            inner: &self.inner,
            key,
        };

        execute_flow(
            flow,
            &self.inner.platform,
            self.inner.actions.as_ref(),
            ExecutionContext::with_variables(variables, cancel),
            self.inner.default_delay_ms,
            log,
        )
    }

    /// Runs `flow` on a worker thread. A panic inside the run is logged and
    /// ends only that run.
    pub fn spawn(&self, flow: Arc<Flow>) -> std::io::Result<JoinHandle<()>> {
        let launcher = self.clone();
        thread::Builder::new()
            .name("deskflow-flow".into())
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut log = BackgroundLog {
                        recent: &launcher.inner.recent,
                    };
                    launcher.run(&flow, VariableStore::new(), &mut log)
                }));
                match outcome {
                    Ok(summary) => match &summary.error {
                        None => tracing::info!(
                            "run {} finished after {} steps",
                            summary.run_id,
                            summary.steps_executed
                        ),
                        Some(error) => tracing::warn!("run {} ended: {error}", summary.run_id),
                    },
                    Err(_) => tracing::error!("flow run panicked"),
                }
            })
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Latest log entries of background runs, oldest first.
    pub fn recent_log(&self) -> Vec<LogEntry> {
        self.inner.recent.lock().iter().cloned().collect()
    }

    pub fn recent_errors(&self) -> usize {
        self.inner.recent.lock().count_level(LogLevel::Error)
    }

    /// Asks every running flow to stop at its next step boundary.
    pub fn stop_all(&self) -> usize {
        let active = self.inner.active.lock();
        for cancel in active.values() {
            cancel.cancel();
        }
        active.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub api_port: u16,
    pub connections: usize,
    pub hotkeys: usize,
    pub active_flows: usize,
    pub recent_errors: usize,
}

/// Everything the host process owns while it is up: the RPC server the
/// sandboxed scripts call back into, the hotkey dispatcher and the flows it
/// launches.
pub struct HostRuntime {
    settings: HostSettings,
    server: RpcServer,
    runner: Arc<ScriptRunner>,
    launcher: FlowLauncher,
    hotkeys: HotkeyDispatcher,
}

impl HostRuntime {
    /// Opens the script store and starts the RPC server. Prompts raised by
    /// scripts and flows arrive on the returned receiver.
    pub fn start(settings: HostSettings, platform: Platform) -> Result<(Self, Receiver<UiRequest>)> {
        let (ui, ui_rx) = UiBridge::new();
        let store = match settings.resolved_store_path() {
            Some(path) => ScriptStore::open(path),
            None => {
                tracing::warn!("no data directory, script store kept in memory");
                ScriptStore::in_memory()
            }
        };

        let services = Arc::new(HostServices {
            platform: platform.clone(),
            ui: ui.clone(),
            store: Arc::new(store),
        });
        let server = RpcServer::start(Arc::new(build_registry(&services)))
            .context("starting the rpc server")?;
        tracing::info!("rpc server listening on 127.0.0.1:{}", server.port());

        let runner = Arc::new(ScriptRunner::new(
            settings.script_interpreter.clone(),
            server.port(),
        ));
        let actions = Arc::new(HostActions::new(platform.clone(), ui, Arc::clone(&runner)));
        let launcher = FlowLauncher::new(platform.clone(), actions, settings.default_delay_ms);
        let hotkeys = HotkeyDispatcher::new(Arc::clone(&platform.input));

        Ok((
            Self {
                settings,
                server,
                runner,
                launcher,
                hotkeys,
            },
            ui_rx,
        ))
    }

    pub const fn runner(&self) -> &Arc<ScriptRunner> {
        &self.runner
    }

    pub const fn launcher(&self) -> &FlowLauncher {
        &self.launcher
    }

    /// Registers the configured hotkey and middle-click flows, then starts
    /// the hook thread. Returns how many triggers were bound. Unreadable flows
    /// are skipped; a hook failure leaves the runtime up without triggers.
    pub fn bind_hotkeys(&mut self) -> usize {
        let mut bound = 0;
        for binding in &self.settings.hotkeys {
            match load_flow(&binding.flow) {
                Ok(flow) => {
                    let id = self
                        .hotkeys
                        .register(&binding.combo, self.flow_trigger(flow));
                    if id != 0 {
                        tracing::info!("{} -> {}", binding.combo, binding.flow.display());
                        bound += 1;
                    }
                }
                Err(e) => tracing::warn!("hotkey {} skipped: {e:#}", binding.combo),
            }
        }

        if let Some(path) = &self.settings.middle_click_flow {
            match load_flow(path) {
                Ok(flow) => {
                    self.hotkeys.set_middle_click(Some(self.flow_trigger(flow)));
                    bound += 1;
                }
                Err(e) => tracing::warn!("middle-click flow skipped: {e:#}"),
            }
        }

        if let Err(e) = self.hotkeys.start() {
            tracing::warn!("hotkeys disabled: {e}");
        }
        bound
    }

    fn flow_trigger(&self, flow: Flow) -> HotkeyCallback {
        let launcher = self.launcher.clone();
        let flow = Arc::new(flow);
        Arc::new(move || {
            if let Err(e) = launcher.spawn(Arc::clone(&flow)) {
                tracing::error!("cannot start flow thread: {e}");
            }
        })
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            api_port: self.server.port(),
            connections: self.server.connection_count(),
            hotkeys: self.hotkeys.registered_count(),
            active_flows: self.launcher.active_count(),
            recent_errors: self.launcher.recent_errors(),
        }
    }

    /// Stops running flows, the hook thread and the RPC server. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        let stopped = self.launcher.stop_all();
        if stopped > 0 {
            tracing::info!("stopping {stopped} running flow(s)");
        }
        self.hotkeys.stop();
        self.server.stop();
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::HotkeyBinding;
    use deskflow_platform::DesktopBackend;
    use deskflow_platform::fake::FakeBackend;
    use std::time::{Duration, Instant};

    fn write_flow(dir: &Path, name: &str, json: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, json).unwrap();
        path
    }

    fn settings(dir: &Path) -> HostSettings {
        HostSettings {
            default_delay_ms: 0,
            store_path: Some(dir.join("store.json")),
            ..HostSettings::default()
        }
    }

    fn fake_platform() -> (Arc<FakeBackend>, Platform) {
        let fake = Arc::new(FakeBackend::new());
        let platform = Platform::new(fake.clone(), fake.clone());
        (fake, platform)
    }

    #[test]
    fn test_run_seeds_variables() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, platform) = fake_platform();
        let (runtime, _ui) = HostRuntime::start(settings(dir.path()), platform).unwrap();

        let flow = Flow::from_json(r#"[{"type": "set_clipboard", "value": "hi {{name}}"}]"#)
            .unwrap();
        let variables = [("name", "ada")].into_iter().collect();
        let mut log = Vec::new();
        let summary = runtime.launcher().run(&flow, variables, &mut log);

        assert!(summary.succeeded());
        assert_eq!(fake.clipboard_text().unwrap(), "hi ada");
        assert_eq!(runtime.launcher().active_count(), 0);
    }

    #[test]
    fn test_stop_all_cancels_background_run() {
        let dir = tempfile::tempdir().unwrap();
        let (_fake, platform) = fake_platform();
        let (runtime, _ui) = HostRuntime::start(settings(dir.path()), platform).unwrap();

        let flow = Arc::new(Flow::from_json(r#"[{"type": "delay", "ms": 60000}]"#).unwrap());
        let handle = runtime.launcher().spawn(flow).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while runtime.launcher().active_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(runtime.launcher().stop_all(), 1);
        handle.join().unwrap();
        assert_eq!(runtime.launcher().active_count(), 0);
    }

    #[test]
    fn test_background_runs_keep_recent_log() {
        let dir = tempfile::tempdir().unwrap();
        let (_fake, platform) = fake_platform();
        let (runtime, _ui) = HostRuntime::start(settings(dir.path()), platform).unwrap();

        let flow = Arc::new(
            Flow::from_json(r#"[{"type": "window_activate", "title": "Nowhere"}]"#).unwrap(),
        );
        runtime.launcher().spawn(flow).unwrap().join().unwrap();

        let recent = runtime.launcher().recent_log();
        assert!(!recent.is_empty());
        assert!(recent.iter().all(|entry| entry.run_id.is_some()));
        assert!(recent.iter().any(|entry| entry.level == LogLevel::Error));
        assert_eq!(
            runtime.status().recent_errors,
            runtime.launcher().recent_errors()
        );

        let mut foreground = Vec::new();
        let flow = Flow::from_json(r#"[{"type": "set_var", "name": "a", "value": 1}]"#).unwrap();
        runtime.launcher().run(&flow, VariableStore::new(), &mut foreground);
        assert_eq!(runtime.launcher().recent_log().len(), recent.len());
    }

    #[test]
    fn test_hotkey_launches_flow() {
        let dir = tempfile::tempdir().unwrap();
        let flow = write_flow(
            dir.path(),
            "paste.json",
            r#"[{"type": "set_clipboard", "value": "from hotkey"}]"#,
        );
        let mut settings = settings(dir.path());
        settings.hotkeys = vec![
            HotkeyBinding {
                combo: "ctrl+alt+p".into(),
                flow,
            },
            HotkeyBinding {
                combo: "ctrl+alt+m".into(),
                flow: dir.path().join("missing.json"),
            },
        ];

        let (fake, platform) = fake_platform();
        let (mut runtime, _ui) = HostRuntime::start(settings, platform).unwrap();
        assert_eq!(runtime.bind_hotkeys(), 1);
        assert!(fake.wait_for_hotkey("ctrl+alt+p", Duration::from_secs(5)));
        assert!(fake.fire_hotkey("ctrl+alt+p"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while fake.clipboard_text().unwrap() != "from hotkey" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fake.clipboard_text().unwrap(), "from hotkey");
        assert_eq!(runtime.status().hotkeys, 1);
    }

    #[test]
    fn test_hook_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let flow = write_flow(dir.path(), "noop.json", "[]");
        let mut settings = settings(dir.path());
        settings.hotkeys = vec![HotkeyBinding {
            combo: "ctrl+alt+n".into(),
            flow,
        }];

        let (fake, platform) = fake_platform();
        fake.fail_hook_install(true);
        let (mut runtime, _ui) = HostRuntime::start(settings, platform).unwrap();
        assert_eq!(runtime.bind_hotkeys(), 1);
        assert!(runtime.status().api_port > 0);

        runtime.shutdown();
        runtime.shutdown();
    }
}
