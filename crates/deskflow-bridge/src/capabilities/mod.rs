//! Host operations reachable from scripts, grouped by namespace.

mod clipboard;
mod http;
mod input;
mod prompts;
mod store;
mod system;
mod window;

use std::sync::Arc;

use deskflow_platform::Platform;

use crate::registry::MethodRegistry;
use crate::store::ScriptStore;
use crate::ui::UiBridge;

pub use system::{run_shell, shell_command};

/// What the capability handlers act on. Created once by the host runtime.
pub struct HostServices {
    pub platform: Platform,
    pub ui: UiBridge,
    pub store: Arc<ScriptStore>,
}

/// Registry holding every capability method.
pub fn build_registry(services: &Arc<HostServices>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    clipboard::register(&mut registry, services);
    window::register(&mut registry, services);
    http::register(&mut registry);
    prompts::register(&mut registry, services);
    input::register(&mut registry, services);
    system::register(&mut registry);
    store::register(&mut registry, services);
    registry
}


#[cfg(test)]
mod tests {
    use super::test_support::harness;
    use crate::sdk::METHODS;

    #[test]
    fn test_every_sdk_method_is_registered() {
        let registry = harness().registry;
        for (method, _) in METHODS {
            assert!(registry.contains(method), "{method} is not registered");
        }
        assert_eq!(registry.methods().len(), METHODS.len());
    }
}
