//! Hooks and helpers shared by the unit tests of the updater modules
mod hooks;

pub(crate) use hooks::*;

use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::UpdaterConfig;

/// Poll `condition` until it holds or `timeout` elapses
pub(crate) fn eventually(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

pub(crate) fn test_config(num_clients: usize) -> UpdaterConfig {
    UpdaterConfig {
        name: "test-updater".into(),
        num_clients,
        ..Default::default()
    }
}
