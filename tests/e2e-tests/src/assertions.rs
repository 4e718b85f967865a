//! Custom assertions for E2E tests

use crate::host::SimulatedHost;
use std::future::Future;
use std::time::{Duration, Instant};

/// Assert that a console command containing `needle` reached the server
pub fn assert_console_received(host: &SimulatedHost, needle: &str) -> Result<(), String> {
    let commands = host.console_commands();
    if commands.iter().any(|c| c.contains(needle)) {
        Ok(())
    } else {
        Err(format!("No console command containing '{}'. Received:\n{:#?}", needle, commands))
    }
}

/// Assert the number of times the server process was launched
pub fn assert_launches(host: &SimulatedHost, expected: u32) -> Result<(), String> {
    let launches = host.launches();
    if launches == expected {
        Ok(())
    } else {
        Err(format!("Expected {} launch(es), saw {}", expected, launches))
    }
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    loop {
        if check().await {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(format!("Condition not met within {:?}", timeout));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
