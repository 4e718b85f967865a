use super::*;
use anyhow::{anyhow, Result};

pub fn validate_config(config: &McopsConfig) -> Result<()> {
    validate_server(&config.server)?;
    validate_gate(&config.gate)?;
    validate_operations(&config.operations)?;
    validate_scheduler(&config.scheduler)?;

    if config.operator.id.trim().is_empty() {
        return Err(anyhow!("operator.id cannot be empty"));
    }

    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            config.logging.level
        )),
    }
}

fn validate_server(server: &SupervisorConfig) -> Result<()> {
    if server.server_dir.as_os_str().is_empty() {
        return Err(anyhow!("server.server_dir cannot be empty"));
    }
    if server.health_port == 0 {
        return Err(anyhow!("server.health_port must be between 1 and 65535"));
    }
    if server.process_match.iter().all(|m| m.trim().is_empty()) {
        return Err(anyhow!("server.process_match needs at least one non-empty pattern"));
    }
    if server.timing.ready_poll.is_zero() || server.timing.exit_poll.is_zero() {
        return Err(anyhow!("server.timing poll intervals must be greater than 0"));
    }
    if server.timing.ready_timeout < server.timing.ready_poll {
        return Err(anyhow!("server.timing.ready_timeout must not be shorter than ready_poll"));
    }
    Ok(())
}

fn validate_gate(gate: &GateConfig) -> Result<()> {
    if gate.breaker_threshold == 0 {
        return Err(anyhow!("gate.breaker_threshold must be at least 1"));
    }
    if gate.breaker_window.is_zero() {
        return Err(anyhow!("gate.breaker_window must be greater than 0"));
    }
    Ok(())
}

fn validate_operations(operations: &OperationsConfig) -> Result<()> {
    if operations.rate_limit_count == 0 {
        return Err(anyhow!("operations.rate_limit_count must be at least 1"));
    }
    if operations.rate_limit_window.is_zero() {
        return Err(anyhow!("operations.rate_limit_window must be greater than 0"));
    }
    if operations.audit_path.is_some() && operations.audit_max_bytes == 0 {
        return Err(anyhow!("operations.audit_max_bytes must be greater than 0"));
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerSettings) -> Result<()> {
    if scheduler.state_dir.as_os_str().is_empty() {
        return Err(anyhow!("scheduler.state_dir cannot be empty"));
    }
    let timing = &scheduler.timing;
    let intervals = [
        ("reboot_interval", timing.reboot_interval),
        ("backup_interval", timing.backup_interval),
        ("countdown_tick", timing.countdown_tick),
        ("stop_poll", timing.stop_poll),
    ];
    for (name, value) in intervals {
        if value.is_zero() {
            return Err(anyhow!("scheduler.timing.{} must be greater than 0", name));
        }
    }
    if let Some(storage) = &scheduler.storage {
        if storage.remote_dir.as_os_str().is_empty() {
            return Err(anyhow!("scheduler.storage.remote_dir cannot be empty"));
        }
        if storage.credentials_path.as_os_str().is_empty() {
            return Err(anyhow!("scheduler.storage.credentials_path cannot be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> McopsConfig {
        McopsConfig::load_from_string("server:\n  server_dir: /srv/minecraft\n").unwrap()
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = base();
        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).unwrap_err().to_string().contains("Invalid log level"));

        let mut config = base();
        config.operations.rate_limit_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = base();
        config.gate.breaker_threshold = 0;
        assert!(validate_config(&config).is_err());

        let mut config = base();
        config.scheduler.timing.countdown_tick = std::time::Duration::ZERO;
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("countdown_tick"));

        let mut config = base();
        config.operator.id = " ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_yaml_with_invalid_values_fails_to_load() {
        let yaml = "server:\n  server_dir: /srv/minecraft\n  health_port: 0\n";
        assert!(McopsConfig::load_from_string(yaml).is_err());
    }
}
