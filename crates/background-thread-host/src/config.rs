use background_thread::{ProcessRuntimeFactory, SandboxId};
use tracing::{info, warn};

const DEFAULT_CONSOLE_SANDBOX: &str = "console";

const ENV_CONSOLE_SANDBOX: &str = "BACKGROUND_CONSOLE_SANDBOX";
const ENV_INTERPRETER: &str = "BACKGROUND_INTERPRETER";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Sandbox whose routed payloads are printed to stdout.
    pub console_sandbox: SandboxId,
    /// Program that runs the entry point; the entry point is executed directly
    /// when unset.
    pub interpreter: Option<String>,
}

impl HostConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let (console_sandbox, console_source) = match lookup(ENV_CONSOLE_SANDBOX) {
            Some(value) if value.trim().is_empty() => {
                warn!(
                    var = ENV_CONSOLE_SANDBOX,
                    "Blank console sandbox id; falling back to default"
                );
                (
                    SandboxId::new(DEFAULT_CONSOLE_SANDBOX)?,
                    "default_invalid_env",
                )
            }
            Some(value) => (SandboxId::new(value.trim())?, "env"),
            None => (SandboxId::new(DEFAULT_CONSOLE_SANDBOX)?, "default"),
        };
        let interpreter = lookup(ENV_INTERPRETER).filter(|value| !value.trim().is_empty());

        info!(
            console_sandbox = %console_sandbox,
            console_source,
            interpreter = interpreter.as_deref(),
            "Resolved host configuration"
        );

        Ok(Self {
            console_sandbox,
            interpreter,
        })
    }

    pub fn factory(&self) -> ProcessRuntimeFactory {
        let factory = ProcessRuntimeFactory::new();
        match &self.interpreter {
            Some(interpreter) => factory.interpreter(interpreter.clone()),
            None => factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> HostConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HostConfig::resolve(|name| vars.get(name).cloned()).expect("resolve")
    }

    #[test]
    fn defaults() {
        let config = resolve(&[]);
        assert_eq!(config.console_sandbox.as_str(), "console");
        assert!(config.interpreter.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = resolve(&[
            ("BACKGROUND_CONSOLE_SANDBOX", "screen"),
            ("BACKGROUND_INTERPRETER", "node"),
        ]);
        assert_eq!(config.console_sandbox.as_str(), "screen");
        assert_eq!(config.interpreter.as_deref(), Some("node"));
    }

    #[test]
    fn blank_values_fall_back() {
        let config = resolve(&[
            ("BACKGROUND_CONSOLE_SANDBOX", "  "),
            ("BACKGROUND_INTERPRETER", ""),
        ]);
        assert_eq!(config.console_sandbox.as_str(), "console");
        assert!(config.interpreter.is_none());
    }
}
