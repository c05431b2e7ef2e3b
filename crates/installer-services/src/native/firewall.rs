//! Firewall rule helper.
//!
//! Wraps the inbound-rule surface of the Windows firewall. Rule names are
//! the unit of identity: adding a name twice fails, and enabling, disabling
//! or removing a name that was never added fails. Both implementations keep
//! those exact semantics.

use crate::adapter::Outcome;
use crate::tool::run_tool;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// Message reported when a rule name is added twice
pub const RULE_ALREADY_EXIST: &str = "Rule already exist";
/// Message reported when an absent rule name is operated on
pub const RULE_DO_NOT_EXIST: &str = "Rule do not exist";

/// Backend trait for firewall rule management
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Add an enabled inbound allow rule for a TCP port
    async fn add_inbound_tcp_rule(&self, name: &str, port: u16) -> Outcome;

    /// Enable an existing rule
    async fn enable_rule(&self, name: &str) -> Outcome;

    /// Disable an existing rule
    async fn disable_rule(&self, name: &str) -> Outcome;

    /// Remove an existing rule
    async fn remove_rule(&self, name: &str) -> Outcome;

    /// Whether a rule with the given name exists
    async fn rule_exists(&self, name: &str) -> bool;

    /// Whether a rule with the given name exists and is enabled
    async fn rule_enabled(&self, name: &str) -> bool;
}

/// In-memory firewall backend
#[derive(Debug, Default)]
pub struct MemoryFirewall {
    /// Rule name to enabled flag
    rules: Mutex<HashMap<String, bool>>,
}

impl MemoryFirewall {
    /// Create an empty in-memory firewall
    pub fn new() -> Self {
        Self::default()
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Outcome {
        let mut rules = self.rules.lock().unwrap();
        match rules.get_mut(name) {
            Some(flag) => {
                *flag = enabled;
                Outcome::ok()
            }
            None => Outcome::failed(RULE_DO_NOT_EXIST),
        }
    }
}

#[async_trait]
impl FirewallBackend for MemoryFirewall {
    async fn add_inbound_tcp_rule(&self, name: &str, _port: u16) -> Outcome {
        let mut rules = self.rules.lock().unwrap();
        if rules.contains_key(name) {
            return Outcome::failed(RULE_ALREADY_EXIST);
        }
        rules.insert(name.to_string(), true);
        Outcome::ok()
    }

    async fn enable_rule(&self, name: &str) -> Outcome {
        self.set_enabled(name, true)
    }

    async fn disable_rule(&self, name: &str) -> Outcome {
        self.set_enabled(name, false)
    }

    async fn remove_rule(&self, name: &str) -> Outcome {
        let mut rules = self.rules.lock().unwrap();
        match rules.remove(name) {
            Some(_) => Outcome::ok(),
            None => Outcome::failed(RULE_DO_NOT_EXIST),
        }
    }

    async fn rule_exists(&self, name: &str) -> bool {
        self.rules.lock().unwrap().contains_key(name)
    }

    async fn rule_enabled(&self, name: &str) -> bool {
        self.rules.lock().unwrap().get(name).copied().unwrap_or(false)
    }
}

/// Firewall backend driving `netsh advfirewall firewall`
pub struct NetshFirewall {
    netsh_path: PathBuf,
}

impl NetshFirewall {
    /// Create a backend using `netsh` from the search path
    pub fn new() -> Self {
        Self {
            netsh_path: PathBuf::from("netsh"),
        }
    }

    /// Create a backend with an explicit `netsh.exe` path
    pub fn with_netsh_path(netsh_path: impl Into<PathBuf>) -> Self {
        Self {
            netsh_path: netsh_path.into(),
        }
    }

    async fn netsh(&self, args: &[String]) -> Outcome {
        match run_tool(&self.netsh_path, args.iter().cloned()).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(out.text().trim().to_string()),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn show_rule(&self, name: &str) -> Option<String> {
        let args = [
            "advfirewall".to_string(),
            "firewall".to_string(),
            "show".to_string(),
            "rule".to_string(),
            format!("name={name}"),
        ];
        match run_tool(&self.netsh_path, args).await {
            Ok(out) if out.success => Some(out.stdout),
            _ => None,
        }
    }
}

impl Default for NetshFirewall {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FirewallBackend for NetshFirewall {
    async fn add_inbound_tcp_rule(&self, name: &str, port: u16) -> Outcome {
        // netsh itself accepts duplicate names; the helper contract does not.
        if self.rule_exists(name).await {
            return Outcome::failed(RULE_ALREADY_EXIST);
        }

        info!(name, port, "adding inbound firewall rule");
        self.netsh(&[
            "advfirewall".to_string(),
            "firewall".to_string(),
            "add".to_string(),
            "rule".to_string(),
            format!("name={name}"),
            "dir=in".to_string(),
            "action=allow".to_string(),
            "protocol=TCP".to_string(),
            format!("localport={port}"),
        ])
        .await
    }

    async fn enable_rule(&self, name: &str) -> Outcome {
        if !self.rule_exists(name).await {
            return Outcome::failed(RULE_DO_NOT_EXIST);
        }
        self.netsh(&[
            "advfirewall".to_string(),
            "firewall".to_string(),
            "set".to_string(),
            "rule".to_string(),
            format!("name={name}"),
            "new".to_string(),
            "enable=yes".to_string(),
        ])
        .await
    }

    async fn disable_rule(&self, name: &str) -> Outcome {
        if !self.rule_exists(name).await {
            return Outcome::failed(RULE_DO_NOT_EXIST);
        }
        self.netsh(&[
            "advfirewall".to_string(),
            "firewall".to_string(),
            "set".to_string(),
            "rule".to_string(),
            format!("name={name}"),
            "new".to_string(),
            "enable=no".to_string(),
        ])
        .await
    }

    async fn remove_rule(&self, name: &str) -> Outcome {
        if !self.rule_exists(name).await {
            return Outcome::failed(RULE_DO_NOT_EXIST);
        }
        self.netsh(&[
            "advfirewall".to_string(),
            "firewall".to_string(),
            "delete".to_string(),
            "rule".to_string(),
            format!("name={name}"),
        ])
        .await
    }

    async fn rule_exists(&self, name: &str) -> bool {
        self.show_rule(name).await.is_some()
    }

    async fn rule_enabled(&self, name: &str) -> bool {
        match self.show_rule(name).await {
            Some(output) => output.lines().any(|l| {
                let l = l.trim();
                l.starts_with("Enabled") && l.ends_with("Yes")
            }),
            None => false,
        }
    }
}
