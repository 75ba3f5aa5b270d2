//! Synthetic modules for exercising presentation code
//!
//! These entries never enter the registry; they are merged into listings
//! only when the `dummy` option is set.

use std::path::PathBuf;

use crate::plugins::{FailureCause, ModuleDescriptor, PluginInfo, PluginState};

fn entry(id: &str, version: &str, description: &str, state: PluginState) -> PluginInfo {
    PluginInfo {
        descriptor: ModuleDescriptor {
            id: id.to_string(),
            version: version.to_string(),
            requires: String::new(),
            description: description.to_string(),
            license: "Apache-2.0".to_string(),
            provider: "modhost".to_string(),
            path: PathBuf::from(format!("{id}-{version}.demo")),
        },
        state,
        failure: None,
    }
}

/// One FAILED, one STARTED and one STOPPED module
pub fn demo_plugins() -> Vec<PluginInfo> {
    let mut proxmox = entry(
        "proxmox",
        "0.9.0",
        "Manage Proxmox virtual machines",
        PluginState::Failed,
    );
    proxmox.failure = Some(FailureCause::Load {
        reason: "demo module always fails".to_string(),
    });

    vec![
        proxmox,
        entry(
            "docker",
            "1.0.1",
            "Manage Docker containers",
            PluginState::Started,
        ),
        entry(
            "paypal",
            "2.0.0",
            "Accept PayPal payments",
            PluginState::Stopped,
        ),
    ]
}
