//! Step manifests consumed by the upgrade workflow.
//!
//! Package names, repository URLs and unit file text are data, not logic:
//! the built-in manifest below can be replaced wholesale from the agent
//! configuration file.

use serde::{Deserialize, Serialize};

use crate::domain::step::StepDescriptor;

pub const POD_SERVICE_NAME: &str = "pod.service";
pub const POD_PACKAGE: &str = "pod";
pub const POD_SOURCES_LIST: &str = "/etc/apt/sources.list.d/xandeum-pod.list";
pub const POD_KEYRING: &str = "/usr/share/keyrings/xandeum-pod.gpg";
pub const POD_REPOSITORY_KEY_URL: &str = "https://xandeum.github.io/pod-apt-package/KEY.gpg";
pub const POD_REPOSITORY_LINE: &str = "deb [signed-by=/usr/share/keyrings/xandeum-pod.gpg] https://xandeum.github.io/pod-apt-package/ stable main\n";
pub const POD_UNIT_PATH: &str = "/etc/systemd/system/pod.service";

const DOWNLOADED_KEY_PATH: &str = "/tmp/xandeum-pod.asc";

pub const POD_SERVICE_UNIT: &str = "[Unit]
Description=Xandeum pNode
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart=/usr/bin/pod
Restart=always
RestartSec=5
User=root
Environment=RUST_LOG=info
StandardOutput=journal
StandardError=journal
SyslogIdentifier=pod

[Install]
WantedBy=multi-user.target
";

/// Ordered step lists for every phase of the upgrade workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeManifest {
    /// Upgrades the agent itself. Fatal on failure.
    pub agent_update: Vec<StepDescriptor>,
    /// Installs or upgrades the managed service.
    pub service_install: Vec<StepDescriptor>,
    /// Upgrades the companion daemon. Fatal on failure.
    pub companion_update: Vec<StepDescriptor>,
    /// Fired detached after the run has been reported complete.
    pub restart: Vec<StepDescriptor>,
}

impl Default for UpgradeManifest {
    fn default() -> Self {
        Self {
            agent_update: vec![StepDescriptor::new("Update xandminer agent", "bash")
                .arg("upgrade.sh")
                .in_dir("/root/xandminer")
                .elevated()],
            service_install: default_service_install(),
            companion_update: vec![StepDescriptor::new("Update xandminerd daemon", "bash")
                .arg("upgrade.sh")
                .in_dir("/root/xandminerd")
                .elevated()],
            restart: vec![
                StepDescriptor::new("Restart xandminerd", "systemctl")
                    .args(["restart", "xandminerd.service"])
                    .elevated(),
                StepDescriptor::new("Restart xandminer", "systemctl")
                    .args(["restart", "xandminer.service"])
                    .elevated(),
            ],
        }
    }
}

fn default_service_install() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new("Remove stale pod package source", "rm")
            .args(["-f", POD_SOURCES_LIST])
            .elevated()
            .allow_failure(),
        StepDescriptor::new("Refresh package index", "apt-get")
            .arg("update")
            .elevated()
            .allow_failure(),
        StepDescriptor::new("Install repository prerequisites", "apt-get")
            .args(["install", "-y", "curl", "gnupg", "ca-certificates"])
            .elevated(),
        StepDescriptor::new("Register pod repository", "tee")
            .arg(POD_SOURCES_LIST)
            .stdin(POD_REPOSITORY_LINE)
            .elevated(),
        StepDescriptor::new("Download repository key", "curl")
            .args(["-fsSL", "-o", DOWNLOADED_KEY_PATH, POD_REPOSITORY_KEY_URL]),
        StepDescriptor::new("Import repository key", "gpg")
            .args([
                "--batch",
                "--yes",
                "--dearmor",
                "-o",
                POD_KEYRING,
                DOWNLOADED_KEY_PATH,
            ])
            .elevated(),
        StepDescriptor::new("Refresh package index with pod repository", "apt-get")
            .arg("update")
            .elevated(),
        StepDescriptor::new("Install pod package", "apt-get")
            .args(["install", "-y", POD_PACKAGE])
            .elevated(),
        StepDescriptor::new("Write pod service unit", "tee")
            .arg(POD_UNIT_PATH)
            .stdin(POD_SERVICE_UNIT)
            .elevated(),
        StepDescriptor::new("Reload systemd units", "systemctl")
            .arg("daemon-reload")
            .elevated(),
        StepDescriptor::new("Enable pod service", "systemctl")
            .args(["enable", POD_SERVICE_NAME])
            .elevated(),
        StepDescriptor::new("Start pod service", "systemctl")
            .args(["start", POD_SERVICE_NAME])
            .elevated(),
    ]
}

impl UpgradeManifest {
    /// Total number of steps streamed to the client (restart excluded).
    pub fn streamed_step_count(&self) -> usize {
        self.agent_update.len() + self.service_install.len() + self.companion_update.len()
    }
}
