use std::sync::Arc;

use orchestrator::{
    Dedicator, HostProcessRunner, KeypairStore, NetworkTester, Orchestrator, ProcessRunner,
};

use crate::config::AgentConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub dedicator: Arc<Dedicator>,
    pub network: Arc<NetworkTester>,
    pub keypairs: Arc<KeypairStore>,
    pub config: Arc<AgentConfig>,
}

impl AppState {
    /// State backed by real host processes and the host filesystem.
    pub fn new(config: AgentConfig) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(HostProcessRunner::new());
        let orchestrator = Orchestrator::new(
            runner.clone(),
            config.elevation.clone(),
            config.upgrade.clone(),
        );
        let dedicator = Arc::new(Dedicator::host(config.dedication.link_path.clone()));

        Self::with_parts(orchestrator, dedicator, runner, config)
    }

    /// `runner` executes the network speed test; the rest comes from `config`.
    pub fn with_parts(
        orchestrator: Orchestrator,
        dedicator: Arc<Dedicator>,
        runner: Arc<dyn ProcessRunner>,
        config: AgentConfig,
    ) -> Self {
        Self {
            orchestrator,
            dedicator,
            network: Arc::new(NetworkTester::new(runner, config.network.command())),
            keypairs: Arc::new(KeypairStore::new(config.keypair.dir.clone())),
            config: Arc::new(config),
        }
    }
}
