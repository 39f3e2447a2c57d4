use std::path::Path;
use std::sync::Arc;

use adapters::allocator::SharedPortAllocator;
use adapters::iptables::{Iptables, IptablesChains, IptablesRuleEngine, SystemCommandRunner};
use anyhow::{Context, Result};
use application::portmap_service_impl::PortMapAppService;
use infrastructure::config::AgentConfig;
use infrastructure::constants::DEFAULT_CONFIG_PATH;
use infrastructure::metrics::AgentMetrics;
use ports::secondary::rule_engine_port::RuleEnginePort;

/// Load the config file.
///
/// A missing file at the default location yields the built-in defaults; an
/// explicitly given path must exist.
pub fn load_config(path: &str) -> Result<AgentConfig> {
    let p = Path::new(path);
    if path == DEFAULT_CONFIG_PATH && !p.exists() {
        return Ok(AgentConfig::default());
    }
    AgentConfig::load(p).with_context(|| format!("failed to load config from {path}"))
}

/// Everything a command needs, wired from the config.
pub struct Runtime {
    pub config: AgentConfig,
    pub service: PortMapAppService,
    pub allocator: Arc<SharedPortAllocator>,
    pub metrics: Arc<AgentMetrics>,
    pub chains: IptablesChains,
}

impl Runtime {
    pub fn build(config: AgentConfig) -> Self {
        let iptables = Iptables::new(
            config.portmap.iptables_path.clone(),
            config.portmap.use_wait,
            Arc::new(SystemCommandRunner),
        );
        let chains = IptablesChains::new(iptables.clone(), config.portmap.chain.clone());
        let engine = Arc::new(IptablesRuleEngine::new(iptables));
        Self::with_rule_engine(config, engine, chains)
    }

    pub fn with_rule_engine(
        config: AgentConfig,
        rule_engine: Arc<dyn RuleEnginePort>,
        chains: IptablesChains,
    ) -> Self {
        let allocator = Arc::new(SharedPortAllocator::new());
        let metrics = Arc::new(AgentMetrics::new());
        let service = PortMapAppService::new(
            config.settings(),
            rule_engine,
            allocator.clone(),
            metrics.clone(),
        );
        tracing::debug!(
            chain = %config.portmap.chain,
            enabled = config.portmap.enabled,
            iptables = %config.portmap.iptables_path,
            "port mapping service ready"
        );
        Self {
            config,
            service,
            allocator,
            metrics,
            chains,
        }
    }
}
