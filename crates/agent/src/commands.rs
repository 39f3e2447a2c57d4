use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use domain::portmap::entity::PortMapping;
use domain::portmap::rules::{RuleArgs, generate_rule_args};
use ports::primary::portmap_service::PortMapService;
use serde::Serialize;

use crate::cli::{ChainsCommand, OutputFormat};
use crate::startup::Runtime;

#[derive(Debug, Serialize)]
struct MappingReport {
    action: &'static str,
    container_ip: Ipv4Addr,
    mappings: Vec<String>,
    enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allocated: Vec<AllocatedPort>,
}

#[derive(Debug, Serialize)]
struct AllocatedPort {
    protocol: String,
    host_port: u16,
    container_port: u16,
}

#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    mapping: String,
    chain: &'a str,
    #[serde(flatten)]
    rules: RuleArgs,
}

// ── Setup / Release ─────────────────────────────────────────────────────

pub fn cmd_setup(
    rt: &Runtime,
    container_ip: Ipv4Addr,
    mappings: &[PortMapping],
    output: OutputFormat,
) -> Result<()> {
    rt.service
        .setup_port_maps(container_ip, mappings)
        .with_context(|| format!("port mapping setup for {container_ip} failed"))?;
    print_report(rt, "setup", container_ip, mappings, output)
}

pub fn cmd_release(
    rt: &Runtime,
    container_ip: Ipv4Addr,
    mappings: &[PortMapping],
    output: OutputFormat,
) -> Result<()> {
    rt.service.release_port_maps(container_ip, mappings);
    print_report(rt, "release", container_ip, mappings, output)
}

/// Set up or release every static mapping from the config file.
pub fn cmd_apply(rt: &Runtime, release: bool, output: OutputFormat) -> Result<()> {
    let entries = rt.config.static_mappings()?;
    if entries.is_empty() {
        if output == OutputFormat::Table {
            println!("No static mappings configured.");
        }
        return Ok(());
    }
    for (container_ip, mappings) in &entries {
        if release {
            cmd_release(rt, *container_ip, mappings, output)?;
        } else {
            cmd_setup(rt, *container_ip, mappings, output)?;
        }
    }
    Ok(())
}

fn print_report(
    rt: &Runtime,
    action: &'static str,
    container_ip: Ipv4Addr,
    mappings: &[PortMapping],
    output: OutputFormat,
) -> Result<()> {
    let allocated: Vec<AllocatedPort> = rt
        .allocator
        .entries()
        .into_iter()
        .filter(|(_, _, binding)| binding.container_ip == container_ip)
        .map(|(protocol, host_port, binding)| AllocatedPort {
            protocol: protocol.to_string(),
            host_port,
            container_port: binding.container_port,
        })
        .collect();

    let report = MappingReport {
        action,
        container_ip,
        mappings: mappings.iter().map(ToString::to_string).collect(),
        enabled: rt.service.enabled(),
        allocated,
    };

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !report.enabled {
        println!("Port mapping is disabled; nothing to {action}.");
        return Ok(());
    }

    for mapping in &report.mappings {
        println!("{action:<8} {mapping:<28} -> {container_ip}");
    }
    if !report.allocated.is_empty() {
        println!();
        println!("{:<6}  {:>9}  {:>14}", "PROTO", "HOST PORT", "CONTAINER PORT");
        for port in &report.allocated {
            println!(
                "{:<6}  {:>9}  {:>14}",
                port.protocol, port.host_port, port.container_port
            );
        }
    }
    Ok(())
}

// ── Check ───────────────────────────────────────────────────────────────

/// Validate `mappings` and print the iptables invocations setup would run.
pub fn cmd_check(
    rt: &Runtime,
    container_ip: Ipv4Addr,
    mappings: &[PortMapping],
    output: OutputFormat,
) -> Result<()> {
    let chain = rt.config.portmap.chain.as_str();
    let reports = mappings
        .iter()
        .map(|m| {
            let rules = generate_rule_args(container_ip, m)
                .with_context(|| format!("mapping {m} is invalid"))?;
            Ok(CheckReport {
                mapping: m.to_string(),
                chain,
                rules,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let iptables = rt.config.portmap.iptables_path.as_str();
    for report in &reports {
        println!("# {}", report.mapping);
        println!(
            "{iptables} -t nat -I {chain} {}",
            report.rules.redirect.join(" ")
        );
        println!("{iptables} -I {chain} {}", report.rules.forward.join(" "));
    }
    Ok(())
}

// ── Chains ──────────────────────────────────────────────────────────────

pub fn cmd_chains(rt: &Runtime, command: ChainsCommand) -> Result<()> {
    let chain = rt.chains.chain();
    match command {
        ChainsCommand::Init => {
            rt.chains
                .init()
                .with_context(|| format!("failed to initialise chain {chain}"))?;
            println!("Chain {chain} ready.");
        }
        ChainsCommand::Remove => {
            rt.chains
                .remove()
                .with_context(|| format!("failed to remove chain {chain}"))?;
            println!("Chain {chain} removed.");
        }
    }
    Ok(())
}

// ── Metrics ─────────────────────────────────────────────────────────────

pub fn cmd_metrics(rt: &Runtime) -> Result<()> {
    let text = rt.metrics.encode()?;
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use adapters::iptables::{CommandOutput, CommandRunner, Iptables, IptablesChains};
    use infrastructure::config::AgentConfig;
    use ports::test_utils::InMemoryRuleEngine;

    use super::*;

    /// iptables on a host with no chain and no jump rules yet.
    struct FreshHostRunner;

    impl CommandRunner for FreshHostRunner {
        fn run(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            if args.iter().any(|a| a == "-C" || a == "-S") {
                Ok(CommandOutput::failed("iptables: No chain/target/match by that name."))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }
    }

    const IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn runtime(config: AgentConfig) -> (Runtime, Arc<InMemoryRuleEngine>) {
        let engine = Arc::new(InMemoryRuleEngine::new());
        let chains = IptablesChains::new(
            Iptables::new("iptables", false, Arc::new(FreshHostRunner)),
            config.portmap.chain.clone(),
        );
        let rt = Runtime::with_rule_engine(config, engine.clone(), chains);
        (rt, engine)
    }

    fn allocated_for(rt: &Runtime, container_ip: Ipv4Addr) -> usize {
        rt.allocator
            .entries()
            .iter()
            .filter(|(_, _, binding)| binding.container_ip == container_ip)
            .count()
    }

    fn maps(specs: &[&str]) -> Vec<PortMapping> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn setup_then_release() {
        let (rt, engine) = runtime(AgentConfig::default());
        let mappings = maps(&["8080:80", "5000-5002:5000-5002/udp"]);

        cmd_setup(&rt, IP, &mappings, OutputFormat::Json).unwrap();
        assert_eq!(allocated_for(&rt, IP), 4);
        assert_eq!(engine.nat_rules("HOSTPORT").len(), 2);

        cmd_release(&rt, IP, &mappings, OutputFormat::Table).unwrap();
        assert_eq!(allocated_for(&rt, IP), 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn setup_conflict_is_reported() {
        let (rt, _engine) = runtime(AgentConfig::default());
        cmd_setup(&rt, IP, &maps(&["8080:80"]), OutputFormat::Table).unwrap();
        let err = cmd_setup(
            &rt,
            Ipv4Addr::new(10, 0, 0, 3),
            &maps(&["8080:81"]),
            OutputFormat::Table,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("already in use"));
    }

    #[test]
    fn apply_uses_static_mappings() {
        let config = AgentConfig::from_yaml(
            r#"
portmap:
  mappings:
    - container_ip: 10.0.0.2
      ports: ["8080:80"]
    - container_ip: 10.0.0.3
      ports: ["9090:90/udp"]
"#,
        )
        .unwrap();
        let (rt, engine) = runtime(config);

        cmd_apply(&rt, false, OutputFormat::Json).unwrap();
        assert_eq!(allocated_for(&rt, IP), 1);
        assert_eq!(allocated_for(&rt, Ipv4Addr::new(10, 0, 0, 3)), 1);

        cmd_apply(&rt, true, OutputFormat::Json).unwrap();
        assert!(engine.is_empty());
    }

    #[test]
    fn check_rejects_range_mismatch() {
        let (rt, engine) = runtime(AgentConfig::default());
        cmd_check(&rt, IP, &maps(&["8000-8010:80-90"]), OutputFormat::Json).unwrap();
        let err = cmd_check(&rt, IP, &maps(&["8000-8005:80-84"]), OutputFormat::Table)
            .unwrap_err();
        assert!(format!("{err:#}").contains("range mismatch"));
        assert!(engine.is_empty());
    }

    #[test]
    fn disabled_config_does_nothing() {
        let config = AgentConfig::from_yaml("portmap:\n  enabled: false\n").unwrap();
        let (rt, engine) = runtime(config);
        cmd_setup(&rt, IP, &maps(&["8080:80"]), OutputFormat::Table).unwrap();
        assert!(engine.is_empty());
        assert_eq!(allocated_for(&rt, IP), 0);
    }

    #[test]
    fn metrics_reflect_run() {
        let (rt, _engine) = runtime(AgentConfig::default());
        cmd_setup(&rt, IP, &maps(&["8080:80"]), OutputFormat::Table).unwrap();
        let text = rt.metrics.encode().unwrap();
        assert!(text.contains("hostport_setup_total{result=\"ok\"} 1"));
        assert!(text.contains("hostport_ports_allocated{protocol=\"tcp\"} 1"));
        cmd_metrics(&rt).unwrap();
    }

    #[test]
    fn chains_commands_run() {
        let (rt, _engine) = runtime(AgentConfig::default());
        cmd_chains(&rt, ChainsCommand::Init).unwrap();
        cmd_chains(&rt, ChainsCommand::Remove).unwrap();
    }
}
