use domain::portmap::error::PortMapError;

use super::runner::{Iptables, table_args};

/// A jump from a built-in chain into ours.
struct Jump {
    table: &'static str,
    from: &'static str,
    matches: &'static [&'static str],
}

const JUMPS: &[Jump] = &[
    Jump {
        table: "nat",
        from: "PREROUTING",
        matches: &["-m", "addrtype", "--dst-type", "LOCAL"],
    },
    Jump {
        table: "nat",
        from: "OUTPUT",
        matches: &["!", "-d", "127.0.0.0/8", "-m", "addrtype", "--dst-type", "LOCAL"],
    },
    Jump {
        table: "filter",
        from: "FORWARD",
        matches: &[],
    },
];

const TABLES: [&str; 2] = ["nat", "filter"];

/// Creates and removes the port mapping chain and the jumps into it.
pub struct IptablesChains {
    iptables: Iptables,
    chain: String,
}

impl IptablesChains {
    pub fn new(iptables: Iptables, chain: impl Into<String>) -> Self {
        Self {
            iptables,
            chain: chain.into(),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Create the chain in `nat` and `filter` and insert the jump rules.
    ///
    /// Safe to call repeatedly: existing chains and jumps are left alone.
    pub fn init(&self) -> Result<(), PortMapError> {
        let chain = self.chain.as_str();
        for table in TABLES {
            if self.chain_exists(table)? {
                tracing::debug!(table, chain, "chain already present");
                continue;
            }
            self.iptables
                .exec_checked(chain, &table_args(table, "-N", chain, &[]))?;
            tracing::info!(table, chain, "chain created");
        }

        for jump in JUMPS {
            let rule = self.jump_rule(jump);
            let exists = self
                .iptables
                .exec(chain, &table_args(jump.table, "-C", jump.from, &rule))?
                .success;
            if !exists {
                self.iptables
                    .exec_checked(chain, &table_args(jump.table, "-I", jump.from, &rule))?;
                tracing::info!(table = jump.table, from = jump.from, chain, "jump rule inserted");
            }
        }
        Ok(())
    }

    /// Delete the jumps, then flush and delete the chain in both tables.
    ///
    /// Missing jumps and chains are skipped. Fails only if an existing chain
    /// cannot be deleted.
    pub fn remove(&self) -> Result<(), PortMapError> {
        let chain = self.chain.as_str();
        for jump in JUMPS {
            let rule = self.jump_rule(jump);
            // A jump may have been inserted more than once.
            while self
                .iptables
                .exec(chain, &table_args(jump.table, "-C", jump.from, &rule))?
                .success
            {
                if let Err(e) = self
                    .iptables
                    .exec_checked(chain, &table_args(jump.table, "-D", jump.from, &rule))
                {
                    tracing::warn!(table = jump.table, from = jump.from, "failed to delete jump: {e}");
                    break;
                }
            }
        }

        for table in TABLES {
            if !self.chain_exists(table)? {
                continue;
            }
            self.iptables
                .exec_checked(chain, &table_args(table, "-F", chain, &[]))?;
            self.iptables
                .exec_checked(chain, &table_args(table, "-X", chain, &[]))?;
            tracing::info!(table, chain, "chain removed");
        }
        Ok(())
    }

    fn chain_exists(&self, table: &str) -> Result<bool, PortMapError> {
        let out = self
            .iptables
            .exec(&self.chain, &table_args(table, "-S", &self.chain, &[]))?;
        Ok(out.success)
    }

    fn jump_rule(&self, jump: &Jump) -> Vec<String> {
        jump.matches
            .iter()
            .map(|m| (*m).to_string())
            .chain(["-j".to_string(), self.chain.clone()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex, PoisonError};

    use super::*;
    use crate::iptables::runner::CommandOutput;
    use crate::iptables::runner::testing::ScriptedRunner;

    /// Fake iptables that tracks which chains and jumps exist.
    fn stateful_runner(chains: &[&str], jumps: &[&str]) -> Arc<ScriptedRunner> {
        let state = Arc::new(Mutex::new((
            chains.iter().map(|s| (*s).to_string()).collect::<Vec<_>>(),
            jumps.iter().map(|s| (*s).to_string()).collect::<Vec<_>>(),
        )));
        Arc::new(ScriptedRunner::new(move |args| {
            let args: Vec<&str> = args
                .iter()
                .map(String::as_str)
                .filter(|a| *a != "--wait")
                .collect();
            let (table, op, target) = (args[1], args[2], args[3]);
            let key = format!("{table} {target}");
            let rule = format!("{table} {target} {}", args[4..].join(" "));
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let (chains, jumps) = &mut *state;
            let found = match op {
                "-S" | "-F" => chains.contains(&key),
                "-N" => {
                    chains.push(key);
                    true
                }
                "-X" => {
                    chains.retain(|c| *c != key);
                    true
                }
                "-C" => jumps.contains(&rule),
                "-I" => {
                    jumps.push(rule);
                    true
                }
                "-D" => {
                    let before = jumps.len();
                    jumps.retain(|j| *j != rule);
                    jumps.len() != before
                }
                _ => false,
            };
            if found {
                CommandOutput::ok("")
            } else {
                CommandOutput::failed("iptables: No chain/target/match by that name.")
            }
        }))
    }

    fn chains(runner: &Arc<ScriptedRunner>) -> IptablesChains {
        IptablesChains::new(Iptables::new("iptables", true, runner.clone()), "HOSTPORT")
    }

    #[test]
    fn init_creates_chains_and_jumps() {
        let runner = stateful_runner(&[], &[]);
        chains(&runner).init().unwrap();
        let lines = runner.lines();
        assert!(lines.contains(&"-t nat -N HOSTPORT".to_string()));
        assert!(lines.contains(&"-t filter -N HOSTPORT".to_string()));
        assert!(lines.contains(
            &"-t nat -I PREROUTING -m addrtype --dst-type LOCAL -j HOSTPORT".to_string()
        ));
        assert!(lines.contains(
            &"-t nat -I OUTPUT ! -d 127.0.0.0/8 -m addrtype --dst-type LOCAL -j HOSTPORT"
                .to_string()
        ));
        assert!(lines.contains(&"-t filter -I FORWARD -j HOSTPORT".to_string()));
    }

    #[test]
    fn init_is_idempotent() {
        let runner = stateful_runner(&[], &[]);
        let chains = chains(&runner);
        chains.init().unwrap();
        let first = runner.calls().len();
        chains.init().unwrap();
        let second: Vec<String> = runner.lines().split_off(first);
        assert!(second.iter().all(|l| !l.contains(" -N ") && !l.contains(" -I ")));
    }

    #[test]
    fn remove_undoes_init() {
        let runner = stateful_runner(&[], &[]);
        let chains = chains(&runner);
        chains.init().unwrap();
        chains.remove().unwrap();
        let lines = runner.lines();
        assert!(lines.contains(&"-t filter -D FORWARD -j HOSTPORT".to_string()));
        assert!(lines.contains(&"-t nat -X HOSTPORT".to_string()));
        assert!(lines.contains(&"-t filter -X HOSTPORT".to_string()));

        // nothing left to remove
        let before = runner.calls().len();
        chains.remove().unwrap();
        let after: Vec<String> = runner.lines().split_off(before);
        assert!(after.iter().all(|l| !l.contains(" -X ") && !l.contains(" -D ")));
    }

    #[test]
    fn create_failure_propagates() {
        let runner = Arc::new(ScriptedRunner::new(|_| CommandOutput::failed("Permission denied (you must be root)")));
        let err = chains(&runner).init().unwrap_err();
        assert!(err.to_string().contains("Permission denied"));
    }
}
