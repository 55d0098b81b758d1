//! Vault Liquidation Keeper
//!
//! Replays a block script against an in-process node and, after every
//! block it mines, ranks vaults by how close they are to liquidation.

mod config;
mod health;
mod priority_queue;
mod script;

use anyhow::{bail, Context, Result};
use config::KeeperConfig;
use priority_queue::HealthQueue;
use script::{Bindings, Step};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use vault_common::VaultId;
use vault_engine::Node;

/// Outcome of one replay
#[derive(Debug, Default)]
struct Summary {
    steps: usize,
    unexpected: usize,
    /// Vaults seen below their scheme minimum
    flagged: BTreeSet<VaultId>,
    /// Vaults seen in liquidation
    liquidated: BTreeSet<VaultId>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting vault liquidation keeper");

    let config = KeeperConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using regtest defaults", e);
        KeeperConfig::default_regtest()
    });

    let script_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.script_path.clone());
    let steps = script::load(&script_path)?;
    log::info!("Replaying {} steps from {}", steps.len(), script_path);

    let mut node = Node::new(config.engine()?).context("Failed to start node")?;
    let mut queue = HealthQueue::new();

    let summary = run(&mut node, &steps, &config, &mut queue)?;

    log::info!(
        "Replay finished at height {}: {} steps, {} unexpected, {} vault(s) flagged, {} liquidated",
        node.engine().state().height,
        summary.steps,
        summary.unexpected,
        summary.flagged.len(),
        summary.liquidated.len()
    );
    if let Some(worst) = queue.peek() {
        log::info!("Lowest margin: vault {} at {} points", worst.vault_id, worst.margin);
    }
    Ok(())
}

/// Replay `steps`, refreshing `queue` whenever the chain moves
fn run(
    node: &mut Node,
    steps: &[Step],
    config: &KeeperConfig,
    queue: &mut HealthQueue,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut bindings = Bindings::default();

    let owner = node
        .call("getnewaddress", &[json!("keeper")])
        .context("Failed to create keeper address")?;
    log::info!("Keeper wallet: {}", owner);
    bindings.bind("owner", owner);

    for (index, step) in steps.iter().enumerate() {
        summary.steps += 1;
        let params = step
            .params
            .iter()
            .map(|p| bindings.resolve(p))
            .collect::<Result<Vec<Value>>>()
            .context(format!("Step {} ({})", index, step.method))?;

        match (node.call(&step.method, &params), step.expect_error) {
            (Ok(value), false) => {
                log::debug!("Step {} ({}) -> {}", index, step.method, value);
                if let Some(name) = &step.bind {
                    bindings.bind(name, value);
                }
            }
            (Err(e), true) => {
                log::info!("Step {} ({}) rejected as expected: {}", index, step.method, e);
            }
            (Ok(_), true) => {
                summary.unexpected += 1;
                if config.stop_on_error {
                    bail!("Step {} ({}) was expected to fail", index, step.method);
                }
                log::warn!("Step {} ({}) was expected to fail but succeeded", index, step.method);
            }
            (Err(e), false) => {
                summary.unexpected += 1;
                if config.stop_on_error {
                    return Err(e).context(format!("Step {} ({})", index, step.method));
                }
                log::warn!("Step {} ({}) failed: {}", index, step.method, e);
            }
        }

        if step.changes_height() {
            refresh(node, config, queue, &mut summary)?;
        }
    }
    Ok(summary)
}

/// Rescan vault health and log what needs attention
fn refresh(
    node: &Node,
    config: &KeeperConfig,
    queue: &mut HealthQueue,
    summary: &mut Summary,
) -> Result<()> {
    let engine = node.engine();
    let state = engine.state();
    queue.refresh(health::scan(state, engine.config(), config.health_buffer)?);

    let liquidatable = queue.liquidatable();
    for h in liquidatable.iter().take(config.report_batch) {
        log::warn!(
            "Vault {} below minimum: ratio {}% / next {}% (scheme {} needs {}%)",
            h.vault_id,
            h.active_ratio,
            h.next_ratio,
            h.scheme_id,
            h.min_ratio
        );
    }
    summary
        .flagged
        .extend(liquidatable.into_iter().map(|h| h.vault_id));

    let at_risk = queue.at_risk(config.health_buffer);
    for h in at_risk.iter().take(config.report_batch) {
        log::info!("Vault {} at risk: margin {} points", h.vault_id, h.margin);
    }

    let frozen = queue.frozen().len();
    if frozen > 0 {
        log::info!("{} vault(s) frozen on stale prices", frozen);
    }

    let in_liquidation: Vec<VaultId> = state
        .vaults
        .iter()
        .filter(|v| v.is_in_liquidation())
        .map(|v| v.id.clone())
        .collect();
    if !in_liquidation.is_empty() {
        log::info!("{} vault(s) in auction", in_liquidation.len());
    }
    summary.liquidated.extend(in_liquidation);

    log::debug!(
        "Height {}: {} tracked, {} at risk",
        state.height,
        queue.len(),
        at_risk.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use health::HealthStatus;

    const DEMO: &str = include_str!("../scripts/liquidation.json");

    #[test]
    fn test_demo_script_liquidates_edge_vault() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = KeeperConfig::default_regtest();
        let mut node = Node::new(config.engine().unwrap()).unwrap();
        let mut queue = HealthQueue::new();
        let steps = script::parse(DEMO).unwrap();

        let summary = run(&mut node, &steps, &config, &mut queue).unwrap();
        assert_eq!(summary.steps, steps.len());
        assert_eq!(summary.unexpected, 0);
        assert_eq!(summary.liquidated.len(), 1);
        assert_eq!(summary.flagged, summary.liquidated);

        // only the well-covered vault is still tracked
        assert_eq!(queue.len(), 1);
        let safe = queue.peek().unwrap();
        assert!(!summary.liquidated.contains(&safe.vault_id));
        assert_eq!(safe.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_stop_on_error_aborts() {
        let mut config = KeeperConfig::default_regtest();
        config.stop_on_error = true;
        let mut node = Node::new(config.engine().unwrap()).unwrap();
        let mut queue = HealthQueue::new();
        let steps = script::parse(
            r#"[{"method": "closevault", "params": ["00000000000000000000000000000000000000000000000000000000000000aa", "$owner"]},
                {"method": "generate", "params": [1]}]"#,
        )
        .unwrap();
        assert!(run(&mut node, &steps, &config, &mut queue).is_err());
        assert_eq!(node.engine().state().height, 0);

        config.stop_on_error = false;
        let summary = run(&mut node, &steps, &config, &mut queue).unwrap();
        assert_eq!(summary.unexpected, 1);
        assert_eq!(node.engine().state().height, 1);
    }
}
