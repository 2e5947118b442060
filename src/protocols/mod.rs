//! Protocol Integrations
//!
//! Wires configured triggers to on-chain signal sources and the check
//! layouts in [`variants`].

mod onchain;
pub mod variants;

pub use onchain::{ContractRead, RpcEndpoint};
pub use variants::{
    meta_pool_checks, pool_checks, share_price_checks, vault_on_pool_checks, BalanceSources,
    PoolSignals, PoolTolerances,
};

use crate::config::{PoolConfig, TriggerConfig, TriggerKind};
use crate::error::ConstructionError;
use crate::trigger::Trigger;

/// Signals of a Curve pool: `coin.balanceOf(pool)` against `pool.balances(i)`
/// for every coin, plus `get_virtual_price`
pub fn curve_pool_signals(rpc: &RpcEndpoint, pool: &PoolConfig) -> PoolSignals {
    let balances = pool
        .coins
        .iter()
        .enumerate()
        .map(|(index, coin)| BalanceSources {
            label: format!("{} coin {} balance", pool.name, index),
            true_balance: rpc.token_balance(*coin, pool.pool),
            internal_balance: rpc.pool_balance(pool.pool, index as u64),
        })
        .collect();

    PoolSignals {
        name: pool.name.clone(),
        balances,
        virtual_price: rpc.virtual_price(pool.pool),
    }
}

/// Build a live trigger from configuration, reading its initial snapshots
/// from the chain.
pub async fn build_trigger(
    rpc: &RpcEndpoint,
    config: &TriggerConfig,
) -> Result<Trigger, ConstructionError> {
    let tolerance = config.tolerance()?;
    let tolerances = PoolTolerances::uniform(tolerance);
    let name = config.name.as_str();

    let checks = match &config.kind {
        TriggerKind::SharePrice { vault } => {
            share_price_checks(name, rpc.price_per_share(*vault), tolerance).await?
        }
        TriggerKind::ExchangeRate { market } => {
            share_price_checks(name, rpc.exchange_rate(*market), tolerance).await?
        }
        TriggerKind::VaultOnCurve { vault, pool } => {
            vault_on_pool_checks(
                name,
                rpc.price_per_share(*vault),
                rpc.virtual_price(*pool),
                tolerance,
            )
            .await?
        }
        TriggerKind::CurvePool { pool } => {
            pool_checks(curve_pool_signals(rpc, pool), &tolerances).await?
        }
        TriggerKind::ConvexMetaPool {
            deposit_token,
            reward_pool,
            base,
            meta,
        } => {
            meta_pool_checks(
                name,
                rpc.total_supply(*deposit_token),
                rpc.total_supply(*reward_pool),
                curve_pool_signals(rpc, base),
                curve_pool_signals(rpc, meta),
                &tolerances,
            )
            .await?
        }
    };

    Trigger::new(config.identity(), checks.with_policy(config.commit_policy)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SignalSource;
    use alloy_primitives::{address, Address};

    fn three_pool() -> PoolConfig {
        PoolConfig {
            name: "3pool".to_string(),
            pool: address!("bEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7"),
            coins: vec![
                address!("6B175474E89094C44Da98b954EedcdeCB5BE3830"),
                address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            ],
        }
    }

    #[test]
    fn test_curve_pool_signals_cover_every_coin() {
        let rpc = RpcEndpoint::parse("http://localhost:8545").unwrap();
        let signals = curve_pool_signals(&rpc, &three_pool());

        assert_eq!(signals.name, "3pool");
        assert_eq!(signals.balances.len(), 3);
        assert_eq!(signals.balances[2].label, "3pool coin 2 balance");
        assert!(signals.balances[2].internal_balance.describe().ends_with(".balances(2)"));
        assert!(signals.virtual_price.describe().ends_with(".get_virtual_price"));
    }

    #[tokio::test]
    async fn test_build_fails_cleanly_without_a_node() {
        let rpc = RpcEndpoint::parse("http://127.0.0.1:1").unwrap();
        let config = TriggerConfig {
            name: "Curve 3pool".to_string(),
            symbol: "CRV3-TRIG".to_string(),
            description: "3pool drain trigger".to_string(),
            platforms: vec!["Curve".to_string()],
            recipient: Address::repeat_byte(0x22),
            tolerance_numerator: 500,
            tolerance_denominator: 1_000,
            commit_policy: Default::default(),
            kind: TriggerKind::CurvePool { pool: three_pool() },
        };

        let err = build_trigger(&rpc, &config).await.unwrap_err();
        assert!(matches!(err, ConstructionError::InitialReadFailed { .. }));
    }
}
