//! Trigger Layouts
//!
//! Ordered check layouts for the pool shapes we protect. Every layout puts
//! checks that cannot fault ahead of calls into price functions that can
//! revert on a badly broken pool.
//!
//! - Vault share price alone (Yearn, Rari, Ribbon, Compound-style markets)
//! - Vault share price, then the Curve pool under it
//! - Curve pool: coin balances, then virtual price
//! - Convex meta pool: deposit supply invariant, then base pool, then meta pool

use std::sync::Arc;

use crate::engine::{
    BalanceCheck, Composite, InvariantEqualityCheck, SignalSource, SignalTracker, ToleranceRatio,
};
use crate::error::ConstructionError;

/// Real custody and internal accounting of one pool coin
pub struct BalanceSources {
    pub label: String,
    pub true_balance: Arc<dyn SignalSource>,
    pub internal_balance: Arc<dyn SignalSource>,
}

/// Everything watched on one Curve pool
pub struct PoolSignals {
    pub name: String,
    pub balances: Vec<BalanceSources>,
    pub virtual_price: Arc<dyn SignalSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTolerances {
    pub balance: ToleranceRatio,
    pub virtual_price: ToleranceRatio,
}

impl PoolTolerances {
    pub fn uniform(tolerance: ToleranceRatio) -> Self {
        Self {
            balance: tolerance,
            virtual_price: tolerance,
        }
    }
}

impl Default for PoolTolerances {
    fn default() -> Self {
        Self::uniform(ToleranceRatio::HALF)
    }
}

/// Single tracker over a share price or exchange rate
pub async fn share_price_checks(
    name: &str,
    share_price: Arc<dyn SignalSource>,
    tolerance: ToleranceRatio,
) -> Result<Composite, ConstructionError> {
    let tracker = SignalTracker::new(format!("{} share price", name), share_price, tolerance).await?;
    Ok(Composite::new(name).with(tracker))
}

/// Vault share price, then the virtual price of the pool the vault sits in.
/// Both are evaluated unconditionally in that order.
pub async fn vault_on_pool_checks(
    name: &str,
    share_price: Arc<dyn SignalSource>,
    virtual_price: Arc<dyn SignalSource>,
    tolerance: ToleranceRatio,
) -> Result<Composite, ConstructionError> {
    let share = SignalTracker::new(format!("{} share price", name), share_price, tolerance).await?;
    let virtual_price =
        SignalTracker::new(format!("{} virtual price", name), virtual_price, tolerance).await?;

    Ok(Composite::new(name).with(share).with(virtual_price))
}

/// Balance checks for every coin, then the virtual price.
///
/// The virtual price goes last: a pool whose supply has been inflated can
/// divide by zero inside `get_virtual_price`, and by then the balance checks
/// have already had their say.
pub async fn pool_checks(
    pool: PoolSignals,
    tolerances: &PoolTolerances,
) -> Result<Composite, ConstructionError> {
    let mut group = Composite::new(pool.name.clone());

    for coin in pool.balances {
        group.push(BalanceCheck::new(
            coin.label,
            coin.true_balance,
            coin.internal_balance,
            tolerances.balance,
        ));
    }

    let virtual_price = SignalTracker::new(
        format!("{} virtual price", pool.name),
        pool.virtual_price,
        tolerances.virtual_price,
    )
    .await?;
    group.push(virtual_price);

    Ok(group)
}

/// Deposit-token invariant, then the base pool, then the meta pool
pub async fn meta_pool_checks(
    name: &str,
    deposit_supply: Arc<dyn SignalSource>,
    staked_supply: Arc<dyn SignalSource>,
    base: PoolSignals,
    meta: PoolSignals,
    tolerances: &PoolTolerances,
) -> Result<Composite, ConstructionError> {
    let invariant = InvariantEqualityCheck::new(
        format!("{} deposit supply", name),
        deposit_supply,
        staked_supply,
    );
    let base = pool_checks(base, tolerances).await?;
    let meta = pool_checks(meta, tolerances).await?;

    Ok(Composite::new(name).with(invariant).with(base).with(meta))
}
