//! On-chain Signal Sources
//!
//! Each source is a single `eth_call` of a view function returning one
//! uint256. Transport errors, reverts, and undecodable return data all come
//! back as `SourceUnavailable`, which the engine treats as a violation.
//!
//! CRITICAL: reads go to whatever chain the RPC endpoint serves. Addresses
//! in configuration must match that chain.

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Url;
use std::sync::Arc;
use tracing::trace;

use crate::engine::SignalSource;
use crate::error::SourceUnavailable;

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Yearn vault
    #[allow(missing_docs)]
    interface IYearnVault {
        /// Underlying per share, scaled by the vault's decimals
        function pricePerShare() external view returns (uint256);
    }

    /// Curve StableSwap pool
    #[allow(missing_docs)]
    interface ICurvePool {
        /// LP token value in underlying (18 decimals, only increases when healthy)
        function get_virtual_price() external view returns (uint256);

        /// Pool's internal accounting of coin `i`
        function balances(uint256 i) external view returns (uint256);
    }

    #[allow(missing_docs)]
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }

    /// Compound-style money market token
    #[allow(missing_docs)]
    interface ICToken {
        function exchangeRateStored() external view returns (uint256);
    }
}

// ============================================
// RPC ENDPOINT
// ============================================

/// HTTP JSON-RPC endpoint shared by on-chain sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    url: Url,
}

impl RpcEndpoint {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let url = url
            .parse::<Url>()
            .map_err(|e| eyre!("Invalid RPC URL '{}': {}", url, e))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Share price of a Yearn-style vault
    pub fn price_per_share(&self, vault: Address) -> Arc<dyn SignalSource> {
        self.read("pricePerShare", vault, IYearnVault::pricePerShareCall {})
    }

    /// Virtual price of a Curve pool
    pub fn virtual_price(&self, pool: Address) -> Arc<dyn SignalSource> {
        self.read("get_virtual_price", pool, ICurvePool::get_virtual_priceCall {})
    }

    /// What the pool thinks it holds of coin `index`
    pub fn pool_balance(&self, pool: Address, index: u64) -> Arc<dyn SignalSource> {
        self.read(
            &format!("balances({})", index),
            pool,
            ICurvePool::balancesCall { i: U256::from(index) },
        )
    }

    /// What `holder` really holds of `token`
    pub fn token_balance(&self, token: Address, holder: Address) -> Arc<dyn SignalSource> {
        self.read(
            &format!("balanceOf({})", holder),
            token,
            IERC20::balanceOfCall { account: holder },
        )
    }

    /// Total supply of an ERC-20, or of a Convex reward pool's stake
    pub fn total_supply(&self, token: Address) -> Arc<dyn SignalSource> {
        self.read("totalSupply", token, IERC20::totalSupplyCall {})
    }

    /// Stored exchange rate of a Compound-style market
    pub fn exchange_rate(&self, market: Address) -> Arc<dyn SignalSource> {
        self.read("exchangeRateStored", market, ICToken::exchangeRateStoredCall {})
    }

    fn read<C>(&self, function: &str, target: Address, call: C) -> Arc<dyn SignalSource>
    where
        C: SolCall<Return = U256> + Send + Sync + 'static,
    {
        Arc::new(ContractRead {
            function: function.to_string(),
            url: self.url.clone(),
            target,
            call,
        })
    }
}

// ============================================
// CONTRACT READ
// ============================================

/// `eth_call` of one view function returning a uint256
pub struct ContractRead<C> {
    function: String,
    url: Url,
    target: Address,
    call: C,
}

impl<C: SolCall> ContractRead<C> {
    pub fn calldata(&self) -> Vec<u8> {
        self.call.abi_encode()
    }
}

#[async_trait]
impl<C> SignalSource for ContractRead<C>
where
    C: SolCall<Return = U256> + Send + Sync,
{
    async fn read(&self) -> std::result::Result<U256, SourceUnavailable> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());

        let tx = TransactionRequest::default()
            .to(self.target)
            .input(self.calldata().into());

        let raw = provider
            .call(tx)
            .await
            .map_err(|e| SourceUnavailable::new(format!("{} failed: {}", self.describe(), e)))?;

        let value = C::abi_decode_returns(&raw).map_err(|e| {
            SourceUnavailable::new(format!("{} returned garbage: {}", self.describe(), e))
        })?;

        trace!("{} = {}", self.describe(), value);
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("{:?}.{}", self.target, self.function)
    }
}
