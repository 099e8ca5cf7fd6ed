// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Constants ──────────────────────────────────────────────────────────────

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Ethereum blocks per year used by the money market rate curve.
pub const BLOCKS_PER_YEAR: f64 = 2_102_400.0;

// ─── Asset ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Stable,
    Volatile,
    Fei,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Volatile => "volatile",
            Self::Fei => "fei",
        }
    }
}

// ─── Location ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Idle,
    LiquidityPool,
    MoneyMarket,
    YieldBearing,
    Savings,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LiquidityPool => "liquidity_pool",
            Self::MoneyMarket => "money_market",
            Self::YieldBearing => "yield_bearing",
            Self::Savings => "savings",
        }
    }

    /// Venues whose yield is driven by volatile asset exposure.
    pub fn is_volatile_exposed(&self) -> bool {
        matches!(self, Self::LiquidityPool | Self::MoneyMarket)
    }
}

// ─── Deposit Kind ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositKind {
    /// Protocol-controlled value.
    Pcv,
    /// User-circulating funds.
    User,
}

impl DepositKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcv => "pcv",
            Self::User => "user",
        }
    }
}

// ─── Deposit Key ────────────────────────────────────────────────────────────

/// Unique address of a deposit in state, rendered as `asset_location_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DepositKey {
    pub asset: Asset,
    pub location: Location,
    pub kind: DepositKind,
}

impl DepositKey {
    pub const fn new(asset: Asset, location: Location, kind: DepositKind) -> Self {
        Self { asset, location, kind }
    }

    pub const fn pcv(asset: Asset, location: Location) -> Self {
        Self::new(asset, location, DepositKind::Pcv)
    }

    pub const fn user(asset: Asset, location: Location) -> Self {
        Self::new(asset, location, DepositKind::User)
    }

    /// Idle deposit of the same asset and kind.
    pub fn idle_sibling(&self) -> Self {
        Self::new(self.asset, Location::Idle, self.kind)
    }
}

impl fmt::Display for DepositKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.asset.as_str(), self.location.as_str(), self.kind.as_str())
    }
}

impl FromStr for DepositKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (asset, rest) = s.split_once('_').ok_or_else(|| format!("malformed deposit key {s}"))?;
        let (location, kind) = rest.rsplit_once('_').ok_or_else(|| format!("malformed deposit key {s}"))?;
        let asset = match asset {
            "stable" => Asset::Stable,
            "volatile" => Asset::Volatile,
            "fei" => Asset::Fei,
            other => return Err(format!("unknown asset {other}")),
        };
        let location = match location {
            "idle" => Location::Idle,
            "liquidity_pool" => Location::LiquidityPool,
            "money_market" => Location::MoneyMarket,
            "yield_bearing" => Location::YieldBearing,
            "savings" => Location::Savings,
            other => return Err(format!("unknown location {other}")),
        };
        let kind = match kind {
            "pcv" => DepositKind::Pcv,
            "user" => DepositKind::User,
            other => return Err(format!("unknown deposit kind {other}")),
        };
        Ok(Self::new(asset, location, kind))
    }
}

impl From<DepositKey> for String {
    fn from(key: DepositKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for DepositKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ─── Well-Known Deposits ────────────────────────────────────────────────────

pub const FEI_IDLE_PCV: DepositKey = DepositKey::pcv(Asset::Fei, Location::Idle);
pub const FEI_LIQUIDITY_POOL_PCV: DepositKey = DepositKey::pcv(Asset::Fei, Location::LiquidityPool);
pub const FEI_MONEY_MARKET_PCV: DepositKey = DepositKey::pcv(Asset::Fei, Location::MoneyMarket);
pub const STABLE_IDLE_PCV: DepositKey = DepositKey::pcv(Asset::Stable, Location::Idle);
pub const STABLE_YIELD_BEARING_PCV: DepositKey = DepositKey::pcv(Asset::Stable, Location::YieldBearing);
pub const VOLATILE_IDLE_PCV: DepositKey = DepositKey::pcv(Asset::Volatile, Location::Idle);
pub const VOLATILE_YIELD_BEARING_PCV: DepositKey = DepositKey::pcv(Asset::Volatile, Location::YieldBearing);
pub const VOLATILE_LIQUIDITY_POOL_PCV: DepositKey = DepositKey::pcv(Asset::Volatile, Location::LiquidityPool);

pub const FEI_IDLE_USER: DepositKey = DepositKey::user(Asset::Fei, Location::Idle);
pub const FEI_SAVINGS_USER: DepositKey = DepositKey::user(Asset::Fei, Location::Savings);
pub const FEI_LIQUIDITY_POOL_USER: DepositKey = DepositKey::user(Asset::Fei, Location::LiquidityPool);
pub const FEI_MONEY_MARKET_USER: DepositKey = DepositKey::user(Asset::Fei, Location::MoneyMarket);
pub const VOLATILE_LIQUIDITY_POOL_USER: DepositKey = DepositKey::user(Asset::Volatile, Location::LiquidityPool);

// ─── Rebalancing Condition ──────────────────────────────────────────────────

/// Comparator gating PCV rebalancing: `current <op> target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RebalancingCondition {
    #[default]
    LessThan,
    GreaterThan,
}

impl RebalancingCondition {
    pub fn holds(&self, current: f64, target: f64) -> bool {
        match self {
            Self::LessThan => current < target,
            Self::GreaterThan => current > target,
        }
    }
}

// ─── Capital Allocation Mode ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapitalAllocationMode {
    Disabled,
    /// Stochastic Dirichlet perturbation of the current weights.
    Exogenous,
    /// Yield-over-risk weighting of the tracked deposits.
    #[default]
    Endogenous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_key_display_and_parse() {
        let key = FEI_LIQUIDITY_POOL_PCV;
        assert_eq!(key.to_string(), "fei_liquidity_pool_pcv");
        assert_eq!("fei_liquidity_pool_pcv".parse::<DepositKey>(), Ok(key));
        assert_eq!(
            "volatile_yield_bearing_pcv".parse::<DepositKey>(),
            Ok(VOLATILE_YIELD_BEARING_PCV)
        );
        assert!("gold_idle_pcv".parse::<DepositKey>().is_err());
        assert!("fei".parse::<DepositKey>().is_err());
    }

    #[test]
    fn test_deposit_key_serializes_as_string() {
        let json = serde_json::to_string(&FEI_MONEY_MARKET_USER).unwrap();
        assert_eq!(json, "\"fei_money_market_user\"");
        let back: DepositKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FEI_MONEY_MARKET_USER);
    }

    #[test]
    fn test_idle_sibling() {
        assert_eq!(STABLE_YIELD_BEARING_PCV.idle_sibling(), STABLE_IDLE_PCV);
        assert_eq!(VOLATILE_YIELD_BEARING_PCV.idle_sibling(), VOLATILE_IDLE_PCV);
    }

    #[test]
    fn test_rebalancing_condition() {
        assert!(RebalancingCondition::LessThan.holds(0.3, 0.5));
        assert!(!RebalancingCondition::LessThan.holds(0.5, 0.5));
        assert!(RebalancingCondition::GreaterThan.holds(0.7, 0.5));
    }
}
