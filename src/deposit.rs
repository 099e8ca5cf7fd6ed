// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Deposit Ledger Entries

use serde::{Deserialize, Serialize};

use crate::errors::{ensure_non_negative, SimError, SimResult};
use crate::types::{Asset, DepositKey, DepositKind, Location, DAYS_PER_YEAR};

/// Relative slack under which an over-withdrawal is treated as float dust.
const DUST: f64 = 1e-9;

/// A single balance of one asset held at one venue, either protocol owned
/// (PCV) or user circulating.
///
/// Values are derived from the balance and the price passed to each
/// mutating operation; they are never set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    key: DepositKey,
    balance: f64,
    asset_value: f64,
    yield_accrued: f64,
    yield_value: f64,
    yield_rate: f64,
}

impl Deposit {
    pub fn new(key: DepositKey, balance: f64, price: f64) -> SimResult<Self> {
        let mut deposit = Self::empty(key);
        deposit.set_balance(balance, price)?;
        Ok(deposit)
    }

    pub fn empty(key: DepositKey) -> Self {
        Self {
            key,
            balance: 0.0,
            asset_value: 0.0,
            yield_accrued: 0.0,
            yield_value: 0.0,
            yield_rate: 0.0,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn key(&self) -> DepositKey { self.key }
    pub fn asset(&self) -> Asset { self.key.asset }
    pub fn location(&self) -> Location { self.key.location }
    pub fn kind(&self) -> DepositKind { self.key.kind }
    pub fn balance(&self) -> f64 { self.balance }
    pub fn asset_value(&self) -> f64 { self.asset_value }
    pub fn yield_accrued(&self) -> f64 { self.yield_accrued }
    pub fn yield_value(&self) -> f64 { self.yield_value }
    pub fn yield_rate(&self) -> f64 { self.yield_rate }

    /// Price implied by the last valuation, `None` for an empty deposit.
    pub fn implicit_price(&self) -> Option<f64> {
        (self.balance > 0.0).then(|| self.asset_value / self.balance)
    }

    // ─── Balance Operations ─────────────────────────────────────────────────

    pub fn deposit(&mut self, amount: f64, price: f64) -> SimResult<()> {
        ensure_non_negative("deposit amount", amount)?;
        ensure_non_negative("asset price", price)?;
        self.balance += amount;
        self.revalue(price);
        Ok(())
    }

    pub fn withdraw(&mut self, amount: f64, price: f64) -> SimResult<()> {
        ensure_non_negative("withdrawal amount", amount)?;
        ensure_non_negative("asset price", price)?;
        let amount = self.covered(amount)?;
        self.balance = (self.balance - amount).max(0.0);
        self.revalue(price);
        Ok(())
    }

    /// Move `amount` of this deposit into `to`. When the receiving asset is
    /// priced differently the received amount is converted through USD.
    pub fn transfer(
        &mut self,
        to: &mut Deposit,
        amount: f64,
        from_price: f64,
        to_price: Option<f64>,
    ) -> SimResult<()> {
        let received = match to_price {
            Some(to_price) if to_price != from_price => {
                if to_price <= 0.0 {
                    return Err(SimError::InvalidPrice { asset: to.asset().as_str(), price: to_price });
                }
                amount * from_price / to_price
            }
            _ => amount,
        };
        self.withdraw(amount, from_price)?;
        to.deposit(received, to_price.unwrap_or(from_price))
    }

    /// Direct override, used when seeding state.
    pub fn set_balance(&mut self, balance: f64, price: f64) -> SimResult<()> {
        ensure_non_negative("balance", balance)?;
        ensure_non_negative("asset price", price)?;
        self.balance = balance;
        self.revalue(price);
        Ok(())
    }

    pub fn set_yield_rate(&mut self, yield_rate: f64) -> SimResult<()> {
        ensure_non_negative("yield rate", yield_rate)?;
        self.yield_rate = yield_rate;
        Ok(())
    }

    // ─── Yield Operations ───────────────────────────────────────────────────

    /// Simple-interest accrual over `period_days`. Returns the accrued delta
    /// in asset units.
    pub fn accrue_yield(&mut self, period_days: f64, price: f64) -> SimResult<f64> {
        ensure_non_negative("accrual period", period_days)?;
        ensure_non_negative("asset price", price)?;
        let delta = self.balance * self.yield_rate * period_days / DAYS_PER_YEAR;
        self.yield_accrued += delta;
        self.revalue(price);
        Ok(delta)
    }

    /// Accrue, then fold everything accrued into the balance.
    pub fn accrue_yield_compounded(&mut self, period_days: f64, price: f64) -> SimResult<f64> {
        let delta = self.accrue_yield(period_days, price)?;
        self.compound(price)?;
        Ok(delta)
    }

    /// Move all accrued yield into this deposit's own balance.
    pub fn compound(&mut self, price: f64) -> SimResult<()> {
        ensure_non_negative("asset price", price)?;
        self.balance += self.yield_accrued;
        self.yield_accrued = 0.0;
        self.revalue(price);
        Ok(())
    }

    /// Move `amount` of accrued yield into the balance of `to`.
    pub fn transfer_yield(&mut self, to: &mut Deposit, amount: f64, price: f64) -> SimResult<()> {
        ensure_non_negative("yield amount", amount)?;
        ensure_non_negative("asset price", price)?;
        if amount > self.yield_accrued * (1.0 + DUST) {
            return Err(SimError::InsufficientYield { requested: amount, accrued: self.yield_accrued });
        }
        self.yield_accrued = (self.yield_accrued - amount).max(0.0);
        self.revalue(price);
        to.deposit(amount, price)
    }

    /// Combine two deposits of the same kind and asset. Fails when the
    /// implied price or yield rate would be ambiguous.
    pub fn merge(&self, other: &Deposit) -> SimResult<Deposit> {
        if self.kind() != other.kind() {
            return Err(SimError::AmbiguousMerge { field: "kind" });
        }
        if self.asset() != other.asset() {
            return Err(SimError::AmbiguousMerge { field: "asset" });
        }
        if let (Some(a), Some(b)) = (self.implicit_price(), other.implicit_price()) {
            if (a - b).abs() > DUST * a.abs().max(1.0) {
                return Err(SimError::AmbiguousMerge { field: "price" });
            }
        }
        if self.yield_rate != other.yield_rate {
            return Err(SimError::AmbiguousMerge { field: "yield rate" });
        }
        Ok(Deposit {
            key: self.key,
            balance: self.balance + other.balance,
            asset_value: self.asset_value + other.asset_value,
            yield_accrued: self.yield_accrued + other.yield_accrued,
            yield_value: self.yield_value + other.yield_value,
            yield_rate: self.yield_rate,
        })
    }

    fn covered(&self, amount: f64) -> SimResult<f64> {
        if amount <= self.balance {
            return Ok(amount);
        }
        if amount - self.balance <= DUST * self.balance.max(1.0) {
            return Ok(self.balance);
        }
        Err(SimError::InsufficientBalance { requested: amount, available: self.balance })
    }

    fn revalue(&mut self, price: f64) {
        self.asset_value = self.balance * price;
        self.yield_value = self.yield_accrued * price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_deposit_and_withdraw_revalue() {
        let mut d = Deposit::new(STABLE_IDLE_PCV, 100.0, 1.0).unwrap();
        d.deposit(50.0, 1.01).unwrap();
        assert!((d.balance() - 150.0).abs() < EPS);
        assert!((d.asset_value() - 151.5).abs() < EPS);

        d.withdraw(150.0, 1.0).unwrap();
        assert_eq!(d.balance(), 0.0);
        assert_eq!(d.asset_value(), 0.0);
    }

    #[test]
    fn test_over_withdrawal_is_error() {
        let mut d = Deposit::new(STABLE_IDLE_PCV, 10.0, 1.0).unwrap();
        let err = d.withdraw(11.0, 1.0).unwrap_err();
        assert_eq!(err, SimError::InsufficientBalance { requested: 11.0, available: 10.0 });
        assert_eq!(d.balance(), 10.0, "failed withdrawal must not mutate");
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let mut d = Deposit::new(STABLE_IDLE_PCV, 10.0, 1.0).unwrap();
        assert!(d.deposit(-1.0, 1.0).is_err());
        assert!(d.deposit(1.0, -1.0).is_err());
        assert!(d.set_yield_rate(-0.1).is_err());
        assert!(d.set_balance(-5.0, 1.0).is_err());
        assert!(Deposit::new(FEI_IDLE_USER, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_cross_asset_transfer_converts_through_usd() {
        let mut volatile = Deposit::new(VOLATILE_IDLE_PCV, 10.0, 2000.0).unwrap();
        let mut stable = Deposit::new(STABLE_IDLE_PCV, 0.0, 1.0).unwrap();
        volatile.transfer(&mut stable, 2.0, 2000.0, Some(1.0)).unwrap();
        assert!((volatile.balance() - 8.0).abs() < EPS);
        assert!((stable.balance() - 4000.0).abs() < EPS);
        assert!((stable.asset_value() - 4000.0).abs() < EPS);
    }

    #[test]
    fn test_same_asset_transfer() {
        let mut a = Deposit::new(FEI_IDLE_USER, 100.0, 1.0).unwrap();
        let mut b = Deposit::new(FEI_SAVINGS_USER, 0.0, 1.0).unwrap();
        a.transfer(&mut b, 40.0, 1.0, None).unwrap();
        assert!((a.balance() - 60.0).abs() < EPS);
        assert!((b.balance() - 40.0).abs() < EPS);
    }

    #[test]
    fn test_accrue_yield_simple_interest() {
        let mut d = Deposit::new(STABLE_YIELD_BEARING_PCV, 365_000.0, 1.0).unwrap();
        d.set_yield_rate(0.10).unwrap();
        let delta = d.accrue_yield(1.0, 1.0).unwrap();
        assert!((delta - 100.0).abs() < EPS);
        assert!((d.yield_accrued() - 100.0).abs() < EPS);
        assert!((d.balance() - 365_000.0).abs() < EPS, "accrual leaves balance untouched");
    }

    #[test]
    fn test_accrue_compounded_clears_accrued() {
        let mut d = Deposit::new(STABLE_YIELD_BEARING_PCV, 365_000.0, 1.0).unwrap();
        d.set_yield_rate(0.10).unwrap();
        d.accrue_yield_compounded(1.0, 1.0).unwrap();
        assert_eq!(d.yield_accrued(), 0.0);
        assert!((d.balance() - 365_100.0).abs() < EPS);
    }

    #[test]
    fn test_transfer_yield_over_accrued_is_error() {
        let mut yb = Deposit::new(STABLE_YIELD_BEARING_PCV, 365_000.0, 1.0).unwrap();
        let mut idle = Deposit::new(STABLE_IDLE_PCV, 0.0, 1.0).unwrap();
        yb.set_yield_rate(0.10).unwrap();
        yb.accrue_yield(1.0, 1.0).unwrap();

        assert!(matches!(
            yb.transfer_yield(&mut idle, 150.0, 1.0),
            Err(SimError::InsufficientYield { .. })
        ));
        yb.transfer_yield(&mut idle, 100.0, 1.0).unwrap();
        assert!(yb.yield_accrued().abs() < EPS);
        assert!((idle.balance() - 100.0).abs() < EPS);
    }

    #[test]
    fn test_merge_rules() {
        let a = Deposit::new(STABLE_IDLE_PCV, 10.0, 1.0).unwrap();
        let b = Deposit::new(STABLE_YIELD_BEARING_PCV, 5.0, 1.0).unwrap();
        let merged = a.merge(&b).unwrap();
        assert!((merged.balance() - 15.0).abs() < EPS);

        let repriced = Deposit::new(STABLE_IDLE_PCV, 5.0, 1.02).unwrap();
        assert_eq!(a.merge(&repriced), Err(SimError::AmbiguousMerge { field: "price" }));

        let mut earning = b.clone();
        earning.set_yield_rate(0.1).unwrap();
        assert_eq!(a.merge(&earning), Err(SimError::AmbiguousMerge { field: "yield rate" }));

        let user = Deposit::new(DepositKey::user(Asset::Stable, Location::Idle), 1.0, 1.0).unwrap();
        assert_eq!(a.merge(&user), Err(SimError::AmbiguousMerge { field: "kind" }));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(f64),
        Withdraw(f64),
        Accrue(f64),
        Compound,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0.0..1e6f64).prop_map(Op::Deposit),
            (0.0..2e6f64).prop_map(Op::Withdraw),
            (0.0..30.0f64).prop_map(Op::Accrue),
            Just(Op::Compound),
        ]
    }

    proptest! {
        #[test]
        fn prop_balance_and_yield_never_negative(
            start in 0.0..1e6f64,
            rate in 0.0..1.0f64,
            price in 0.01..5000.0f64,
            ops in proptest::collection::vec(op(), 1..40),
        ) {
            let mut d = Deposit::new(VOLATILE_YIELD_BEARING_PCV, start, price).unwrap();
            d.set_yield_rate(rate).unwrap();
            for op in ops {
                let before = d.clone();
                let result = match op {
                    Op::Deposit(x) => d.deposit(x, price),
                    Op::Withdraw(x) => d.withdraw(x, price),
                    Op::Accrue(days) => d.accrue_yield(days, price).map(|_| ()),
                    Op::Compound => d.compound(price),
                };
                if result.is_err() {
                    prop_assert_eq!(&d, &before);
                }
                prop_assert!(d.balance() >= 0.0);
                prop_assert!(d.yield_accrued() >= 0.0);
                prop_assert!((d.asset_value() - d.balance() * price).abs() <= 1e-6 * d.asset_value().max(1.0));
            }
        }
    }
}
