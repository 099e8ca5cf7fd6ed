// Per-Timestep JSONL Time Series Recorder
// Outputs one JSON line per end-of-timestep snapshot for independent analysis

use pcv_engine::State;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct TimestepSnapshot {
    pub timestep: usize,
    pub fei_price: f64,
    pub stable_asset_price: f64,
    pub volatile_asset_price: f64,
    pub total_fei_supply: f64,
    pub total_protocol_owned_fei: f64,
    pub total_user_circulating_fei: f64,
    pub fei_minted_redeemed: f64,
    pub total_pcv: f64,
    pub total_stable_asset_pcv: f64,
    pub total_volatile_asset_pcv: f64,
    pub pcv_yield: f64,
    pub collateralization_ratio: f64,
    pub stable_backing_ratio: f64,
    pub stable_pcv_ratio: f64,
    pub protocol_equity: f64,
    pub protocol_revenue: f64,
    pub liquidity_pool_tvl: f64,
    pub liquidity_pool_impermanent_loss: f64,
    pub money_market_utilization: f64,
    pub money_market_supply_rate: f64,
    pub volatile_asset_risk_metric: f64,
    pub psm_mint_redeem_fees: f64,
    pub cumulative_psm_redemptions: f64,
    pub capital_allocation_target_weights: Vec<f64>,
    /// Supply minus its two components; zero when FEI is conserved.
    pub conservation_error: f64,
}

impl TimestepSnapshot {
    pub fn from_state(state: &State) -> Self {
        let s = &state.scalars;
        Self {
            timestep: state.timestep,
            fei_price: s.fei_price,
            stable_asset_price: s.stable_asset_price,
            volatile_asset_price: s.volatile_asset_price,
            total_fei_supply: s.total_fei_supply,
            total_protocol_owned_fei: s.total_protocol_owned_fei,
            total_user_circulating_fei: s.total_user_circulating_fei,
            fei_minted_redeemed: s.fei_minted_redeemed,
            total_pcv: s.total_pcv,
            total_stable_asset_pcv: s.total_stable_asset_pcv,
            total_volatile_asset_pcv: s.total_volatile_asset_pcv,
            pcv_yield: s.pcv_yield,
            collateralization_ratio: s.collateralization_ratio,
            stable_backing_ratio: s.stable_backing_ratio,
            stable_pcv_ratio: s.stable_pcv_ratio,
            protocol_equity: s.protocol_equity,
            protocol_revenue: s.protocol_revenue,
            liquidity_pool_tvl: s.liquidity_pool_tvl,
            liquidity_pool_impermanent_loss: s.liquidity_pool_impermanent_loss,
            money_market_utilization: s.money_market_utilization,
            money_market_supply_rate: s.money_market_supply_rate,
            volatile_asset_risk_metric: s.volatile_asset_risk_metric,
            psm_mint_redeem_fees: s.psm_mint_redeem_fees,
            cumulative_psm_redemptions: s.cumulative_psm_redemptions,
            capital_allocation_target_weights: state.capital_allocation_target_weights.clone(),
            conservation_error: s.total_fei_supply - s.total_protocol_owned_fei - s.total_user_circulating_fei,
        }
    }
}

/// Time series recorder that accumulates snapshots and writes JSONL
pub struct TimeSeriesRecorder {
    snapshots: Vec<TimestepSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn record(&mut self, state: &State) {
        self.snapshots.push(TimestepSnapshot::from_state(state));
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
