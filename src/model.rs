// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Model Assembly

use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Pipeline};
use crate::{
    accounting, capital_allocation, liquidity_pool, metrics, money_market, pcv_rebalancing, pcv_yield, prices, psm,
};

/// Assemble the per-timestep block order for a parameter set. Blocks whose
/// feature is switched off are left out entirely.
pub fn build_pipeline(params: &Parameters) -> SimResult<Pipeline> {
    params.validate()?;
    let mut blocks: Vec<Block> = Vec::new();
    blocks.extend(prices::blocks(params)?);
    blocks.push(money_market::block(params)?);
    blocks.push(liquidity_pool::block(params)?);
    blocks.push(psm::block(params)?);
    blocks.extend(pcv_yield::blocks(params)?);
    blocks.extend(pcv_rebalancing::block(params)?);
    blocks.extend(capital_allocation::blocks(params)?);
    blocks.push(accounting::block(params)?);
    blocks.push(metrics::block(params)?);
    Ok(Pipeline::new(blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapitalAllocationMode;

    fn descriptions(params: &Parameters) -> Vec<&'static str> {
        build_pipeline(params).unwrap().blocks().iter().map(|b| b.description).collect()
    }

    #[test]
    fn test_default_block_order() {
        assert_eq!(
            descriptions(&Parameters::default()),
            vec![
                "Price processes",
                "FEI savings rate",
                "Money market",
                "Liquidity pool",
                "Peg stability module",
                "PCV yield accrual",
                "PCV rebalancing",
                "Capital allocation weights",
                "Capital allocation rebalancing",
                "Accounting",
                "System metrics",
            ]
        );
    }

    #[test]
    fn test_optional_blocks() {
        let params = Parameters {
            yield_reinvest_period: Some(30),
            target_stable_pcv_ratio: None,
            capital_allocation_mode: CapitalAllocationMode::Disabled,
            ..Parameters::default()
        };
        let blocks = descriptions(&params);
        assert!(blocks.contains(&"PCV yield management"));
        assert!(!blocks.contains(&"PCV rebalancing"));
        assert!(!blocks.contains(&"Capital allocation weights"));
        assert_eq!(blocks.last(), Some(&"System metrics"));
    }
}
