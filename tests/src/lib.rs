// ============ iCKB Test Suite ============
// Cross-crate scenarios run against an in-memory chain
//
// Test categories:
// 1. Integration: plan, commit, reload, history
// 2. Edge cases: empty amounts, exact redemption, output cap, fee rounding, large pools
// 3. Fuzz/Property: random wallets and amounts with invariant checks

#[cfg(test)]
mod support;

#[cfg(test)]
mod integration;

#[cfg(test)]
mod edge_cases;

#[cfg(test)]
mod fuzz;
