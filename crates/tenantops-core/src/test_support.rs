//! Shared fixtures for unit tests.

use crate::model::SolutionConfig;
use crate::registry;

pub(crate) const SOLUTION_JSON: &str = include_str!("../../../tests/fixtures/solution.json");

pub(crate) fn solution() -> SolutionConfig {
    registry::from_json_str(SOLUTION_JSON).expect("fixture must load")
}
