//! Dependency solver contract
//!
//! The solver itself lives outside this crate. Given the requested specs and
//! the current environment it returns the complete desired environment, and
//! is expected to be deterministic for identical inputs.

use super::PackageSet;
use super::error::PkgResult;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub specs: Vec<String>,
    pub pip_specs: Vec<String>,
    pub installed_packages: PackageSet,
    pub channels: Vec<String>,
}

pub trait Solver: Send {
    /// Solve for the environment that satisfies `request`
    ///
    /// The result holds every package of the new environment, not a delta.
    fn solve(&self, request: SolveRequest) -> BoxFuture<'static, PkgResult<PackageSet>>;
}
