// src/planner/mod.rs

//! Production path planning.
//!
//! Given an input metadata query and an ordered chain of application stages,
//! the planner computes the canonical basename, the output directory of every
//! stage, and the directory metadata claims that make the outputs findable.
//! [`ProductionJob`] drives the `draft -> checked -> created -> finalized`
//! life cycle and registers the result with the host.
//!
//! Planning is pure: the same chain and the same input metadata always yield
//! the same basename, directories and metadata.

pub mod basename;
pub mod job;
pub mod lfn;
pub mod plan;

use thiserror::Error;

pub use basename::Basename;
pub use job::{PlanState, ProductionJob};
pub use lfn::{Datatype, LfnRecord};
pub use plan::{plan_stage, InputMetadata, MetadataPlan, StageSpec};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("missing mandatory metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("stage '{stage}' has no ILDConfig")]
    MissingIldConfig { stage: String },

    #[error("output file name '{0}' must not contain '/'")]
    InvalidOutputFile(String),

    #[error("energy must be a positive integer, got '{0}'")]
    InvalidEnergy(String),

    #[error("energy is zero")]
    ZeroEnergy,

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("input query matched no files")]
    NoInputFiles,

    #[error("production has no application stages")]
    EmptyChain,

    #[error("cannot {op} a production in state {state}")]
    InvalidState { op: &'static str, state: PlanState },

    #[error("malformed basename '{0}'")]
    BadBasename(String),

    #[error("malformed LFN '{0}'")]
    BadLfn(String),
}
