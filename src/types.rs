// src/types.rs

//! Shared identifiers and status vocabularies of the production system.
//!
//! Every status enum round-trips through the exact strings the workload
//! manager uses (`"Done"`, `"MCReconstruction_Overlay"`, ...), both via
//! `serde` and via `FromStr` / `Display`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type TransId = u64;
pub type TaskId = u64;
pub type JobId = u64;
pub type FileId = u64;
pub type RequestId = u64;

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {}: {other}",
                        stringify!($name)
                    )),
                }
            }
        }
    };
}

status_enum! {
    /// Kind of a transformation.
    TransformationType {
        McGeneration => "MCGeneration",
        McSimulation => "MCSimulation",
        McReconstruction => "MCReconstruction",
        McReconstructionOverlay => "MCReconstruction_Overlay",
        Merge => "Merge",
        Replication => "Replication",
        Moving => "Moving",
        Split => "Split",
    }
}

impl TransformationType {
    /// Generation transformations have no input files.
    pub fn is_generation(&self) -> bool {
        matches!(self, TransformationType::McGeneration)
    }

    /// Production transformations that read an input file per task.
    pub fn consumes_input(&self) -> bool {
        !self.is_generation()
    }

    /// Data-management transformations whose tasks are transfer requests.
    pub fn is_data_management(&self) -> bool {
        matches!(self, TransformationType::Replication | TransformationType::Moving)
    }
}

status_enum! {
    /// Lifecycle status of a transformation.
    TransformationStatus {
        Active => "Active",
        Completing => "Completing",
        Stopped => "Stopped",
        Cleaned => "Cleaned",
    }
}

status_enum! {
    /// Status of a grid job, mirrored into the task's external status.
    JobStatus {
        Waiting => "Waiting",
        Running => "Running",
        Done => "Done",
        Failed => "Failed",
        Killed => "Killed",
        Stalled => "Stalled",
    }
}

status_enum! {
    /// Status of a file inside one transformation.
    FileStatus {
        Unused => "Unused",
        Assigned => "Assigned",
        Processed => "Processed",
        MaxReset => "MaxReset",
        Problematic => "Problematic",
        Deleted => "Deleted",
    }
}

status_enum! {
    /// Status of a request queued in the request manager.
    RequestStatus {
        Waiting => "Waiting",
        Assigned => "Assigned",
        Done => "Done",
        Failed => "Failed",
        Canceled => "Canceled",
    }
}

status_enum! {
    /// Catalog view of a single LFN.
    CatalogState {
        Exists => "Exists",
        Missing => "Missing",
        /// The catalog call failed for this LFN.
        Unknown => "Unknown",
    }
}

/// Behaviour when an agent's next cycle comes due while the previous one is
/// still running.
///
/// - `Skip`: drop the due cycle (default).
/// - `Queue`: remember one due cycle and start it right after the running one
///   completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    #[default]
    Skip,
    Queue,
}

impl FromStr for OverrunPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(OverrunPolicy::Skip),
            "queue" => Ok(OverrunPolicy::Queue),
            other => Err(format!(
                "invalid overrun policy: {other} (expected \"skip\" or \"queue\")"
            )),
        }
    }
}

/// Zero-padded transformation id, as used for the `JobGroup` job attribute.
pub fn job_group(trans_id: TransId) -> String {
    format!("{trans_id:08}")
}
