//! Domain model (IDs, resource kinds, payloads, outcomes, status, errors).

pub mod artifacts;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod resource;
pub mod status;
pub mod task_kind;

pub use artifacts::{
    AccessibilityIssue, ApkFile, DisplayIssue, EmulatorDevice, EmulatorSlot, ScreenIdentity,
    Screenshot, SupplementaryFile, SupplementaryKind, TappabilityPrediction, UtgTrace,
};
pub use errors::{
    AlgorithmError, BusError, DeliveryError, ErrorKind, JobError, SinkError, StorageError,
};
pub use ids::{JobId, JobIdError};
pub use outcome::{FailedUnit, TaskReport, TaskResult, UnitOutcome};
pub use request::JobRequest;
pub use resource::{Origin, Resource, ResourceType, ResourceWrapper};
pub use status::{StatusKind, StatusUpdate};
pub use task_kind::{TaskKind, UnknownTask};
