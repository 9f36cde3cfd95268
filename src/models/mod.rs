// Domain models

mod container;
mod policy;
mod report;

pub use container::{ContainerRecord, SHORT_ID_LEN, VethPair, display_name, short_id};
pub use policy::{
    Bandwidth, DEFAULT_BANDWIDTH, LABEL_CEIL, LABEL_ENABLED, LABEL_RATE, Policy, resolve_policy,
};
pub use report::{PassOutcome, PassReport, StatusSnapshot};
