pub mod record;
pub mod store;

pub use record::{
    Artifact, Engagement, JobId, JobKind, JobRecord, JobStatus, JobStatusView, OwnerId,
};
pub use store::JobStore;
