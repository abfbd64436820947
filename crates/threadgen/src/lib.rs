pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod stages;

pub use auth::{Authenticator, StaticTokenAuthenticator};
pub use config::{load_config, load_config_from_str, AppConfig, TimeoutConfig};
pub use dispatch::Dispatcher;
pub use error::{
    AuthError, ConfigError, QueryError, Result, StageError, SubmitError, ThreadgenError,
};
pub use job::{
    Artifact, Engagement, JobId, JobKind, JobRecord, JobStatus, JobStatusView, JobStore, OwnerId,
};
pub use pipeline::{Executor, StageSet};
