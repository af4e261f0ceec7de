//! Login-time cache population and background revalidation.

mod collections;
mod manager;

pub use collections::Collection;
pub use manager::{SyncManager, SyncResult};

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync rejected: logout in progress")]
    LogoutInProgress,

    #[error("sync already running")]
    AlreadyRunning,

    #[error("sync aborted while fetching {collection}")]
    Aborted { collection: &'static str },

    #[error("fetch failed for {collection}: {source}")]
    Fetch {
        collection: &'static str,
        #[source]
        source: ApiError,
    },
}
