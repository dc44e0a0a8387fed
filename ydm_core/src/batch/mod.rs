pub mod coordinator;
pub mod manifest;
pub mod pending;
pub mod state;

pub use coordinator::{BatchCoordinator, BatchHandle};
pub use manifest::BatchManifest;
pub use pending::PendingList;
pub use state::BatchState;
