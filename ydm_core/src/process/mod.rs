pub mod locate;
pub mod supervisor;

pub use locate::Locator;
pub use supervisor::{OutputLine, ProcessSupervisor, SupervisedProcess};
