pub mod notifier;
pub mod observer;
pub mod parser;
pub mod snapshot;

pub use notifier::{BatchMessage, ProgressNotifier};
pub use observer::BatchObserver;
pub use parser::{classify, ProgressLine, ProgressParser};
pub use snapshot::{format_bytes, BatchSnapshot, ItemSnapshot};
