pub mod format_builder;
pub mod formats;

pub use format_builder::{build_args, format_selector, resolve_output_template};
pub use formats::{probe_formats, resolve_quality, FormatTable, MediaFormat};
