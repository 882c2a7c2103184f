//! Shared CLI utilities: configuration loading and colored/tabular output.

pub mod config;
pub mod output;

pub use config::LogLensConfig;
pub use output::{print_error, print_header, print_info, print_kv, print_success, print_warning, FormattedTable, OutputFormat};
