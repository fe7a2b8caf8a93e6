pub mod config;
pub mod pipeline;

pub use pipeline::extraction::{ExtractionError, OcrEngine, TableGrid, WordBox};
pub use pipeline::processor::LabReportProcessor;
pub use pipeline::structuring::{LabTestParser, LabTestRecord, TestValue};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
