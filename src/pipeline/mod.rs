pub mod extraction;
pub mod structuring;
pub mod processor; // Image -> records orchestration with region fallback
pub mod batch; // Directory runner over PNG lab reports
