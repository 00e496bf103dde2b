pub mod marker;
pub mod types;

// Re-export key types for convenience
pub use marker::{EventMark, EventMarker};
pub use types::{Event, ResourceAction};
