//! HTTP API handlers for tphysio-ai

pub mod health;
pub mod process;
pub mod sse;

pub use health::health_routes;
pub use process::process_routes;
pub use sse::job_event_stream;
