//! Liveness probing and readiness reporting
//!
//! The pool's acquisition path uses a [`LivenessProbe`] to keep dead
//! connections away from callers; [`HealthReport`] is what a readiness
//! endpoint or the `bboard health` command returns.

mod ping;
mod probe;
mod report;
mod status;


pub use ping::{PingError, PingResult, ping_connection};
pub use probe::{LivenessProbe, PingProbe, ProbePolicy};
pub use report::{DatabaseState, HealthReport};
pub use status::{HealthStatus, HealthThresholds};
