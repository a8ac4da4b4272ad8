//! Priority-fallback routing.
//!
//! The [`RouterEngine`] walks an ordered provider table, one sequential
//! attempt at a time, classifying each transport-successful response and
//! falling back on errors and refusals until a provider is accepted or the
//! table (or the call's deadline budget) is exhausted.

pub mod attempt;
pub mod router;

pub use attempt::{AttemptOutcome, AttemptRecord};
pub use router::{ProviderRegistration, RouteOutcome, RouterEngine, RoutingResult};
