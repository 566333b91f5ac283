#![doc(test(attr(deny(warnings))))]

//! Schedule Core is a deterministic personal-schedule engine: recurrence
//! pattern expansion, completion-history queries, parent-child chains, and a
//! constraint-solving reflow that places every instance or explains why it
//! cannot.

pub mod calendar;
pub mod completion;
pub mod condition;
pub mod cycling;
pub mod errors;
pub mod links;
pub mod overview;
pub mod pattern;
pub mod reflow;
pub mod series;
pub mod storage;
pub mod store;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
pub fn init() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::from_default_env().add_directive("schedule_core=info".parse().unwrap());

        fmt().with_env_filter(filter).init();
        tracing::info!("Schedule Core tracing initialized.");
    });
}
