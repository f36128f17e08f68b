//! Query subsystem: lexical retrieval, provider arbitration, and trace
//! emission, per spec.md §4.17.

pub mod engine;
pub mod providers;
pub mod trace;

pub use engine::{load_all_sessions, run_query, QueryEngineInput, SessionIndex};
pub use trace::{QueryAnswer, QueryResult};
