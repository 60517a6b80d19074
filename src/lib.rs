pub mod allocation;
pub mod chain;
pub mod config;
pub mod error;
pub mod lists;
pub mod patterns;
pub mod processor;
pub mod queue;
pub mod ranking;
pub mod reward_case;
pub mod store;
pub mod tracer;
pub mod transfer_check;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use allocation::*;
pub use chain::*;
pub use config::*;
pub use error::*;
pub use lists::*;
pub use patterns::*;
pub use processor::*;
pub use queue::*;
pub use ranking::*;
pub use reward_case::*;
pub use store::*;
pub use tracer::*;
pub use transfer_check::*;
pub use types::*;
