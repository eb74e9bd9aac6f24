#[cfg(any(test, feature = "test_utilities"))]
pub mod test_helpers;

mod error;
mod vendor;
mod quoting;
mod normalizer;
mod config;
mod metadata;
mod models;
mod progress;
mod parallel_runner;
mod schema_graph_builder;

pub use error::*;
pub use vendor::*;
pub use quoting::*;
pub use normalizer::*;
pub use config::*;
pub use metadata::*;
pub use models::*;
pub use progress::*;
pub use schema_graph_builder::*;


pub(crate) fn default<T: Default>() -> T {
    T::default()
}
