mod anomaly;
mod column;
mod database;
mod foreign_key;
mod index;
mod resolution;
mod routine;
mod table;

pub use anomaly::*;
pub use column::*;
pub use database::*;
pub use foreign_key::*;
pub use index::*;
pub use resolution::*;
pub use routine::*;
pub use table::*;
