//! Database module exports.

mod backend;
mod mongo;

pub use backend::MongoBackend;
pub use mongo::Database;
