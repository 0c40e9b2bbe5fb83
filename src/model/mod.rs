mod integration;
mod node;
mod replica_set;
mod status;

pub use integration::*;
pub use node::*;
pub use replica_set::*;
pub use status::*;
