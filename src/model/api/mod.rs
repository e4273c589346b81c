pub mod ballot;
pub mod id;
pub mod receipt;
pub mod results;
pub mod session;
