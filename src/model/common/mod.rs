pub mod ballot;
pub mod election;
pub mod session;
