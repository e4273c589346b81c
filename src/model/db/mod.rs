pub mod election;
pub mod session;
pub mod vote_record;
