//! The voting core: what makes a ballot valid, how a session evolves, and
//! how committed ballots become results.

pub mod catalog;
pub mod pipeline;
pub mod sealer;
pub mod selection;
pub mod session;
pub mod sweeper;
pub mod tally;
pub mod validator;
