//! Documents and wire types.
//!
//! `common` types appear both in storage and on the wire, `db` types are
//! stored documents and `api` types are request and response bodies.

pub mod api;
pub mod auth;
pub mod common;
pub mod db;
pub mod mongodb;
pub mod store;
