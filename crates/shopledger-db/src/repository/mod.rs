//! # Repository Implementations
//!
//! One repository per aggregate, each a thin clone-able handle over the
//! shared pool.

pub mod audit;
pub mod category;
pub mod item;
pub mod sale;
pub mod user;
