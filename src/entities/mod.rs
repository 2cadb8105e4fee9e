//! `SeaORM` entities for the tables shared with the identity provider schema.

pub mod prelude;

pub mod generation;
pub mod user;
