#![forbid(unsafe_code)]
//! Persistence for watch progress and the catalog slice it depends on.

pub mod repository;
pub mod sqlite;
