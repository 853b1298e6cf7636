//! Storage backend implementations.
//!
//! Each backend module provides a concrete type that implements
//! [`CsiController`](crate::controller::CsiController).

pub mod qumulo;
