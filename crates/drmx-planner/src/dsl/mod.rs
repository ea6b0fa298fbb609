//! Text front ends for building expressions.

pub mod yaml;
