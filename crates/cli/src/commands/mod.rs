//! CLI Commands

pub mod logs;
pub mod serve;
pub mod tenants;
