//! Core library for GitHub Projects tooling shared by the ghproj CLI.

pub mod auth;
pub mod config;
pub mod graphql;
pub mod services;
