//! HTTP surface for CrewSearch: one-shot research and chat sessions that
//! carry their own search credential.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
