//! Reagent core library: live session transport, event reduction, session tracking and
//! REST access for a ReAct agent backend. Used by the CLI.

pub mod activity;
pub mod api;
pub mod chat;
pub mod config;
pub mod plan;
pub mod protocol;
pub mod reducer;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod ws;
