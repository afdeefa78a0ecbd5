//! # flowhub-domain
//!
//! Pure domain model for the flowhub dataflow automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **socket values** exchanged between nodes ([`value::Value`])
//! - Define the **graph model** (node specs, connections, evaluation order)
//! - Define **pending actions** (device-control requests emitted by nodes)
//! - Define **command / state-change records** and their causal attribution
//! - Define **notification events** and their classification
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod action;
pub mod entity;
pub mod graph;
pub mod notification;
pub mod record;
pub mod value;
