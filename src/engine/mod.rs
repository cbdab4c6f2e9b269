//! Group membership engine.
//!
//! Leaf modules first: [`types`], [`error`], [`property`], [`storage`],
//! [`membership`], then the collaborators ([`random`], [`events`],
//! [`scheduler`], [`people`]), the [`sampler`], the [`groups`] store, its
//! [`snapshot`] format and the [`simulation`] harness.

pub mod config;
pub mod error;
pub mod events;
pub mod groups;
pub mod membership;
pub mod people;
pub mod property;
pub mod random;
pub mod sampler;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod storage;
pub mod types;
