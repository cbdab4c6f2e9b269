//! Group membership, typed group properties and weighted member sampling
//! for agent-based population models.
//!
//! People belong to any number of groups. Each group has one type, and each
//! type defines typed properties with defaults. The [`engine::groups::GroupStore`]
//! keeps membership and property state, emits an event per change, defers
//! structural removals to the host's plan queue, and exports its state as a
//! validated [`engine::snapshot::GroupsPluginData`] for checkpointing.

pub mod engine;

pub use engine::config::{GroupsConfig, SimulationConfig};
pub use engine::error::{ConfigError, GroupError, GroupResult, PropertyError, SnapshotError};
pub use engine::events::{EventKind, EventLabel, GroupEvent};
pub use engine::groups::{BulkGroupMembership, GroupStore};
pub use engine::property::{EnumType, PropertyDefinition, PropertyValue, ValueType};
pub use engine::sampler::GroupSampler;
pub use engine::simulation::{Simulation, SimulationCheckpoint};
pub use engine::snapshot::{GroupsPluginData, GroupsPluginDataBuilder};
pub use engine::types::{GroupId, GroupPropertyId, GroupTypeId, PersonId, Time};
