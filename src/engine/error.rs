//! Error types for the group subsystem.
//!
//! Precondition violations are returned as typed values carrying the
//! offending identifiers. A call that returns one of these leaves the store
//! exactly as it was before the call.
//!
//! Programming-contract violations (nested sampling, a corrupted plan queue)
//! are not represented here; they panic.

use thiserror::Error;

use crate::engine::types::{GroupId, GroupPropertyId, GroupTypeId, PersonId, Time};


/// Result alias used across the store API.
pub type GroupResult<T> = Result<T, GroupError>;

/// A value whose type does not match its property definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("property {property} expects `{expected}`, got `{actual}`")]
pub struct IncompatibleValueError {
    pub property: GroupPropertyId,
    pub expected: String,
    pub actual: String,
}

/// Precondition violations raised by the group store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupError {
    #[error("unknown group type {0}")]
    UnknownGroupType(GroupTypeId),

    #[error("group type {0} is already registered")]
    DuplicateGroupType(GroupTypeId),

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown person {0}")]
    UnknownPerson(PersonId),

    #[error("person index {index} out of bounds for a batch of {count} people")]
    UnknownPersonIndex { index: usize, count: usize },

    #[error("group index {index} out of bounds for a batch of {count} groups")]
    UnknownGroupIndex { index: usize, count: usize },

    #[error("property {property} is not defined for group type {group_type}")]
    UnknownProperty {
        group_type: GroupTypeId,
        property: GroupPropertyId,
    },

    #[error("property {property} is already defined for group type {group_type}")]
    DuplicateProperty {
        group_type: GroupTypeId,
        property: GroupPropertyId,
    },

    #[error(transparent)]
    IncompatibleValue(#[from] IncompatibleValueError),

    #[error("property {0} is immutable")]
    ImmutableProperty(GroupPropertyId),

    #[error("property {property} has neither a value nor a default for {group}")]
    PropertyValueUnavailable {
        group: GroupId,
        property: GroupPropertyId,
    },

    #[error("{person} is already a member of {group}")]
    DuplicateMembership { group: GroupId, person: PersonId },

    #[error("{person} is not a member of {group}")]
    NotAMember { group: GroupId, person: PersonId },

    #[error("batch assigns person index {person_index} to group index {group_index} more than once")]
    DuplicateBulkMembership {
        person_index: usize,
        group_index: usize,
    },

    #[error("cannot assign {requested} group ids starting at {next}, the id space is exhausted")]
    GroupIdsExhausted { next: GroupId, requested: usize },

    #[error("{0} is already scheduled for removal")]
    GroupPendingRemoval(GroupId),

    #[error("weight {weight} for {person} in {group} is negative, NaN, or infinite")]
    MalformedWeight {
        group: GroupId,
        person: PersonId,
        weight: f64,
    },

    #[error("cannot schedule at {time}, the clock is already at {now}")]
    PastTime { time: Time, now: Time },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Validation failures raised by `GroupsPluginDataBuilder::build`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown group type {0}")]
    UnknownType(GroupTypeId),

    #[error("property {property} is not defined for group type {group_type}")]
    UnknownProperty {
        group_type: GroupTypeId,
        property: GroupPropertyId,
    },

    #[error(transparent)]
    IncompatibleValue(#[from] IncompatibleValueError),

    #[error("property {property} of group type {group_type} requires a default value")]
    PropertyDefinitionRequiresDefault {
        group_type: GroupTypeId,
        property: GroupPropertyId,
    },

    #[error("next group id {next} must exceed every assigned id (largest is {largest})")]
    NextGroupIdTooSmall { next: GroupId, largest: GroupId },

    #[error("group id {0} exceeds the largest supported id")]
    GroupIdOutOfRange(GroupId),

    #[error("person id {0} is out of range")]
    PersonIdOutOfRange(PersonId),

    #[error("person {0} is listed more than once")]
    DuplicatePerson(PersonId),
}

/// Failures building a property definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("property definition has no value type")]
    MissingValueType,

    #[error("default value of type `{actual}` is not a `{expected}`")]
    IncompatibleDefault { expected: String, actual: String },

    #[error("enum type `{0}` has no variants")]
    EmptyEnum(String),
}

/// Failures loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`{field}` {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}
