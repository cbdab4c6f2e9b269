//! Immutable group snapshots and their builder.
//!
//! [`GroupsPluginData`] is the validated capture of every group type, group,
//! property definition, non-default property value and membership. It is
//! both how a store is initialized and what a checkpoint exports. The only
//! way to obtain one is [`GroupsPluginDataBuilder::build`]; deserialization
//! goes through the same validation.
//!
//! ## Ordering
//! Group types and groups keep registration order. Property values keep the
//! order they were set in, and each group's members keep the order they were
//! added. Two snapshots built from the same sequence of builder calls
//! serialize to the same bytes.

use std::mem;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::engine::error::SnapshotError;
use crate::engine::property::{PropertyDefinition, PropertyValue};
use crate::engine::types::{id_in_range, GroupId, GroupPropertyId, GroupTypeId, PersonId, MAX_ID};


/// Validated group state.
#[derive(Clone, Debug, Default, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(into = "SnapshotRecord", try_from = "SnapshotRecord")]
pub struct GroupsPluginData {
    group_types: IndexSet<GroupTypeId>,
    groups: IndexMap<GroupId, GroupTypeId>,
    definitions: IndexMap<GroupTypeId, IndexMap<GroupPropertyId, PropertyDefinition>>,
    values: IndexMap<GroupId, IndexMap<GroupPropertyId, PropertyValue>>,
    members: IndexMap<GroupId, IndexSet<PersonId>>,
    next_group_id: GroupId,
}

impl GroupsPluginData {
    pub fn builder() -> GroupsPluginDataBuilder {
        GroupsPluginDataBuilder::new()
    }

    /// A builder holding an independent copy of this snapshot.
    pub fn clone_builder(&self) -> GroupsPluginDataBuilder {
        GroupsPluginDataBuilder {
            group_types: self.group_types.clone(),
            groups: self.groups.clone(),
            definitions: self.definitions.clone(),
            values: self.values.clone(),
            members: self.members.clone(),
            next_group_id: Some(self.next_group_id),
        }
    }

    pub fn group_type_ids(&self) -> Vec<GroupTypeId> {
        self.group_types.iter().copied().collect()
    }

    pub fn group_type_exists(&self, group_type: GroupTypeId) -> bool {
        self.group_types.contains(&group_type)
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_type(&self, group: GroupId) -> Option<GroupTypeId> {
        self.groups.get(&group).copied()
    }

    pub fn property_ids(&self, group_type: GroupTypeId) -> Vec<GroupPropertyId> {
        self.definitions
            .get(&group_type)
            .map(|definitions| definitions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn property_definition(
        &self,
        group_type: GroupTypeId,
        property: GroupPropertyId,
    ) -> Option<&PropertyDefinition> {
        self.definitions.get(&group_type)?.get(&property)
    }

    /// Explicit value of `property` on `group`, if one was stored.
    pub fn property_value(&self, group: GroupId, property: GroupPropertyId) -> Option<&PropertyValue> {
        self.values.get(&group)?.get(&property)
    }

    /// Every explicit value stored for `group`.
    pub fn property_values(&self, group: GroupId) -> Vec<(GroupPropertyId, PropertyValue)> {
        self.values
            .get(&group)
            .map(|values| values.iter().map(|(&p, v)| (p, v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn members(&self, group: GroupId) -> Vec<PersonId> {
        self.members
            .get(&group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn membership_count(&self) -> usize {
        self.members.values().map(IndexSet::len).sum()
    }

    pub fn next_group_id(&self) -> GroupId {
        self.next_group_id
    }

    /// Canonical JSON encoding.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes and validates a JSON encoding.
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Accumulates snapshot facts in any order and validates them in
/// [`build`](Self::build).
///
/// Re-adding a group replaces its type. Re-setting a value replaces it in
/// place. Adding a person to a group twice keeps one membership.
#[derive(Clone, Debug, Default)]
pub struct GroupsPluginDataBuilder {
    group_types: IndexSet<GroupTypeId>,
    groups: IndexMap<GroupId, GroupTypeId>,
    definitions: IndexMap<GroupTypeId, IndexMap<GroupPropertyId, PropertyDefinition>>,
    values: IndexMap<GroupId, IndexMap<GroupPropertyId, PropertyValue>>,
    members: IndexMap<GroupId, IndexSet<PersonId>>,
    next_group_id: Option<GroupId>,
}

impl GroupsPluginDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group_type(&mut self, group_type: GroupTypeId) -> &mut Self {
        self.group_types.insert(group_type);
        self
    }

    pub fn add_group(&mut self, group: GroupId, group_type: GroupTypeId) -> &mut Self {
        self.groups.insert(group, group_type);
        self
    }

    pub fn define_group_property(
        &mut self,
        group_type: GroupTypeId,
        property: GroupPropertyId,
        definition: PropertyDefinition,
    ) -> &mut Self {
        self.definitions.entry(group_type).or_default().insert(property, definition);
        self
    }

    pub fn set_group_property_value(
        &mut self,
        group: GroupId,
        property: GroupPropertyId,
        value: PropertyValue,
    ) -> &mut Self {
        self.values.entry(group).or_default().insert(property, value);
        self
    }

    pub fn add_person_to_group(&mut self, group: GroupId, person: PersonId) -> &mut Self {
        self.members.entry(group).or_default().insert(person);
        self
    }

    /// Overrides the next id. Defaults to one past the largest group id.
    pub fn set_next_group_id(&mut self, next: GroupId) -> &mut Self {
        self.next_group_id = Some(next);
        self
    }

    /// Validates the accumulated facts and produces a snapshot.
    ///
    /// The builder is left empty afterwards, whether or not validation
    /// succeeded.
    ///
    /// ## Validation order
    /// 1. membership groups exist
    /// 2. group types exist
    /// 3. property definition types exist
    /// 4. each stored value's group exists, its property is defined for the
    ///    group's type, and the value fits the definition
    /// 5. every definition carries a default that fits its type
    /// 6. group and person ids fit the dense slot range
    /// 7. the next group id exceeds every group id
    pub fn build(&mut self) -> Result<GroupsPluginData, SnapshotError> {
        let taken = mem::take(self);
        taken.validate()?;

        let largest = taken.groups.keys().copied().max();
        let next_group_id = match (taken.next_group_id, largest) {
            (Some(next), _) => next,
            (None, Some(largest)) => largest
                .checked_next()
                .ok_or(SnapshotError::GroupIdOutOfRange(largest))?,
            (None, None) => GroupId(0),
        };

        Ok(GroupsPluginData {
            group_types: taken.group_types,
            groups: taken.groups,
            definitions: taken.definitions,
            values: taken.values,
            members: taken.members,
            next_group_id,
        })
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        if let Some(&group) = self.members.keys().find(|g| !self.groups.contains_key(*g)) {
            return Err(SnapshotError::UnknownGroup(group));
        }

        if let Some(&group_type) = self.groups.values().find(|t| !self.group_types.contains(*t)) {
            return Err(SnapshotError::UnknownType(group_type));
        }

        if let Some(&group_type) = self.definitions.keys().find(|t| !self.group_types.contains(*t)) {
            return Err(SnapshotError::UnknownType(group_type));
        }

        for (&group, values) in &self.values {
            let group_type = *self.groups.get(&group).ok_or(SnapshotError::UnknownGroup(group))?;
            for (&property, value) in values {
                let definition = self
                    .definitions
                    .get(&group_type)
                    .and_then(|d| d.get(&property))
                    .ok_or(SnapshotError::UnknownProperty { group_type, property })?;
                definition.value_type().check(property, value)?;
            }
        }

        for (&group_type, definitions) in &self.definitions {
            for (&property, definition) in definitions {
                let default = definition
                    .default_value()
                    .ok_or(SnapshotError::PropertyDefinitionRequiresDefault { group_type, property })?;
                definition.value_type().check(property, default)?;
            }
        }

        if let Some(&group) = self.groups.keys().find(|g| !id_in_range(g.0)) {
            return Err(SnapshotError::GroupIdOutOfRange(group));
        }
        let person = self.members.values().flatten().find(|p| !id_in_range(p.0));
        if let Some(&person) = person {
            return Err(SnapshotError::PersonIdOutOfRange(person));
        }
        if let Some(next) = self.next_group_id.filter(|next| next.0 > MAX_ID + 1) {
            return Err(SnapshotError::GroupIdOutOfRange(next));
        }

        if let (Some(next), Some(&largest)) = (self.next_group_id, self.groups.keys().max()) {
            if next <= largest {
                return Err(SnapshotError::NextGroupIdTooSmall { next, largest });
            }
        }
        Ok(())
    }
}

/// Serialized layout: ordered lists, one per fact kind.
#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    group_types: Vec<GroupTypeId>,
    groups: Vec<(GroupId, GroupTypeId)>,
    property_definitions: Vec<(GroupTypeId, GroupPropertyId, PropertyDefinition)>,
    property_values: Vec<(GroupId, GroupPropertyId, PropertyValue)>,
    memberships: Vec<(GroupId, Vec<PersonId>)>,
    next_group_id: GroupId,
}

impl From<GroupsPluginData> for SnapshotRecord {
    fn from(data: GroupsPluginData) -> Self {
        SnapshotRecord {
            group_types: data.group_types.into_iter().collect(),
            groups: data.groups.into_iter().collect(),
            property_definitions: data
                .definitions
                .into_iter()
                .flat_map(|(t, defs)| defs.into_iter().map(move |(p, d)| (t, p, d)))
                .collect(),
            property_values: data
                .values
                .into_iter()
                .flat_map(|(g, values)| values.into_iter().map(move |(p, v)| (g, p, v)))
                .collect(),
            memberships: data
                .members
                .into_iter()
                .map(|(g, members)| (g, members.into_iter().collect()))
                .collect(),
            next_group_id: data.next_group_id,
        }
    }
}

impl TryFrom<SnapshotRecord> for GroupsPluginData {
    type Error = SnapshotError;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        let mut builder = GroupsPluginDataBuilder::new();
        for group_type in record.group_types {
            builder.add_group_type(group_type);
        }
        for (group, group_type) in record.groups {
            builder.add_group(group, group_type);
        }
        for (group_type, property, definition) in record.property_definitions {
            builder.define_group_property(group_type, property, definition);
        }
        for (group, property, value) in record.property_values {
            builder.set_group_property_value(group, property, value);
        }
        for (group, members) in record.memberships {
            for person in members {
                builder.add_person_to_group(group, person);
            }
        }
        builder.set_next_group_id(record.next_group_id);
        builder.build()
    }
}
