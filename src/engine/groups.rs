//! The group store.
//!
//! [`GroupStore`] owns the membership index, one property column per
//! `(group type, property)` pair, and the sampler scratch buffers. It exposes
//! the mutation and query API and reports every logical change to its
//! [`SimulationHost`] as exactly one [`GroupEvent`].
//!
//! ## Group lifecycle
//! `absent → active → pending-removal → absent`. [`GroupStore::remove_group`]
//! moves a group to pending-removal, emits `GroupImminentRemoval` and
//! schedules [`GroupCommand::RemoveGroup`] at the current time. A pending
//! group stays fully queryable and mutable until the host applies the
//! command. Group ids are never reused.
//!
//! ## Failure model
//! Every precondition is checked before the first write. A call that returns
//! an error has not changed the store and has not emitted an event.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::engine::config::GroupsConfig;
use crate::engine::error::{GroupError, GroupResult, SnapshotError};
use crate::engine::events::GroupEvent;
use crate::engine::membership::{MembershipIndex, TypeSlot};
use crate::engine::people::PersonRegistry;
use crate::engine::property::{PropertyDefinition, PropertyValue};
use crate::engine::random::RandomSource;
use crate::engine::sampler::{lock_scratch, sample_members, GroupSampler, SampleScratch};
use crate::engine::scheduler::{GroupCommand, SimulationHost};
use crate::engine::snapshot::GroupsPluginData;
use crate::engine::storage::{make_column, PropertyColumn};
use crate::engine::types::{id_in_range, GroupId, GroupPropertyId, GroupTypeId, PersonId, Time, MAX_ID};


struct PropertyRecord {
    definition: PropertyDefinition,
    column: Box<dyn PropertyColumn>,
}

struct TypeRecord {
    slot: TypeSlot,
    properties: IndexMap<GroupPropertyId, PropertyRecord>,
}

/// New groups and memberships created in one call.
///
/// `memberships` pairs an index into the people passed alongside the batch
/// with an index into `group_types`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkGroupMembership {
    pub group_types: Vec<GroupTypeId>,
    pub memberships: Vec<(usize, usize)>,
}

impl BulkGroupMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group to create and returns its batch index.
    pub fn add_group(&mut self, group_type: GroupTypeId) -> usize {
        self.group_types.push(group_type);
        self.group_types.len() - 1
    }

    pub fn add_membership(&mut self, person_index: usize, group_index: usize) {
        self.memberships.push((person_index, group_index));
    }
}

pub struct GroupStore {
    config: GroupsConfig,
    types: IndexMap<GroupTypeId, TypeRecord>,
    membership: MembershipIndex,
    pending_removal: IndexSet<GroupId>,
    next_group_id: GroupId,
    scratch: RefCell<SampleScratch>,
}

impl fmt::Debug for GroupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupStore")
            .field("group_types", &self.types.len())
            .field("groups", &self.membership.group_ids().len())
            .field("pending_removal", &self.pending_removal)
            .field("next_group_id", &self.next_group_id)
            .finish()
    }
}

impl Default for GroupStore {
    fn default() -> Self {
        Self::new(GroupsConfig::default())
    }
}

impl GroupStore {
    pub fn new(config: GroupsConfig) -> Self {
        let scratch = RefCell::new(SampleScratch::with_capacity(config.sampler_capacity));
        Self {
            config,
            types: IndexMap::new(),
            membership: MembershipIndex::new(),
            pending_removal: IndexSet::new(),
            next_group_id: GroupId(0),
            scratch,
        }
    }

    pub fn config(&self) -> &GroupsConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // schema
    // ---------------------------------------------------------------------

    pub fn add_group_type(&mut self, group_type: GroupTypeId) -> GroupResult<()> {
        if self.types.contains_key(&group_type) {
            return Err(GroupError::DuplicateGroupType(group_type));
        }
        let slot = self.membership.add_type();
        debug_assert_eq!(slot as usize, self.types.len());
        self.types.insert(group_type, TypeRecord { slot, properties: IndexMap::new() });
        debug!(group_type = %group_type, "group type added");
        Ok(())
    }

    /// Defines a property on an existing type. Every definition needs a
    /// default, since existing and future groups fall back to it.
    pub fn define_group_property(
        &mut self,
        group_type: GroupTypeId,
        property: GroupPropertyId,
        definition: PropertyDefinition,
    ) -> GroupResult<()> {
        let record = self
            .types
            .get_mut(&group_type)
            .ok_or(GroupError::UnknownGroupType(group_type))?;
        if record.properties.contains_key(&property) {
            return Err(GroupError::DuplicateProperty { group_type, property });
        }
        if definition.default_value().is_none() {
            return Err(SnapshotError::PropertyDefinitionRequiresDefault { group_type, property }.into());
        }
        let column = make_column(property, definition.value_type());
        record.properties.insert(property, PropertyRecord { definition, column });
        debug!(group_type = %group_type, property = %property, "group property defined");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // groups
    // ---------------------------------------------------------------------

    pub fn add_group(&mut self, host: &mut impl SimulationHost, group_type: GroupTypeId) -> GroupResult<GroupId> {
        self.add_group_with_values(host, group_type, &[])
    }

    /// Adds a group with explicit values. Immutable properties may be given
    /// their value here.
    pub fn add_group_with_values(
        &mut self,
        host: &mut impl SimulationHost,
        group_type: GroupTypeId,
        values: &[(GroupPropertyId, PropertyValue)],
    ) -> GroupResult<GroupId> {
        let record = self
            .types
            .get(&group_type)
            .ok_or(GroupError::UnknownGroupType(group_type))?;
        for (property, value) in values {
            let property_record = record
                .properties
                .get(property)
                .ok_or(GroupError::UnknownProperty { group_type, property: *property })?;
            property_record.definition.value_type().check(*property, value)?;
        }

        let group = self.insert_group(host, group_type)?;
        let now = host.current_time();
        if let Some(record) = self.types.get_mut(&group_type) {
            for (property, value) in values {
                if let Some(property_record) = record.properties.get_mut(property) {
                    property_record.column.set(group.index(), value, now)?;
                }
            }
        }
        Ok(group)
    }

    fn insert_group(&mut self, host: &mut impl SimulationHost, group_type: GroupTypeId) -> GroupResult<GroupId> {
        let slot = self
            .types
            .get(&group_type)
            .map(|record| record.slot)
            .ok_or(GroupError::UnknownGroupType(group_type))?;
        self.check_id_capacity(1)?;
        Ok(self.create_group(host, group_type, slot))
    }

    /// Fails unless `count` more group ids fit the dense slot range.
    fn check_id_capacity(&self, count: usize) -> GroupResult<()> {
        let available = (MAX_ID + 1).saturating_sub(self.next_group_id.0);
        if count as u64 > available {
            return Err(GroupError::GroupIdsExhausted { next: self.next_group_id, requested: count });
        }
        Ok(())
    }

    /// Assigns the next id to a group under `slot`. The caller has checked
    /// the type and the id capacity.
    fn create_group(&mut self, host: &mut impl SimulationHost, group_type: GroupTypeId, slot: TypeSlot) -> GroupId {
        let group = self.next_group_id;
        self.next_group_id = GroupId(group.0 + 1);
        self.membership.add_group(group, slot);
        debug!(group = %group, group_type = %group_type, "group added");
        host.emit(GroupEvent::GroupAdded { group, group_type });
        group
    }

    /// Marks `group` for removal at the current time.
    pub fn remove_group(&mut self, host: &mut impl SimulationHost, group: GroupId) -> GroupResult<()> {
        let group_type = self.group_type_of(group)?;
        if self.pending_removal.contains(&group) {
            return Err(GroupError::GroupPendingRemoval(group));
        }
        self.pending_removal.insert(group);
        debug!(group = %group, "group removal scheduled");
        host.emit(GroupEvent::GroupImminentRemoval { group, group_type });
        let now = host.current_time();
        host.schedule(now, GroupCommand::RemoveGroup(group));
        Ok(())
    }

    /// Schedules removal of every membership of a person about to leave the
    /// simulation.
    pub fn handle_person_imminent_removal(
        &mut self,
        host: &mut impl SimulationHost,
        people: &impl PersonRegistry,
        person: PersonId,
    ) -> GroupResult<()> {
        if !people.person_exists(person) {
            return Err(GroupError::UnknownPerson(person));
        }
        debug!(person = %person, groups = self.membership.group_count(person), "person cleanup scheduled");
        let now = host.current_time();
        host.schedule(now, GroupCommand::RemovePersonFromGroups(person));
        Ok(())
    }

    /// Performs deferred structural work. Called by the host when the plan
    /// scheduled for `command` runs.
    ///
    /// Cleanup does not emit membership events; observers were told about
    /// the removal when it was requested.
    pub fn apply_command(&mut self, command: GroupCommand) {
        match command {
            GroupCommand::RemoveGroup(group) => {
                let Some(slot) = self.membership.type_of(group) else {
                    return;
                };
                if let Some((_, record)) = self.types.get_index_mut(slot as usize) {
                    for property_record in record.properties.values_mut() {
                        property_record.column.remove(group.index());
                    }
                }
                let members = self.membership.remove_group(group);
                self.pending_removal.shift_remove(&group);
                debug!(group = %group, members = members.len(), "group removed");
            }
            GroupCommand::RemovePersonFromGroups(person) => {
                let groups = self.membership.remove_person(person);
                debug!(person = %person, groups = groups.len(), "person removed from groups");
            }
        }
    }

    // ---------------------------------------------------------------------
    // membership
    // ---------------------------------------------------------------------

    pub fn add_person_to_group(
        &mut self,
        host: &mut impl SimulationHost,
        people: &impl PersonRegistry,
        person: PersonId,
        group: GroupId,
    ) -> GroupResult<()> {
        if !people.person_exists(person) {
            return Err(GroupError::UnknownPerson(person));
        }
        let group_type = self.group_type_of(group)?;
        self.membership.add_member(group, person)?;
        debug!(group = %group, person = %person, "membership added");
        host.emit(GroupEvent::MembershipAdded { group, group_type, person });
        Ok(())
    }

    pub fn remove_person_from_group(
        &mut self,
        host: &mut impl SimulationHost,
        people: &impl PersonRegistry,
        person: PersonId,
        group: GroupId,
    ) -> GroupResult<()> {
        if !people.person_exists(person) {
            return Err(GroupError::UnknownPerson(person));
        }
        let group_type = self.group_type_of(group)?;
        self.membership.remove_member(group, person)?;
        debug!(group = %group, person = %person, "membership removed");
        host.emit(GroupEvent::MembershipRemoved { group, group_type, person });
        Ok(())
    }

    /// Creates the batch's groups and memberships for `new_people`.
    ///
    /// Every group type, person index, group index and pair is validated
    /// before anything is created; on failure the error names the first
    /// offending entry in batch order. Two entries naming the same person
    /// and group are duplicates even when they use different person
    /// indices. Returns the new group ids in batch order.
    pub fn add_bulk_memberships<P>(
        &mut self,
        host: &mut impl SimulationHost,
        people: &P,
        new_people: &[PersonId],
        batch: &BulkGroupMembership,
    ) -> GroupResult<Vec<GroupId>>
    where
        P: PersonRegistry + Sync,
    {
        let types = &self.types;
        let unknown_type = batch
            .group_types
            .par_iter()
            .find_map_first(|t| (!types.contains_key(t)).then_some(GroupError::UnknownGroupType(*t)));
        if let Some(err) = unknown_type {
            return Err(err);
        }

        let person_count = new_people.len();
        let group_count = batch.group_types.len();
        let bad_entry = batch.memberships.par_iter().find_map_first(|&(person_index, group_index)| {
            let Some(&person) = new_people.get(person_index) else {
                return Some(GroupError::UnknownPersonIndex { index: person_index, count: person_count });
            };
            if group_index >= group_count {
                return Some(GroupError::UnknownGroupIndex { index: group_index, count: group_count });
            }
            (!people.person_exists(person)).then_some(GroupError::UnknownPerson(person))
        });
        if let Some(err) = bad_entry {
            return Err(err);
        }

        let mut seen = HashSet::with_capacity(batch.memberships.len());
        for &(person_index, group_index) in &batch.memberships {
            if !seen.insert((new_people[person_index], group_index)) {
                return Err(GroupError::DuplicateBulkMembership { person_index, group_index });
            }
        }
        self.check_id_capacity(group_count)?;

        let slots: Vec<TypeSlot> = batch
            .group_types
            .iter()
            .filter_map(|group_type| self.types.get(group_type).map(|record| record.slot))
            .collect();
        let mut groups = Vec::with_capacity(group_count);
        for (&group_type, &slot) in batch.group_types.iter().zip(&slots) {
            groups.push(self.create_group(host, group_type, slot));
        }
        for &(person_index, group_index) in &batch.memberships {
            let (person, group) = (new_people[person_index], groups[group_index]);
            self.membership.attach(group, person);
            host.emit(GroupEvent::MembershipAdded {
                group,
                group_type: batch.group_types[group_index],
                person,
            });
        }
        debug!(groups = groups.len(), memberships = batch.memberships.len(), "bulk memberships added");
        Ok(groups)
    }

    // ---------------------------------------------------------------------
    // properties
    // ---------------------------------------------------------------------

    pub fn set_group_property_value(
        &mut self,
        host: &mut impl SimulationHost,
        group: GroupId,
        property: GroupPropertyId,
        value: PropertyValue,
    ) -> GroupResult<()> {
        let group_type = self.group_type_of(group)?;
        let now = host.current_time();
        let record = self
            .types
            .get_mut(&group_type)
            .and_then(|record| record.properties.get_mut(&property))
            .ok_or(GroupError::UnknownProperty { group_type, property })?;
        if !record.definition.is_mutable() {
            return Err(GroupError::ImmutableProperty(property));
        }

        let previous = record
            .column
            .set(group.index(), &value, now)?
            .or_else(|| record.definition.default_value().cloned())
            .ok_or(GroupError::PropertyValueUnavailable { group, property })?;
        trace!(group = %group, property = %property, value = %value, "group property set");
        host.emit(GroupEvent::PropertyUpdated {
            group,
            group_type,
            property,
            previous,
            current: value,
        });
        Ok(())
    }

    fn property_record(&self, group: GroupId, property: GroupPropertyId) -> GroupResult<&PropertyRecord> {
        let group_type = self.group_type_of(group)?;
        self.types
            .get(&group_type)
            .and_then(|record| record.properties.get(&property))
            .ok_or(GroupError::UnknownProperty { group_type, property })
    }

    /// Current value, falling back to the definition's default.
    pub fn group_property_value(&self, group: GroupId, property: GroupPropertyId) -> GroupResult<PropertyValue> {
        let record = self.property_record(group, property)?;
        record
            .column
            .get(group.index())
            .or_else(|| record.definition.default_value().cloned())
            .ok_or(GroupError::PropertyValueUnavailable { group, property })
    }

    /// Time of the last explicit write; `None` while the default applies.
    pub fn group_property_time(&self, group: GroupId, property: GroupPropertyId) -> GroupResult<Option<Time>> {
        Ok(self.property_record(group, property)?.column.time_of(group.index()))
    }

    pub fn property_ids(&self, group_type: GroupTypeId) -> GroupResult<Vec<GroupPropertyId>> {
        let record = self.type_record(group_type)?;
        Ok(record.properties.keys().copied().collect())
    }

    pub fn property_definition(
        &self,
        group_type: GroupTypeId,
        property: GroupPropertyId,
    ) -> GroupResult<&PropertyDefinition> {
        self.type_record(group_type)?
            .properties
            .get(&property)
            .map(|record| &record.definition)
            .ok_or(GroupError::UnknownProperty { group_type, property })
    }

    pub fn property_exists(&self, group_type: GroupTypeId, property: GroupPropertyId) -> bool {
        self.types
            .get(&group_type)
            .map_or(false, |record| record.properties.contains_key(&property))
    }

    // ---------------------------------------------------------------------
    // queries
    // ---------------------------------------------------------------------

    fn type_record(&self, group_type: GroupTypeId) -> GroupResult<&TypeRecord> {
        self.types.get(&group_type).ok_or(GroupError::UnknownGroupType(group_type))
    }

    fn type_id_of_slot(&self, slot: TypeSlot) -> Option<GroupTypeId> {
        self.types.get_index(slot as usize).map(|(id, _)| *id)
    }

    #[inline] pub fn group_exists(&self, group: GroupId) -> bool { self.membership.contains_group(group) }
    #[inline] pub fn group_type_exists(&self, group_type: GroupTypeId) -> bool { self.types.contains_key(&group_type) }
    #[inline] pub fn is_pending_removal(&self, group: GroupId) -> bool { self.pending_removal.contains(&group) }
    #[inline] pub fn next_group_id(&self) -> GroupId { self.next_group_id }

    /// Registered types in registration order.
    pub fn group_type_ids(&self) -> Vec<GroupTypeId> {
        self.types.keys().copied().collect()
    }

    /// Every group, ascending.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.membership.group_ids()
    }

    pub fn group_type_of(&self, group: GroupId) -> GroupResult<GroupTypeId> {
        self.membership
            .type_of(group)
            .and_then(|slot| self.type_id_of_slot(slot))
            .ok_or(GroupError::UnknownGroup(group))
    }

    pub fn groups_for_type(&self, group_type: GroupTypeId) -> GroupResult<Vec<GroupId>> {
        let slot = self.type_record(group_type)?.slot;
        Ok(self.membership.groups_of_type(slot))
    }

    pub fn group_count_for_type(&self, group_type: GroupTypeId) -> GroupResult<usize> {
        let slot = self.type_record(group_type)?.slot;
        Ok(self.membership.groups_of_type_slice(slot).len())
    }

    /// Groups of `person`, ascending. Empty for people the store has never
    /// seen.
    pub fn groups_for_person(&self, person: PersonId) -> Vec<GroupId> {
        self.membership.groups_of(person)
    }

    pub fn group_count_for_person(&self, person: PersonId) -> usize {
        self.membership.group_count(person)
    }

    pub fn groups_for_person_and_type(
        &self,
        person: PersonId,
        group_type: GroupTypeId,
    ) -> GroupResult<Vec<GroupId>> {
        let slot = self.type_record(group_type)?.slot;
        Ok(self
            .membership
            .groups_slice(person)
            .iter()
            .copied()
            .filter(|&group| self.membership.type_of(group) == Some(slot))
            .collect())
    }

    /// Distinct types of the groups `person` belongs to, in registration
    /// order.
    pub fn group_types_for_person(&self, person: PersonId) -> Vec<GroupTypeId> {
        let mut slots: Vec<TypeSlot> = self
            .membership
            .groups_slice(person)
            .iter()
            .filter_map(|&group| self.membership.type_of(group))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots.into_iter().filter_map(|slot| self.type_id_of_slot(slot)).collect()
    }

    /// Members of `group` in the order they joined.
    pub fn people_for_group(&self, group: GroupId) -> GroupResult<Vec<PersonId>> {
        self.group_type_of(group)?;
        Ok(self.membership.members_of(group))
    }

    pub fn person_count_for_group(&self, group: GroupId) -> GroupResult<usize> {
        self.group_type_of(group)?;
        Ok(self.membership.member_count(group))
    }

    /// Distinct people in any group of `group_type`, ascending.
    pub fn people_for_group_type(&self, group_type: GroupTypeId) -> GroupResult<Vec<PersonId>> {
        let slot = self.type_record(group_type)?.slot;
        let mut people: Vec<PersonId> = self
            .membership
            .groups_of_type_slice(slot)
            .iter()
            .flat_map(|&group| self.membership.members_slice(group).iter().copied())
            .collect();
        people.sort_unstable();
        people.dedup();
        Ok(people)
    }

    pub fn person_count_for_group_type(&self, group_type: GroupTypeId) -> GroupResult<usize> {
        Ok(self.people_for_group_type(group_type)?.len())
    }

    pub fn is_person_in_group(&self, person: PersonId, group: GroupId) -> GroupResult<bool> {
        self.group_type_of(group)?;
        Ok(self.membership.contains(group, person))
    }

    // ---------------------------------------------------------------------
    // sampling
    // ---------------------------------------------------------------------

    /// Draws one member of `group` according to `sampler`.
    ///
    /// Returns `None` when no member is eligible.
    ///
    /// # Panics
    /// Panics with an access violation when called from inside a weighting
    /// function of a sample already running on this store.
    pub fn sample_group(
        &self,
        people: &impl PersonRegistry,
        group: GroupId,
        sampler: &GroupSampler,
        rng: &mut dyn RandomSource,
    ) -> GroupResult<Option<PersonId>> {
        let mut scratch = lock_scratch(&self.scratch);
        self.group_type_of(group)?;
        if let Some(excluded) = sampler.excluded_person() {
            if !people.person_exists(excluded) {
                return Err(GroupError::UnknownPerson(excluded));
            }
        }
        let members = self.membership.members_slice(group);
        sample_members(&mut scratch, self, group, members, sampler, rng)
    }

    // ---------------------------------------------------------------------
    // snapshots
    // ---------------------------------------------------------------------

    /// Builds a store from a snapshot.
    ///
    /// Loading runs types, property definitions, groups, memberships, then
    /// property values. Every member must be a live person. Loaded values
    /// carry write time zero.
    pub fn from_snapshot(
        config: GroupsConfig,
        data: &GroupsPluginData,
        people: &impl PersonRegistry,
    ) -> GroupResult<Self> {
        let mut store = GroupStore::new(config);
        for group_type in data.group_type_ids() {
            store.add_group_type(group_type)?;
            for property in data.property_ids(group_type) {
                if let Some(definition) = data.property_definition(group_type, property) {
                    store.define_group_property(group_type, property, definition.clone())?;
                }
            }
        }

        let mut groups = data.group_ids();
        groups.sort_unstable();
        for &group in &groups {
            if !id_in_range(group.0) {
                return Err(SnapshotError::GroupIdOutOfRange(group).into());
            }
            let group_type = data.group_type(group).ok_or(GroupError::UnknownGroup(group))?;
            let slot = store.type_record(group_type)?.slot;
            store.membership.add_group(group, slot);
        }

        for &group in &groups {
            for person in data.members(group) {
                if !id_in_range(person.0) {
                    return Err(SnapshotError::PersonIdOutOfRange(person).into());
                }
                if !people.person_exists(person) {
                    return Err(GroupError::UnknownPerson(person));
                }
                store.membership.add_member(group, person)?;
            }
        }

        for &group in &groups {
            let group_type = store.group_type_of(group)?;
            for (property, value) in data.property_values(group) {
                let record = store
                    .types
                    .get_mut(&group_type)
                    .and_then(|record| record.properties.get_mut(&property))
                    .ok_or(GroupError::UnknownProperty { group_type, property })?;
                record.column.set(group.index(), &value, 0.0)?;
            }
        }

        store.next_group_id = data.next_group_id();
        info!(
            group_types = store.types.len(),
            groups = groups.len(),
            memberships = data.membership_count(),
            "group store loaded from snapshot"
        );
        Ok(store)
    }

    /// Exports the current state.
    ///
    /// Groups are written in ascending id order with members in join order.
    /// A property value is written only when it differs from the default.
    pub fn to_snapshot(&self) -> GroupResult<GroupsPluginData> {
        let mut builder = GroupsPluginData::builder();
        for (&group_type, record) in &self.types {
            builder.add_group_type(group_type);
            for (&property, property_record) in &record.properties {
                builder.define_group_property(group_type, property, property_record.definition.clone());
            }
        }

        let groups = self.membership.group_ids();
        for &group in &groups {
            let group_type = self.group_type_of(group)?;
            builder.add_group(group, group_type);
            if let Some(record) = self.types.get(&group_type) {
                for (&property, property_record) in &record.properties {
                    let Some(value) = property_record.column.get(group.index()) else {
                        continue;
                    };
                    if property_record.definition.default_value() != Some(&value) {
                        builder.set_group_property_value(group, property, value);
                    }
                }
            }
            for &person in self.membership.members_slice(group) {
                builder.add_person_to_group(group, person);
            }
        }
        builder.set_next_group_id(self.next_group_id);

        let data = builder.build()?;
        info!(groups = groups.len(), next_group_id = %self.next_group_id, "group snapshot exported");
        Ok(data)
    }
}
