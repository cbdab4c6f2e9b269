//! Group membership adjacency.
//!
//! The index keeps four structures, all addressed directly by integer id:
//!
//! * group → members (insertion order),
//! * person → groups (ascending `GroupId`),
//! * group → type slot,
//! * type slot → groups (ascending `GroupId`).
//!
//! Lists live in `Vec<Option<Vec<_>>>` arrays, so the cost per entity is one
//! empty slot plus its actual memberships. Typical membership counts are
//! small, which keeps the linear duplicate checks cheap.
//!
//! ## Invariants
//! * `P ∈ members[G]` iff `G ∈ groups[P]`.
//! * A group has a type slot iff it is present in exactly one type list.
//!
//! Orderings are canonical, so an index rebuilt from an exported snapshot is
//! indistinguishable from the index it was exported from.

use crate::engine::error::{GroupError, GroupResult};
use crate::engine::types::{GroupId, PersonId};


/// Dense slot of a registered group type.
pub type TypeSlot = u32;

#[derive(Debug, Default, Clone)]
pub struct MembershipIndex {
    group_members: Vec<Option<Vec<PersonId>>>,
    person_groups: Vec<Option<Vec<GroupId>>>,
    group_types: Vec<Option<TypeSlot>>,
    type_groups: Vec<Vec<GroupId>>,
}

#[inline]
fn slot_mut<T>(slots: &mut Vec<Option<T>>, index: usize) -> &mut Option<T> {
    if slots.len() <= index {
        slots.resize_with(index + 1, || None);
    }
    &mut slots[index]
}

#[inline]
fn insert_sorted(list: &mut Vec<GroupId>, group: GroupId) {
    if let Err(position) = list.binary_search(&group) {
        list.insert(position, group);
    }
}

#[inline]
fn remove_sorted(list: &mut Vec<GroupId>, group: GroupId) -> bool {
    match list.binary_search(&group) {
        Ok(position) => {
            list.remove(position);
            true
        }
        Err(_) => false,
    }
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new type slot and returns it.
    pub fn add_type(&mut self) -> TypeSlot {
        self.type_groups.push(Vec::new());
        (self.type_groups.len() - 1) as TypeSlot
    }

    /// Number of registered type slots.
    pub fn type_count(&self) -> usize {
        self.type_groups.len()
    }

    /// Places `group` under `slot`. The group must be absent.
    pub fn add_group(&mut self, group: GroupId, slot: TypeSlot) {
        let entry = slot_mut(&mut self.group_types, group.index());
        debug_assert!(entry.is_none(), "group {group} is already indexed");
        *entry = Some(slot);
        insert_sorted(&mut self.type_groups[slot as usize], group);
    }

    /// Drops `group` and every membership it holds. Returns the former
    /// members in insertion order.
    pub fn remove_group(&mut self, group: GroupId) -> Vec<PersonId> {
        let Some(slot) = self.group_types.get_mut(group.index()).and_then(Option::take) else {
            return Vec::new();
        };
        remove_sorted(&mut self.type_groups[slot as usize], group);
        while matches!(self.group_types.last(), Some(None)) {
            self.group_types.pop();
        }

        let members = self
            .group_members
            .get_mut(group.index())
            .and_then(Option::take)
            .unwrap_or_default();
        for &person in &members {
            self.detach(person, group);
        }
        members
    }

    /// Drops every membership of `person`. Returns the groups left, ascending.
    pub fn remove_person(&mut self, person: PersonId) -> Vec<GroupId> {
        let groups = self
            .person_groups
            .get_mut(person.index())
            .and_then(Option::take)
            .unwrap_or_default();
        for &group in &groups {
            if let Some(Some(members)) = self.group_members.get_mut(group.index()) {
                if let Some(position) = members.iter().position(|&p| p == person) {
                    members.remove(position);
                }
                if members.is_empty() {
                    self.group_members[group.index()] = None;
                }
            }
        }
        groups
    }

    fn detach(&mut self, person: PersonId, group: GroupId) {
        if let Some(slot) = self.person_groups.get_mut(person.index()) {
            if let Some(groups) = slot {
                remove_sorted(groups, group);
                if groups.is_empty() {
                    *slot = None;
                }
            }
        }
    }

    pub fn contains_group(&self, group: GroupId) -> bool {
        self.type_of(group).is_some()
    }

    pub fn type_of(&self, group: GroupId) -> Option<TypeSlot> {
        self.group_types.get(group.index()).copied().flatten()
    }

    pub fn add_member(&mut self, group: GroupId, person: PersonId) -> GroupResult<()> {
        if !self.contains_group(group) {
            return Err(GroupError::UnknownGroup(group));
        }
        if self.contains(group, person) {
            return Err(GroupError::DuplicateMembership { group, person });
        }
        self.attach(group, person);
        Ok(())
    }

    /// Records the membership without checks. `group` must be indexed and
    /// must not already hold `person`.
    pub fn attach(&mut self, group: GroupId, person: PersonId) {
        debug_assert!(self.contains_group(group) && !self.contains(group, person));
        slot_mut(&mut self.group_members, group.index())
            .get_or_insert_with(Vec::new)
            .push(person);
        insert_sorted(
            slot_mut(&mut self.person_groups, person.index()).get_or_insert_with(Vec::new),
            group,
        );
    }

    pub fn remove_member(&mut self, group: GroupId, person: PersonId) -> GroupResult<()> {
        if !self.contains_group(group) {
            return Err(GroupError::UnknownGroup(group));
        }
        let Some(Some(members)) = self.group_members.get_mut(group.index()) else {
            return Err(GroupError::NotAMember { group, person });
        };
        let Some(position) = members.iter().position(|&p| p == person) else {
            return Err(GroupError::NotAMember { group, person });
        };
        members.remove(position);
        if members.is_empty() {
            self.group_members[group.index()] = None;
        }
        self.detach(person, group);
        Ok(())
    }

    /// Returns true if `person` belongs to `group`.
    ///
    /// Scans the shorter of the two adjacency lists.
    pub fn contains(&self, group: GroupId, person: PersonId) -> bool {
        let members = self.members_slice(group);
        let groups = self.groups_slice(person);
        if groups.len() <= members.len() {
            groups.binary_search(&group).is_ok()
        } else {
            members.contains(&person)
        }
    }

    #[inline]
    pub fn members_slice(&self, group: GroupId) -> &[PersonId] {
        self.group_members
            .get(group.index())
            .and_then(Option::as_deref)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn groups_slice(&self, person: PersonId) -> &[GroupId] {
        self.person_groups
            .get(person.index())
            .and_then(Option::as_deref)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn groups_of_type_slice(&self, slot: TypeSlot) -> &[GroupId] {
        self.type_groups.get(slot as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn members_of(&self, group: GroupId) -> Vec<PersonId> {
        self.members_slice(group).to_vec()
    }

    pub fn groups_of(&self, person: PersonId) -> Vec<GroupId> {
        self.groups_slice(person).to_vec()
    }

    pub fn groups_of_type(&self, slot: TypeSlot) -> Vec<GroupId> {
        self.groups_of_type_slice(slot).to_vec()
    }

    pub fn member_count(&self, group: GroupId) -> usize {
        self.members_slice(group).len()
    }

    pub fn group_count(&self, person: PersonId) -> usize {
        self.groups_slice(person).len()
    }

    /// Every indexed group, ascending.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.group_types
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| GroupId(index as u64))
            .collect()
    }
}
