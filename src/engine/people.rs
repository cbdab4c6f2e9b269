//! Person registry.
//!
//! The group store never creates or destroys people; it only asks whether a
//! person exists. [`People`] is the registry the simulation harness uses:
//! person ids are assigned from a counter that only increases and are never
//! reused.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::error::{GroupError, GroupResult, SnapshotError};
use crate::engine::types::{PersonId, MAX_ID};


/// Person lookup required by the group store.
pub trait PersonRegistry {
    fn person_exists(&self, person: PersonId) -> bool;
}

/// Checkpoint of a [`People`] registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeopleData {
    pub next_person_id: PersonId,
    pub people: Vec<PersonId>,
}

/// Dense registry of live people.
#[derive(Clone, Debug, Default)]
pub struct People {
    alive: Vec<bool>,
    count: usize,
}

impl People {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a registry. Every live id must lie below `next_person_id`
    /// and appear once.
    pub fn from_data(data: &PeopleData) -> GroupResult<Self> {
        let next = data.next_person_id;
        if next.0 > MAX_ID + 1 {
            return Err(SnapshotError::PersonIdOutOfRange(next).into());
        }
        let mut alive = vec![false; next.index()];
        for &person in &data.people {
            let slot = alive
                .get_mut(person.index())
                .ok_or(SnapshotError::PersonIdOutOfRange(person))?;
            if *slot {
                return Err(SnapshotError::DuplicatePerson(person).into());
            }
            *slot = true;
        }
        Ok(Self { alive, count: data.people.len() })
    }

    pub fn to_data(&self) -> PeopleData {
        PeopleData {
            next_person_id: PersonId(self.alive.len() as u64),
            people: self.person_ids(),
        }
    }

    pub fn add_person(&mut self) -> PersonId {
        let person = PersonId(self.alive.len() as u64);
        self.alive.push(true);
        self.count += 1;
        debug!(person = %person, "person added");
        person
    }

    /// Adds `n` people with consecutive ids.
    pub fn add_people(&mut self, n: usize) -> Vec<PersonId> {
        let start = self.alive.len() as u64;
        self.alive.resize(self.alive.len() + n, true);
        self.count += n;
        debug!(first = start, count = n, "people added");
        (start..start + n as u64).map(PersonId).collect()
    }

    pub fn remove_person(&mut self, person: PersonId) -> GroupResult<()> {
        match self.alive.get_mut(person.index()) {
            Some(alive) if *alive => {
                *alive = false;
                self.count -= 1;
                debug!(person = %person, "person removed");
                Ok(())
            }
            _ => Err(GroupError::UnknownPerson(person)),
        }
    }

    pub fn person_count(&self) -> usize {
        self.count
    }

    pub fn person_ids(&self) -> Vec<PersonId> {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(index, _)| PersonId(index as u64))
            .collect()
    }
}

impl PersonRegistry for People {
    #[inline]
    fn person_exists(&self, person: PersonId) -> bool {
        self.alive.get(person.index()).copied().unwrap_or(false)
    }
}
