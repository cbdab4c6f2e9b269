//! Weighted and uniform selection of group members.
//!
//! ## Algorithm
//! Without a weighting function a member is drawn uniformly, re-rolling when
//! the draw lands on the excluded person.
//!
//! With a weighting function every member except the excluded one is
//! weighed. Negative, NaN or infinite weights are rejected, as is a running
//! sum that overflows. Zero weights drop the member from the draw. The
//! running sum of positive weights is written into a scratch array next to
//! the matching person ids. A target `u * sum` with `u ∈ [0, 1)` is then
//! located by binary search for the first cumulative entry `>= target`. When
//! consecutive entries are equal the earliest one wins.
//!
//! ## Scratch buffers
//! The scratch arrays are owned by the store and reused across calls. They
//! sit behind a `RefCell`; one sample call holds the exclusive borrow from
//! start to finish. A weighting function that samples again while the
//! borrow is held is a contract violation and panics.

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::engine::error::{GroupError, GroupResult};
use crate::engine::groups::GroupStore;
use crate::engine::random::{RandomSource, RandomStreamId};
use crate::engine::types::{GroupId, PersonId, DEFAULT_SAMPLER_CAPACITY};


/// Maps `(person, group)` to a non-negative, finite selection weight.
pub type GroupWeightingFn = dyn Fn(&GroupStore, PersonId, GroupId) -> f64;

/// Selection settings for [`GroupStore::sample_group`].
#[derive(Clone, Default)]
pub struct GroupSampler {
    excluded_person: Option<PersonId>,
    weighting: Option<Arc<GroupWeightingFn>>,
    stream: Option<RandomStreamId>,
}

impl fmt::Debug for GroupSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSampler")
            .field("excluded_person", &self.excluded_person)
            .field("weighted", &self.weighting.is_some())
            .field("stream", &self.stream)
            .finish()
    }
}

impl GroupSampler {
    /// Uniform sampling over all members from the global stream.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding(mut self, person: PersonId) -> Self {
        self.excluded_person = Some(person);
        self
    }

    pub fn weighted<F>(mut self, weighting: F) -> Self
    where
        F: Fn(&GroupStore, PersonId, GroupId) -> f64 + 'static,
    {
        self.weighting = Some(Arc::new(weighting));
        self
    }

    pub fn with_stream(mut self, stream: RandomStreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn excluded_person(&self) -> Option<PersonId> {
        self.excluded_person
    }

    pub fn weighting(&self) -> Option<&GroupWeightingFn> {
        self.weighting.as_deref()
    }

    pub fn stream(&self) -> Option<RandomStreamId> {
        self.stream
    }
}

/// Reusable cumulative-weight and person-id arrays.
///
/// Invariant: `weights.len() == people.len()`; the arrays grow and never
/// shrink.
#[derive(Debug)]
pub struct SampleScratch {
    weights: Vec<f64>,
    people: Vec<PersonId>,
}

impl Default for SampleScratch {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SAMPLER_CAPACITY)
    }
}

impl SampleScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            weights: vec![0.0; capacity],
            people: vec![PersonId(0); capacity],
        }
    }

    /// Current length of both arrays.
    pub fn capacity(&self) -> usize {
        self.weights.len()
    }

    /// Grows by half, or straight to `needed` when that is larger.
    fn ensure(&mut self, needed: usize) {
        let current = self.weights.len();
        if current >= needed {
            return;
        }
        let grown = (current + current / 2).max(needed);
        self.weights.resize(grown, 0.0);
        self.people.resize(grown, PersonId(0));
    }
}

/// Takes the exclusive scratch borrow for one sample call.
///
/// # Panics
/// Panics if a sample call is already in progress on the same store.
pub fn lock_scratch(scratch: &RefCell<SampleScratch>) -> RefMut<'_, SampleScratch> {
    match scratch.try_borrow_mut() {
        Ok(guard) => guard,
        Err(_) => panic!("access violation: group sampling re-entered while a sample is in progress"),
    }
}

/// Draws from `members` of `group`.
///
/// `scratch` must be the guard taken by [`lock_scratch`] for this call.
pub fn sample_members(
    scratch: &mut SampleScratch,
    store: &GroupStore,
    group: GroupId,
    members: &[PersonId],
    sampler: &GroupSampler,
    rng: &mut dyn RandomSource,
) -> GroupResult<Option<PersonId>> {
    let excluded = sampler.excluded_person();
    let selected = match sampler.weighting() {
        None => sample_uniform(members, excluded, rng),
        Some(weighting) => sample_weighted(scratch, store, group, members, excluded, weighting, rng)?,
    };
    trace!(group = %group, selected = ?selected, "sampled group");
    Ok(selected)
}

fn sample_uniform(
    members: &[PersonId],
    excluded: Option<PersonId>,
    rng: &mut dyn RandomSource,
) -> Option<PersonId> {
    let excluded = excluded.filter(|person| members.contains(person));
    let Some(excluded) = excluded else {
        if members.is_empty() {
            return None;
        }
        return Some(members[rng.next_index(members.len())]);
    };

    if members.len() < 2 {
        return None;
    }
    loop {
        let candidate = members[rng.next_index(members.len())];
        if candidate != excluded {
            return Some(candidate);
        }
    }
}

fn sample_weighted(
    scratch: &mut SampleScratch,
    store: &GroupStore,
    group: GroupId,
    members: &[PersonId],
    excluded: Option<PersonId>,
    weighting: &GroupWeightingFn,
    rng: &mut dyn RandomSource,
) -> GroupResult<Option<PersonId>> {
    scratch.ensure(members.len());

    let mut sum = 0.0_f64;
    let mut count = 0usize;
    for &person in members {
        if Some(person) == excluded {
            continue;
        }
        let weight = weighting(store, person, group);
        if !weight.is_finite() || weight < 0.0 {
            return Err(GroupError::MalformedWeight { group, person, weight });
        }
        if weight == 0.0 {
            continue;
        }
        sum += weight;
        if !sum.is_finite() {
            return Err(GroupError::MalformedWeight { group, person, weight: sum });
        }
        scratch.weights[count] = sum;
        scratch.people[count] = person;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    let target = rng.next_f64() * sum;
    let cumulative = &scratch.weights[..count];
    let index = cumulative.partition_point(|&w| w < target).min(count - 1);
    Ok(Some(scratch.people[index]))
}
