//! Discrete-event harness around a [`GroupStore`].
//!
//! [`Simulation`] owns the store together with the collaborators it needs:
//! the person registry, the random streams, the plan queue and the event
//! bus. It is the store's [`SimulationHost`].
//!
//! ## Execution
//! Plans run in `(time, scheduling order)`. After each plan the events it
//! emitted are delivered to subscribers, and only then does the next plan
//! run. A deferred group removal scheduled by a plan therefore always runs
//! after every subscriber has seen `GroupImminentRemoval` with the group
//! still intact.
//!
//! ## Checkpoints
//! [`Simulation::checkpoint`] captures the clock, the group snapshot, the
//! person registry and the position of every random stream. Pending caller
//! actions are not captured; a resumed run schedules its own.

use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::config::SimulationConfig;
use crate::engine::error::{GroupError, GroupResult};
use crate::engine::events::{EventBus, EventLabel, GroupEvent, SubscriptionId};
use crate::engine::groups::{BulkGroupMembership, GroupStore};
use crate::engine::people::{People, PeopleData, PersonRegistry};
use crate::engine::property::{PropertyDefinition, PropertyValue};
use crate::engine::random::{RandomState, RandomStreams};
use crate::engine::sampler::GroupSampler;
use crate::engine::scheduler::{GroupCommand, PlanQueue, SimulationHost};
use crate::engine::snapshot::GroupsPluginData;
use crate::engine::types::{GroupId, GroupPropertyId, GroupTypeId, PersonId, Time};


/// Caller-supplied plan body.
pub type Action = Box<dyn FnOnce(&mut Simulation)>;

/// Work waiting in the plan queue.
enum Plan {
    Group(GroupCommand),
    RemovePerson(PersonId),
    Action(Action),
}

/// Clock, plan queue and undelivered events. This is the part of the
/// simulation the store mutates through [`SimulationHost`].
#[derive(Default)]
struct Context {
    time: Time,
    plans: PlanQueue<Plan>,
    events: Vec<GroupEvent>,
}

impl SimulationHost for Context {
    #[inline]
    fn current_time(&self) -> Time {
        self.time
    }

    fn schedule(&mut self, time: Time, command: GroupCommand) {
        if !(time >= self.time) {
            panic!("access violation: {command:?} scheduled at {time}, clock is at {}", self.time);
        }
        self.plans.push(time, Plan::Group(command));
    }

    #[inline]
    fn emit(&mut self, event: GroupEvent) {
        self.events.push(event);
    }
}

/// Resumable state of a [`Simulation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationCheckpoint {
    pub time: Time,
    pub groups: GroupsPluginData,
    pub people: PeopleData,
    pub random: RandomState,
}

impl SimulationCheckpoint {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

pub struct Simulation {
    config: SimulationConfig,
    groups: GroupStore,
    people: People,
    random: RandomStreams,
    context: Context,
    bus: EventBus,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let groups = GroupStore::new(config.groups.clone());
        let random = RandomStreams::new(config.seed);
        Self {
            config,
            groups,
            people: People::new(),
            random,
            context: Context::default(),
            bus: EventBus::new(),
        }
    }

    /// Starts a simulation whose groups come from `data`. Every member must
    /// be in `people`.
    pub fn with_groups(config: SimulationConfig, data: &GroupsPluginData, people: People) -> GroupResult<Self> {
        let groups = GroupStore::from_snapshot(config.groups.clone(), data, &people)?;
        let mut simulation = Self::new(config);
        simulation.groups = groups;
        simulation.people = people;
        Ok(simulation)
    }

    /// Continues a run from `checkpoint`. The checkpoint's random state
    /// replaces the seed in `config`.
    pub fn resume(config: SimulationConfig, checkpoint: &SimulationCheckpoint) -> GroupResult<Self> {
        let people = People::from_data(&checkpoint.people)?;
        let groups = GroupStore::from_snapshot(config.groups.clone(), &checkpoint.groups, &people)?;
        let random = RandomStreams::restore(&checkpoint.random);
        info!(time = checkpoint.time, people = people.person_count(), "simulation resumed");
        Ok(Self {
            config,
            groups,
            people,
            random,
            context: Context { time: checkpoint.time, ..Context::default() },
            bus: EventBus::new(),
        })
    }

    /// Captures resumable state. Plans due at the current time run first.
    pub fn checkpoint(&mut self) -> GroupResult<SimulationCheckpoint> {
        self.run_until(self.context.time);
        let checkpoint = SimulationCheckpoint {
            time: self.context.time,
            groups: self.groups.to_snapshot()?,
            people: self.people.to_data(),
            random: self.random.checkpoint(),
        };
        info!(time = checkpoint.time, pending_plans = self.context.plans.len(), "simulation checkpointed");
        Ok(checkpoint)
    }

    #[inline] pub fn config(&self) -> &SimulationConfig { &self.config }
    #[inline] pub fn time(&self) -> Time { self.context.time }
    #[inline] pub fn groups(&self) -> &GroupStore { &self.groups }
    #[inline] pub fn people(&self) -> &People { &self.people }
    #[inline] pub fn random(&mut self) -> &mut RandomStreams { &mut self.random }
    #[inline] pub fn pending_plans(&self) -> usize { self.context.plans.len() }

    // ---------------------------------------------------------------------
    // plans
    // ---------------------------------------------------------------------

    pub fn schedule_action<F>(&mut self, time: Time, action: F) -> GroupResult<()>
    where
        F: FnOnce(&mut Simulation) + 'static,
    {
        let now = self.context.time;
        if !(time >= now) {
            return Err(GroupError::PastTime { time, now });
        }
        self.context.plans.push(time, Plan::Action(Box::new(action)));
        Ok(())
    }

    /// Runs every plan due at or before `until`, then advances the clock to
    /// `until`.
    pub fn run_until(&mut self, until: Time) {
        self.deliver_events();
        while let Some((time, plan)) = self.context.plans.pop_due(until) {
            self.context.time = time;
            self.execute(plan);
            self.deliver_events();
        }
        if until.is_finite() && until > self.context.time {
            self.context.time = until;
        }
    }

    /// Runs until the plan queue is empty.
    pub fn run(&mut self) {
        self.deliver_events();
        while let Some((time, plan)) = self.context.plans.pop() {
            self.context.time = time;
            self.execute(plan);
            self.deliver_events();
        }
    }

    fn execute(&mut self, plan: Plan) {
        match plan {
            Plan::Group(command) => {
                debug!(time = self.context.time, ?command, "running group command");
                self.groups.apply_command(command);
            }
            Plan::RemovePerson(person) => match self.people.remove_person(person) {
                Ok(()) => {}
                Err(err) => debug!(%err, "person already removed"),
            },
            Plan::Action(action) => action(self),
        }
    }

    fn deliver_events(&mut self) {
        if self.context.events.is_empty() {
            return;
        }
        let events = mem::take(&mut self.context.events);
        for event in &events {
            self.bus.dispatch(&self.groups, event);
        }
    }

    // ---------------------------------------------------------------------
    // events
    // ---------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, label: EventLabel, handler: F) -> SubscriptionId
    where
        F: FnMut(&GroupStore, &GroupEvent) + 'static,
    {
        self.bus.subscribe(label, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ---------------------------------------------------------------------
    // people
    // ---------------------------------------------------------------------

    pub fn add_person(&mut self) -> PersonId {
        self.people.add_person()
    }

    pub fn add_people(&mut self, count: usize) -> Vec<PersonId> {
        self.people.add_people(count)
    }

    /// Removes `person` at the current time: group memberships are cleaned
    /// up first, then the person leaves the registry.
    pub fn remove_person(&mut self, person: PersonId) -> GroupResult<()> {
        self.groups.handle_person_imminent_removal(&mut self.context, &self.people, person)?;
        let now = self.context.time;
        self.context.plans.push(now, Plan::RemovePerson(person));
        Ok(())
    }

    // ---------------------------------------------------------------------
    // groups
    // ---------------------------------------------------------------------

    pub fn add_group_type(&mut self, group_type: GroupTypeId) -> GroupResult<()> {
        self.groups.add_group_type(group_type)
    }

    pub fn define_group_property(
        &mut self,
        group_type: GroupTypeId,
        property: GroupPropertyId,
        definition: PropertyDefinition,
    ) -> GroupResult<()> {
        self.groups.define_group_property(group_type, property, definition)
    }

    pub fn add_group(&mut self, group_type: GroupTypeId) -> GroupResult<GroupId> {
        self.groups.add_group(&mut self.context, group_type)
    }

    pub fn add_group_with_values(
        &mut self,
        group_type: GroupTypeId,
        values: &[(GroupPropertyId, PropertyValue)],
    ) -> GroupResult<GroupId> {
        self.groups.add_group_with_values(&mut self.context, group_type, values)
    }

    pub fn remove_group(&mut self, group: GroupId) -> GroupResult<()> {
        self.groups.remove_group(&mut self.context, group)
    }

    pub fn add_person_to_group(&mut self, person: PersonId, group: GroupId) -> GroupResult<()> {
        self.groups.add_person_to_group(&mut self.context, &self.people, person, group)
    }

    pub fn remove_person_from_group(&mut self, person: PersonId, group: GroupId) -> GroupResult<()> {
        self.groups.remove_person_from_group(&mut self.context, &self.people, person, group)
    }

    pub fn set_group_property_value(
        &mut self,
        group: GroupId,
        property: GroupPropertyId,
        value: PropertyValue,
    ) -> GroupResult<()> {
        self.groups.set_group_property_value(&mut self.context, group, property, value)
    }

    pub fn add_bulk_memberships(
        &mut self,
        new_people: &[PersonId],
        batch: &BulkGroupMembership,
    ) -> GroupResult<Vec<GroupId>> {
        self.groups.add_bulk_memberships(&mut self.context, &self.people, new_people, batch)
    }

    /// Samples `group`, drawing from the sampler's stream or the global one.
    pub fn sample_group(&mut self, group: GroupId, sampler: &GroupSampler) -> GroupResult<Option<PersonId>> {
        let rng = self.random.select(sampler.stream());
        self.groups.sample_group(&self.people, group, sampler, rng)
    }
}
