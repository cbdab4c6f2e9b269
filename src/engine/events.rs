//! Domain events emitted by the group store, and their dispatch.
//!
//! Every logical change produces exactly one [`GroupEvent`]. An event
//! reports the [`EventLabel`]s it matches, from the broad (every event of a
//! kind) to the narrow (a kind restricted to one group, type, person or
//! property). Subscribers register against one label and are called in
//! subscription order.

use std::fmt;

use crate::engine::groups::GroupStore;
use crate::engine::property::PropertyValue;
use crate::engine::types::{GroupId, GroupPropertyId, GroupTypeId, PersonId};


/// Kind of a [`GroupEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    GroupAdded,
    GroupImminentRemoval,
    MembershipAdded,
    MembershipRemoved,
    PropertyUpdated,
}

/// A change to group state.
#[derive(Clone, Debug, PartialEq)]
pub enum GroupEvent {
    GroupAdded {
        group: GroupId,
        group_type: GroupTypeId,
    },
    /// The group is still fully queryable while this event is observed.
    GroupImminentRemoval {
        group: GroupId,
        group_type: GroupTypeId,
    },
    MembershipAdded {
        group: GroupId,
        group_type: GroupTypeId,
        person: PersonId,
    },
    MembershipRemoved {
        group: GroupId,
        group_type: GroupTypeId,
        person: PersonId,
    },
    PropertyUpdated {
        group: GroupId,
        group_type: GroupTypeId,
        property: GroupPropertyId,
        previous: PropertyValue,
        current: PropertyValue,
    },
}

impl GroupEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GroupEvent::GroupAdded { .. } => EventKind::GroupAdded,
            GroupEvent::GroupImminentRemoval { .. } => EventKind::GroupImminentRemoval,
            GroupEvent::MembershipAdded { .. } => EventKind::MembershipAdded,
            GroupEvent::MembershipRemoved { .. } => EventKind::MembershipRemoved,
            GroupEvent::PropertyUpdated { .. } => EventKind::PropertyUpdated,
        }
    }

    pub fn group(&self) -> GroupId {
        match self {
            GroupEvent::GroupAdded { group, .. }
            | GroupEvent::GroupImminentRemoval { group, .. }
            | GroupEvent::MembershipAdded { group, .. }
            | GroupEvent::MembershipRemoved { group, .. }
            | GroupEvent::PropertyUpdated { group, .. } => *group,
        }
    }

    pub fn group_type(&self) -> GroupTypeId {
        match self {
            GroupEvent::GroupAdded { group_type, .. }
            | GroupEvent::GroupImminentRemoval { group_type, .. }
            | GroupEvent::MembershipAdded { group_type, .. }
            | GroupEvent::MembershipRemoved { group_type, .. }
            | GroupEvent::PropertyUpdated { group_type, .. } => *group_type,
        }
    }

    /// Labels this event matches.
    pub fn labels(&self) -> Vec<EventLabel> {
        let kind = self.kind();
        let mut labels = vec![
            EventLabel::Kind(kind),
            EventLabel::Group(kind, self.group()),
            EventLabel::GroupType(kind, self.group_type()),
        ];
        match self {
            GroupEvent::MembershipAdded { person, .. }
            | GroupEvent::MembershipRemoved { person, .. } => {
                labels.push(EventLabel::Person(kind, *person));
            }
            GroupEvent::PropertyUpdated { group, property, .. } => {
                labels.push(EventLabel::Property(*property));
                labels.push(EventLabel::GroupProperty(*group, *property));
            }
            _ => {}
        }
        labels
    }
}

impl fmt::Display for GroupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupEvent::GroupAdded { group, group_type } => write!(f, "{group} added as {group_type}"),
            GroupEvent::GroupImminentRemoval { group, .. } => write!(f, "{group} about to be removed"),
            GroupEvent::MembershipAdded { group, person, .. } => write!(f, "{person} joined {group}"),
            GroupEvent::MembershipRemoved { group, person, .. } => write!(f, "{person} left {group}"),
            GroupEvent::PropertyUpdated { group, property, previous, current, .. } => {
                write!(f, "{group} {property}: {previous} -> {current}")
            }
        }
    }
}

/// Subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventLabel {
    Kind(EventKind),
    Group(EventKind, GroupId),
    GroupType(EventKind, GroupTypeId),
    Person(EventKind, PersonId),
    Property(GroupPropertyId),
    GroupProperty(GroupId, GroupPropertyId),
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event handler. Receives read access to the store in its post-event state.
pub type EventHandler = Box<dyn FnMut(&GroupStore, &GroupEvent)>;

struct Subscription {
    id: SubscriptionId,
    label: EventLabel,
    handler: EventHandler,
}

/// Label-keyed subscriber registry.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, label: EventLabel, handler: F) -> SubscriptionId
    where
        F: FnMut(&GroupStore, &GroupEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, label, handler: Box::new(handler) });
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Calls every subscriber whose label `event` matches.
    pub fn dispatch(&mut self, store: &GroupStore, event: &GroupEvent) {
        if self.subscriptions.is_empty() {
            return;
        }
        let labels = event.labels();
        for subscription in &mut self.subscriptions {
            if labels.contains(&subscription.label) {
                (subscription.handler)(store, event);
            }
        }
    }
}
