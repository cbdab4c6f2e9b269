use std::cell::RefCell;
use std::rc::Rc;

use abm_groups::{
    BulkGroupMembership, EventKind, EventLabel, GroupError, GroupEvent, GroupId, PersonId, Simulation,
};
use assert_matches::assert_matches;
use proptest::prelude::*;

use crate::population::fixtures::*;


fn assert_symmetric(sim: &Simulation, people: &[PersonId]) {
    let store = sim.groups();
    for group in store.group_ids() {
        for person in store.people_for_group(group).unwrap() {
            assert!(store.groups_for_person(person).contains(&group), "{person} missing {group}");
        }
    }
    for &person in people {
        for group in store.groups_for_person(person) {
            assert!(store.people_for_group(group).unwrap().contains(&person), "{group} missing {person}");
        }
    }
}

#[test]
fn duplicate_membership_fails_without_change() {
    let mut town = town(1, 2);
    let person = town.people[0];
    let home = town.households[0];
    let before = town.sim.groups().people_for_group(home).unwrap();

    assert_matches!(
        town.sim.add_person_to_group(person, home),
        Err(GroupError::DuplicateMembership { group, person: p }) if group == home && p == person
    );
    assert_eq!(town.sim.groups().people_for_group(home).unwrap(), before);
}

#[test]
fn removing_an_absent_membership_fails() {
    let mut town = town(1, 2);
    let outsider = town.people[4];
    assert_matches!(
        town.sim.remove_person_from_group(outsider, town.households[0]),
        Err(GroupError::NotAMember { .. })
    );
    assert_matches!(
        town.sim.add_person_to_group(PersonId(999), town.households[0]),
        Err(GroupError::UnknownPerson(PersonId(999)))
    );
    assert_matches!(
        town.sim.add_person_to_group(outsider, GroupId(999)),
        Err(GroupError::UnknownGroup(GroupId(999)))
    );
}

#[test]
fn member_lists_keep_join_order() {
    let mut sim = empty_town(3);
    let people = sim.add_people(4);
    let group = sim.add_group(WORKPLACE).unwrap();
    for &person in people.iter().rev() {
        sim.add_person_to_group(person, group).unwrap();
    }
    sim.remove_person_from_group(people[2], group).unwrap();

    assert_eq!(
        sim.groups().people_for_group(group).unwrap(),
        vec![people[3], people[1], people[0]]
    );
}

#[test]
fn membership_events_are_delivered_in_order() {
    let mut sim = empty_town(4);
    let person = sim.add_person();
    let group = sim.add_group(SCHOOL).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    sim.subscribe(EventLabel::Person(EventKind::MembershipAdded, person), move |_, event| {
        sink.borrow_mut().push(event.clone());
    });
    let sink = Rc::clone(&log);
    sim.subscribe(EventLabel::Person(EventKind::MembershipRemoved, person), move |_, event| {
        sink.borrow_mut().push(event.clone());
    });

    sim.add_person_to_group(person, group).unwrap();
    sim.remove_person_from_group(person, group).unwrap();
    sim.run_until(0.0);

    assert_eq!(
        *log.borrow(),
        vec![
            GroupEvent::MembershipAdded { group, group_type: SCHOOL, person },
            GroupEvent::MembershipRemoved { group, group_type: SCHOOL, person },
        ]
    );
}

#[test]
fn bulk_memberships_validate_before_mutating() {
    let mut sim = empty_town(5);
    let people = sim.add_people(3);

    let mut batch = BulkGroupMembership::new();
    let home = batch.add_group(HOUSEHOLD);
    let work = batch.add_group(WORKPLACE);
    batch.add_membership(0, home);
    batch.add_membership(1, home);
    batch.add_membership(2, 7);
    assert_matches!(
        sim.add_bulk_memberships(&people, &batch),
        Err(GroupError::UnknownGroupIndex { index: 7, count: 2 })
    );
    assert!(sim.groups().group_ids().is_empty());

    batch.group_types.push(abm_groups::GroupTypeId(42));
    assert_matches!(sim.add_bulk_memberships(&people, &batch), Err(GroupError::UnknownGroupType(_)));
    batch.group_types.pop();

    batch.memberships = vec![(0, home), (1, home), (2, home), (2, work)];
    let groups = sim.add_bulk_memberships(&people, &batch).unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(sim.groups().person_count_for_group(groups[home]).unwrap(), 3);
    assert_eq!(sim.groups().groups_for_person(people[2]), groups);
    assert_symmetric(&sim, &people);
}

#[test]
fn bulk_batch_naming_a_person_twice_leaves_no_trace() {
    let mut sim = empty_town(15);
    let people = sim.add_people(2);
    let before = sim.groups().next_group_id();

    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in [EventKind::GroupAdded, EventKind::MembershipAdded] {
        let sink = Rc::clone(&log);
        sim.subscribe(EventLabel::Kind(kind), move |_, event| sink.borrow_mut().push(event.clone()));
    }

    let mut batch = BulkGroupMembership::new();
    let home = batch.add_group(HOUSEHOLD);
    let work = batch.add_group(WORKPLACE);
    batch.add_membership(1, work);
    batch.add_membership(0, home);
    batch.add_membership(2, home);
    let repeated = [people[0], people[1], people[0]];
    assert_matches!(
        sim.add_bulk_memberships(&repeated, &batch),
        Err(GroupError::DuplicateBulkMembership { person_index: 2, group_index: 0 })
    );
    sim.run_until(0.0);

    assert!(sim.groups().group_ids().is_empty());
    assert_eq!(sim.groups().next_group_id(), before);
    assert!(people.iter().all(|&p| sim.groups().groups_for_person(p).is_empty()));
    assert!(log.borrow().is_empty());

    batch.memberships = vec![(0, home), (0, work), (1, work)];
    let groups = sim.add_bulk_memberships(&repeated, &batch).unwrap();
    sim.run_until(0.0);
    assert_eq!(sim.groups().groups_for_person(people[0]), groups);
    assert_eq!(log.borrow().len(), 2 + 3);
}

#[test]
fn removed_person_leaves_every_group() {
    let mut town = town(6, 10);
    let student = town.people[0];
    assert_eq!(town.sim.groups().group_count_for_person(student), 2);

    town.sim.remove_person(student).unwrap();
    town.sim.run_until(0.0);
    assert_eq!(town.sim.groups().group_count_for_person(student), 0);
    assert_eq!(town.sim.groups().person_count_for_group(town.households[0]).unwrap(), 3);
    assert_symmetric(&town.sim, &town.people);
}

#[derive(Clone, Debug)]
enum Op {
    AddGroup(u8),
    Join(u8, u8),
    Leave(u8, u8),
    RemoveGroup(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3).prop_map(Op::AddGroup),
        (any::<u8>(), any::<u8>()).prop_map(|(p, g)| Op::Join(p, g)),
        (any::<u8>(), any::<u8>()).prop_map(|(p, g)| Op::Leave(p, g)),
        any::<u8>().prop_map(Op::RemoveGroup),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn membership_stays_symmetric(ops in prop::collection::vec(op(), 1..80)) {
        let mut sim = empty_town(7);
        let people = sim.add_people(12);
        let mut last_group: Option<GroupId> = None;

        for op in ops {
            let groups = sim.groups().group_ids();
            let pick = |i: u8| (!groups.is_empty()).then(|| groups[i as usize % groups.len()]);
            match op {
                Op::AddGroup(t) => {
                    let group = sim.add_group(abm_groups::GroupTypeId(u32::from(t))).unwrap();
                    prop_assert!(last_group.map_or(true, |last| group > last));
                    last_group = Some(group);
                }
                Op::Join(p, g) => {
                    if let Some(group) = pick(g) {
                        let person = people[p as usize % people.len()];
                        let was_member = sim.groups().is_person_in_group(person, group).unwrap();
                        let result = sim.add_person_to_group(person, group);
                        prop_assert_eq!(result.is_err(), was_member);
                    }
                }
                Op::Leave(p, g) => {
                    if let Some(group) = pick(g) {
                        let person = people[p as usize % people.len()];
                        let was_member = sim.groups().is_person_in_group(person, group).unwrap();
                        let result = sim.remove_person_from_group(person, group);
                        prop_assert_eq!(result.is_ok(), was_member);
                    }
                }
                Op::RemoveGroup(g) => {
                    if let Some(group) = pick(g) {
                        sim.remove_group(group).unwrap();
                        let now = sim.time();
                        sim.run_until(now);
                        prop_assert!(!sim.groups().group_exists(group));
                    }
                }
            }
            assert_symmetric(&sim, &people);
        }
        if let Some(last) = last_group {
            prop_assert!(sim.groups().next_group_id() > last);
        }
    }
}
