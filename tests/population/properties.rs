use std::cell::RefCell;
use std::rc::Rc;

use abm_groups::{EventLabel, GroupError, GroupEvent, GroupPropertyId, PropertyValue};
use assert_matches::assert_matches;

use crate::population::fixtures::*;


#[test]
fn unset_properties_fall_back_to_defaults() {
    let town = town(1, 3);
    let store = town.sim.groups();
    let home = town.households[1];

    assert_eq!(store.group_property_value(home, SIZE).unwrap(), PropertyValue::Int(1));
    assert_eq!(store.group_property_value(home, TENURE).unwrap(), PropertyValue::Enum("rent".into()));
    assert_eq!(store.group_property_value(home, RURAL).unwrap(), PropertyValue::Boolean(false));
    assert_eq!(store.group_property_time(home, SIZE).unwrap(), None);
}

#[test]
fn every_column_kind_round_trips() {
    let mut town = town(2, 2);
    let home = town.households[0];
    let writes = [
        (SIZE, PropertyValue::Int(4)),
        (INCOME, PropertyValue::Double(52_000.5)),
        (TENURE, PropertyValue::Enum("own".into())),
        (RURAL, PropertyValue::Boolean(true)),
    ];
    for (property, value) in writes.clone() {
        town.sim.set_group_property_value(home, property, value).unwrap();
    }
    for (property, value) in writes {
        assert_eq!(town.sim.groups().group_property_value(home, property).unwrap(), value);
    }
    assert_eq!(
        town.sim.groups().group_property_value(town.households[1], SIZE).unwrap(),
        PropertyValue::Int(1)
    );
}

#[test]
fn write_time_follows_the_clock() {
    let mut town = town(3, 1);
    let home = town.households[0];
    town.sim
        .schedule_action(4.5, move |sim| {
            sim.set_group_property_value(home, SIZE, PropertyValue::Int(2)).unwrap();
        })
        .unwrap();
    town.sim.run();
    assert_eq!(town.sim.groups().group_property_time(home, SIZE).unwrap(), Some(4.5));
}

#[test]
fn immutable_properties_are_set_only_at_creation() {
    let mut sim = empty_town(4);
    let address = PropertyValue::Text("12 Elm St".into());
    let home = sim.add_group_with_values(HOUSEHOLD, &[(ADDRESS, address.clone())]).unwrap();
    assert_eq!(sim.groups().group_property_value(home, ADDRESS).unwrap(), address);

    assert_matches!(
        sim.set_group_property_value(home, ADDRESS, PropertyValue::Text("elsewhere".into())),
        Err(GroupError::ImmutableProperty(ADDRESS))
    );
    assert_eq!(sim.groups().group_property_value(home, ADDRESS).unwrap(), address);
}

#[test]
fn incompatible_values_are_rejected() {
    let mut town = town(5, 1);
    let home = town.households[0];

    assert_matches!(
        town.sim.set_group_property_value(home, SIZE, PropertyValue::Long(4)),
        Err(GroupError::IncompatibleValue(err)) if err.property == SIZE
    );
    assert_matches!(
        town.sim.set_group_property_value(home, TENURE, PropertyValue::Enum("squat".into())),
        Err(GroupError::IncompatibleValue(_))
    );
    assert_matches!(
        town.sim.set_group_property_value(town.schools[0], SIZE, PropertyValue::Int(2)),
        Err(GroupError::UnknownProperty { group_type: SCHOOL, property: SIZE })
    );
    assert_matches!(
        town.sim.add_group_with_values(HOUSEHOLD, &[(GroupPropertyId(77), PropertyValue::Int(0))]),
        Err(GroupError::UnknownProperty { .. })
    );
}

#[test]
fn updates_report_previous_and_current() {
    let mut town = town(6, 1);
    let home = town.households[0];
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    town.sim.subscribe(EventLabel::GroupProperty(home, SIZE), move |store, event| {
        let now = store.group_property_value(event.group(), SIZE).unwrap();
        sink.borrow_mut().push((event.clone(), now));
    });

    town.sim.set_group_property_value(home, SIZE, PropertyValue::Int(3)).unwrap();
    town.sim.set_group_property_value(home, SIZE, PropertyValue::Int(5)).unwrap();
    town.sim.set_group_property_value(home, RURAL, PropertyValue::Boolean(true)).unwrap();
    town.sim.run_until(0.0);

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_matches!(
        &log[0].0,
        GroupEvent::PropertyUpdated { previous: PropertyValue::Int(1), current: PropertyValue::Int(3), .. }
    );
    assert_matches!(
        &log[1].0,
        GroupEvent::PropertyUpdated { previous: PropertyValue::Int(3), current: PropertyValue::Int(5), .. }
    );
    assert_eq!(log[1].1, PropertyValue::Int(5));
}

#[test]
fn removed_groups_drop_their_values() {
    let mut town = town(7, 2);
    let home = town.households[0];
    town.sim.set_group_property_value(home, SIZE, PropertyValue::Int(9)).unwrap();
    town.sim.remove_group(home).unwrap();

    assert!(town.sim.groups().is_pending_removal(home));
    assert_eq!(town.sim.groups().group_property_value(home, SIZE).unwrap(), PropertyValue::Int(9));

    town.sim.run_until(0.0);
    assert_matches!(
        town.sim.groups().group_property_value(home, SIZE),
        Err(GroupError::UnknownGroup(_))
    );
    let snapshot = town.sim.groups().to_snapshot().unwrap();
    assert_eq!(snapshot.property_value(home, SIZE), None);
}
