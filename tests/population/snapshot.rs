use abm_groups::engine::people::People;
use abm_groups::engine::property::ValueType;
use abm_groups::engine::types::MAX_ID;
use abm_groups::{
    GroupError, GroupId, GroupStore, GroupsConfig, GroupsPluginData, PersonId, PropertyDefinition,
    PropertyValue, Simulation, SimulationCheckpoint, SimulationConfig, SnapshotError,
};
use assert_matches::assert_matches;

use crate::population::fixtures::*;


#[test]
fn membership_in_unknown_group_fails_build() {
    let mut builder = GroupsPluginData::builder();
    builder
        .add_group_type(HOUSEHOLD)
        .add_group(GroupId(0), HOUSEHOLD)
        .add_person_to_group(GroupId(1), PersonId(0));
    assert_matches!(builder.build(), Err(SnapshotError::UnknownGroup(GroupId(1))));
}

#[test]
fn definition_without_default_fails_build() {
    let mut builder = GroupsPluginData::builder();
    builder
        .add_group_type(HOUSEHOLD)
        .add_group(GroupId(0), HOUSEHOLD)
        .define_group_property(
            HOUSEHOLD,
            SIZE,
            PropertyDefinition::builder().value_type(ValueType::Int).build().unwrap(),
        );
    assert_matches!(
        builder.build(),
        Err(SnapshotError::PropertyDefinitionRequiresDefault { group_type: HOUSEHOLD, property: SIZE })
    );
}

#[test]
fn store_round_trips_through_snapshot() {
    let mut town = town(1, 12);
    town.sim.set_group_property_value(town.households[0], SIZE, PropertyValue::Int(6)).unwrap();
    town.sim.set_group_property_value(town.households[1], SIZE, PropertyValue::Int(1)).unwrap();
    town.sim
        .set_group_property_value(town.households[2], TENURE, PropertyValue::Enum("own".into()))
        .unwrap();
    town.sim.remove_group(town.households[3]).unwrap();
    town.sim.run_until(0.0);

    let exported = town.sim.groups().to_snapshot().unwrap();
    assert_eq!(exported.property_value(town.households[0], SIZE), Some(&PropertyValue::Int(6)));
    assert_eq!(exported.property_value(town.households[1], SIZE), None);
    assert!(!exported.group_ids().contains(&town.households[3]));
    assert_eq!(exported.next_group_id(), town.sim.groups().next_group_id());

    let rebuilt = GroupStore::from_snapshot(GroupsConfig::default(), &exported, town.sim.people()).unwrap();
    let again = rebuilt.to_snapshot().unwrap();
    assert_eq!(again, exported);
    assert_eq!(again.to_json_bytes().unwrap(), exported.to_json_bytes().unwrap());
    assert_eq!(
        rebuilt.people_for_group(town.schools[0]).unwrap(),
        town.sim.groups().people_for_group(town.schools[0]).unwrap()
    );
}

#[test]
fn clone_builder_reproduces_the_snapshot() {
    let town = town(2, 5);
    let exported = town.sim.groups().to_snapshot().unwrap();
    let copy = exported.clone_builder().build().unwrap();
    assert_eq!(copy.to_json_bytes().unwrap(), exported.to_json_bytes().unwrap());
}

#[test]
fn members_must_be_live_people() {
    let town = town(3, 2);
    let exported = town.sim.groups().to_snapshot().unwrap();
    let nobody = People::new();
    assert_matches!(
        GroupStore::from_snapshot(GroupsConfig::default(), &exported, &nobody),
        Err(GroupError::UnknownPerson(_))
    );
}

#[test]
fn loaded_store_keeps_assigning_fresh_ids() {
    let mut builder = GroupsPluginData::builder();
    builder
        .add_group_type(WORKPLACE)
        .add_group(GroupId(4), WORKPLACE)
        .set_next_group_id(GroupId(9));
    let data = builder.build().unwrap();

    let mut sim = Simulation::with_groups(SimulationConfig::default(), &data, People::new()).unwrap();
    assert_eq!(sim.add_group(WORKPLACE).unwrap(), GroupId(9));
    assert_eq!(sim.groups().group_ids(), vec![GroupId(4), GroupId(9)]);
}

#[test]
fn checkpoint_survives_json() {
    let mut town = town(4, 3);
    town.sim.run_until(2.0);
    let checkpoint = town.sim.checkpoint().unwrap();
    let bytes = checkpoint.to_json_bytes().unwrap();
    let decoded = SimulationCheckpoint::from_json_slice(&bytes).unwrap();
    assert_eq!(decoded, checkpoint);

    let resumed = Simulation::resume(SimulationConfig::default(), &decoded).unwrap();
    assert_eq!(resumed.time(), 2.0);
    assert_eq!(resumed.people().person_count(), 12);
    assert_eq!(resumed.groups().group_ids(), town.sim.groups().group_ids());
}

#[test]
fn tampered_snapshot_is_rejected() {
    let town = town(5, 1);
    let bytes = town.sim.groups().to_snapshot().unwrap().to_json_bytes().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let tampered = text.replacen("\"group_types\":[0,1,2]", "\"group_types\":[1,2]", 1);
    assert_ne!(tampered, text);
    assert!(GroupsPluginData::from_json_slice(tampered.as_bytes()).is_err());
}

#[test]
fn non_finite_values_never_reach_a_checkpoint() {
    let mut town = town(6, 2);
    let home = town.households[0];
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert_matches!(
            town.sim.set_group_property_value(home, INCOME, PropertyValue::Double(bad)),
            Err(GroupError::IncompatibleValue(err)) if err.property == INCOME
        );
    }
    assert_matches!(
        town.sim.add_group_with_values(HOUSEHOLD, &[(INCOME, PropertyValue::Double(f64::NAN))]),
        Err(GroupError::IncompatibleValue(_))
    );
    assert!(PropertyDefinition::builder()
        .value_type(ValueType::Float)
        .default_value(PropertyValue::Float(f32::INFINITY))
        .build()
        .is_err());

    town.sim.set_group_property_value(home, INCOME, PropertyValue::Double(-1250.75)).unwrap();
    let bytes = town.sim.checkpoint().unwrap().to_json_bytes().unwrap();
    let decoded = SimulationCheckpoint::from_json_slice(&bytes).unwrap();
    assert_eq!(decoded.groups.property_value(home, INCOME), Some(&PropertyValue::Double(-1250.75)));
    assert_eq!(decoded.to_json_bytes().unwrap(), bytes);
}

#[test]
fn snapshot_values_are_checked_for_finiteness() {
    let mut builder = GroupsPluginData::builder();
    builder
        .add_group_type(HOUSEHOLD)
        .define_group_property(HOUSEHOLD, INCOME, definition(ValueType::Double, PropertyValue::Double(0.0)))
        .add_group(GroupId(0), HOUSEHOLD)
        .set_group_property_value(GroupId(0), INCOME, PropertyValue::Double(f64::NAN));
    assert_matches!(builder.build(), Err(SnapshotError::IncompatibleValue(_)));
}

#[test]
fn out_of_range_ids_fail_instead_of_panicking() {
    let mut builder = GroupsPluginData::builder();
    builder.add_group_type(WORKPLACE).add_group(GroupId(u64::MAX), WORKPLACE);
    assert_matches!(builder.build(), Err(SnapshotError::GroupIdOutOfRange(GroupId(u64::MAX))));

    let json = format!(
        r#"{{"group_types":[2],"groups":[[0,2]],"property_definitions":[],"property_values":[],"memberships":[[0,[{}]]],"next_group_id":1}}"#,
        MAX_ID + 1
    );
    assert!(GroupsPluginData::from_json_slice(json.as_bytes()).is_err());
}
