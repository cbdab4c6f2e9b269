use std::collections::HashMap;

use abm_groups::engine::people::People;
use abm_groups::engine::random::RandomStreamId;
use abm_groups::{GroupError, GroupId, GroupSampler, PersonId, Simulation};
use assert_matches::assert_matches;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::population::fixtures::*;


fn workplace(sim: &mut Simulation, size: usize) -> (GroupId, Vec<PersonId>) {
    let people = sim.add_people(size);
    let group = sim.add_group(WORKPLACE).unwrap();
    for &person in &people {
        sim.add_person_to_group(person, group).unwrap();
    }
    (group, people)
}

#[test]
fn weighted_draws_follow_the_weights() {
    let mut sim = empty_town(2024);
    let (group, people) = workplace(&mut sim, 4);
    let weights: HashMap<PersonId, f64> =
        people.iter().zip([1.0, 2.0, 3.0, 4.0]).map(|(&p, w)| (p, w)).collect();
    let sampler = GroupSampler::new().weighted(move |_, person, _| weights[&person]);

    const TRIALS: usize = 40_000;
    let mut counts: HashMap<PersonId, usize> = HashMap::new();
    for _ in 0..TRIALS {
        let person = sim.sample_group(group, &sampler).unwrap().unwrap();
        *counts.entry(person).or_default() += 1;
    }

    for (index, &person) in people.iter().enumerate() {
        let expected = (index + 1) as f64 / 10.0;
        let observed = counts.get(&person).copied().unwrap_or(0) as f64 / TRIALS as f64;
        assert!(
            (observed - expected).abs() < 0.02,
            "{person}: observed {observed:.4}, expected {expected:.4}"
        );
    }
}

#[test]
fn zero_weights_are_never_drawn() {
    let mut sim = empty_town(5);
    let (group, people) = workplace(&mut sim, 5);
    let favored = people[3];
    let sampler = GroupSampler::new().weighted(move |_, person, _| if person == favored { 0.5 } else { 0.0 });
    for _ in 0..200 {
        assert_eq!(sim.sample_group(group, &sampler).unwrap(), Some(favored));
    }

    let nobody = GroupSampler::new().weighted(|_, _, _| 0.0);
    assert_eq!(sim.sample_group(group, &nobody).unwrap(), None);
}

#[test]
fn excluded_person_is_never_drawn() {
    let mut sim = empty_town(6);
    let (group, people) = workplace(&mut sim, 3);
    let uniform = GroupSampler::new().excluding(people[1]);
    let weighted = GroupSampler::new().excluding(people[1]).weighted(|_, _, _| 1.0);
    for _ in 0..300 {
        assert_ne!(sim.sample_group(group, &uniform).unwrap(), Some(people[1]));
        assert_ne!(sim.sample_group(group, &weighted).unwrap(), Some(people[1]));
    }
}

#[test]
fn empty_after_exclusion_is_absent() {
    let mut sim = empty_town(7);
    let (group, people) = workplace(&mut sim, 1);
    let empty = sim.add_group(WORKPLACE).unwrap();

    let excluding = GroupSampler::new().excluding(people[0]);
    assert_eq!(sim.sample_group(group, &excluding).unwrap(), None);
    assert_eq!(sim.sample_group(group, &excluding.clone().weighted(|_, _, _| 1.0)).unwrap(), None);
    assert_eq!(sim.sample_group(empty, &GroupSampler::new()).unwrap(), None);
}

#[test]
fn malformed_weights_fail() {
    let mut sim = empty_town(8);
    let (group, people) = workplace(&mut sim, 3);
    for bad in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let target = people[2];
        let sampler = GroupSampler::new().weighted(move |_, person, _| if person == target { bad } else { 1.0 });
        assert_matches!(
            sim.sample_group(group, &sampler),
            Err(GroupError::MalformedWeight { person, .. }) if person == target
        );
    }

    let huge = GroupSampler::new().weighted(|_, _, _| f64::MAX);
    assert_matches!(sim.sample_group(group, &huge), Err(GroupError::MalformedWeight { .. }));
}

#[test]
fn sampling_preconditions() {
    let mut sim = empty_town(9);
    let (group, _) = workplace(&mut sim, 2);
    assert_matches!(
        sim.sample_group(GroupId(500), &GroupSampler::new()),
        Err(GroupError::UnknownGroup(GroupId(500)))
    );
    assert_matches!(
        sim.sample_group(group, &GroupSampler::new().excluding(PersonId(500))),
        Err(GroupError::UnknownPerson(PersonId(500)))
    );
}

#[test]
fn weighting_can_read_group_properties() {
    let mut sim = empty_town(10);
    let people = sim.add_people(2);
    let home = sim.add_group(HOUSEHOLD).unwrap();
    for &person in &people {
        sim.add_person_to_group(person, home).unwrap();
    }
    let first = people[0];
    let sampler = GroupSampler::new().weighted(move |store, person, group| {
        let size = store.group_property_value(group, SIZE).unwrap().as_i64().unwrap();
        if person == first { size as f64 } else { 0.0 }
    });
    assert_eq!(sim.sample_group(home, &sampler).unwrap(), Some(first));
}

#[test]
fn same_seed_same_draws() {
    let draws = |seed| {
        let mut sim = empty_town(seed);
        let (group, _) = workplace(&mut sim, 20);
        let sampler = GroupSampler::new().with_stream(RandomStreamId(4));
        (0..50).map(|_| sim.sample_group(group, &sampler).unwrap()).collect::<Vec<_>>()
    };
    assert_eq!(draws(77), draws(77));
    assert_ne!(draws(77), draws(78));
}

#[test]
#[should_panic(expected = "access violation")]
fn nested_sampling_panics() {
    let mut sim = empty_town(11);
    let (group, _) = workplace(&mut sim, 3);
    let sampler = GroupSampler::new().weighted(move |store, _, _| {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let _ = store.sample_group(&People::new(), group, &GroupSampler::new(), &mut rng);
        1.0
    });
    let _ = sim.sample_group(group, &sampler);
}
