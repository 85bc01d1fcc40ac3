//! Property-based tests for Playscan using proptest.

use playscan::prelude::*;
use playscan::task::{is_reserved_key, tags_from_value, RESERVED_KEYS};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Strategy for generating tag names
fn tag_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .unwrap()
        .prop_filter("plain scalar", |s| {
            !matches!(s.as_str(), "true" | "false" | "null" | "yes" | "no" | "on" | "off")
        })
}

/// Strategy for generating action names that are never reserved
fn action_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{2,20}")
        .unwrap()
        .prop_filter("not reserved", |s| !is_reserved_key(s))
}

/// Strategy for picking a reserved key
fn reserved_key() -> impl Strategy<Value = String> {
    prop::sample::select(RESERVED_KEYS).prop_map(str::to_string)
}

fn task(action: &str, reserved: &[String]) -> TaskNode {
    let mut map = Mapping::new();
    for key in reserved {
        map.insert(Value::String(key.clone()), Value::String("x".into()));
    }
    map.insert(
        Value::String(action.to_string()),
        serde_yaml::from_str("{arg: 1}").unwrap(),
    );
    TaskNode::new(map)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn single_tag_string_is_a_singleton(tag in tag_name()) {
        let value = Value::String(tag.clone());
        prop_assert_eq!(tags_from_value(Some(&value)), BTreeSet::from([tag]));
    }

    #[test]
    fn tag_lists_become_sets(list in vec(tag_name(), 0..10)) {
        let value = Value::Sequence(list.iter().cloned().map(Value::String).collect());
        let expected: BTreeSet<String> = list.into_iter().collect();
        prop_assert_eq!(tags_from_value(Some(&value)), expected);
    }

    #[test]
    fn reserved_keys_never_count_as_actions(
        action in action_name(),
        reserved in vec(reserved_key(), 0..6),
    ) {
        let node = task(&action, &reserved);
        prop_assert_eq!(node.action_type().unwrap(), action);
        prop_assert!(node.action_args().is_some());
    }

    #[test]
    fn two_actions_are_ambiguous(a in action_name(), b in action_name()) {
        prop_assume!(a != b);
        let mut map = Mapping::new();
        map.insert(Value::String(a), Value::Null);
        map.insert(Value::String(b), Value::Null);
        let is_ambiguous = matches!(
            TaskNode::new(map).action_type(),
            Err(Error::AmbiguousType { .. })
        );
        prop_assert!(is_ambiguous);
    }

    #[test]
    fn include_expansion_preserves_order(
        before in vec(action_name(), 0..5),
        included in vec(action_name(), 0..5),
        after in vec(action_name(), 0..5),
    ) {
        let entries = |names: &[String]| {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| format!("- name: {}{}\n  ping:\n", n, i))
                .collect::<String>()
        };
        let loader = MemoryLoader::new().with_file("/p/inc.yml", entries(&included));
        let root = format!("{}- include_tasks: inc.yml\n{}", entries(&before), entries(&after));
        let loader = loader.with_file("/p/site.yml", format!("- hosts: all\n  tasks:\n{}", indent(&root)));

        let resolver = Resolver::new("/p").with_loader(Arc::new(loader));
        let names: Vec<String> = resolver
            .find_all_tasks("/p/site.yml")
            .unwrap()
            .iter()
            .map(|t| t.name().unwrap_or("?").to_string())
            .collect();

        let label = |names: &[String]| -> Vec<String> {
            names.iter().enumerate().map(|(i, n)| format!("{}{}", n, i)).collect()
        };
        let mut expected = label(&before);
        expected.extend(label(&included));
        expected.extend(label(&after));
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn tags_are_union_of_task_tags(sets in vec(btree_set(tag_name(), 0..4), 0..6)) {
        let tasks: String = sets
            .iter()
            .map(|tags| {
                let list = tags.iter().cloned().collect::<Vec<_>>().join(", ");
                format!("    - ping:\n      tags: [{}]\n", list)
            })
            .collect();
        let loader = MemoryLoader::new()
            .with_file("/p/site.yml", format!("- hosts: all\n  tasks:\n{}", tasks));
        let resolver = Resolver::new("/p").with_loader(Arc::new(loader));

        let expected: BTreeSet<String> = sets.into_iter().flatten().collect();
        prop_assert_eq!(resolver.find_all_tags("/p/site.yml").unwrap(), expected);
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("    {}\n", line)).collect()
}
