// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use foundry_core::BuildConfig;

fn tree(platforms: &[&str]) -> (BuildRegistry, BuildId, Vec<BuildId>) {
    let conf = BuildConfig::new(platforms.iter().map(|p| p.to_string()).collect()).number("7");
    let master = Build::new(conf.clone());
    let master_id = master.id.clone();
    let children: Vec<Build> = platforms.iter().map(|p| Build::new(conf.child_for(p))).collect();
    let child_ids: Vec<BuildId> = children.iter().map(|c| c.id.clone()).collect();

    let mut registry = BuildRegistry::default();
    registry.insert_tree(master, children);
    (registry, master_id, child_ids)
}

#[test]
fn insert_tree_links_both_directions() {
    let (registry, master_id, child_ids) = tree(&["android", "ios"]);

    let master = registry.get(&master_id).unwrap();
    assert_eq!(master.children, child_ids);
    for id in &child_ids {
        assert_eq!(registry.get(id).unwrap().master_id.as_ref(), Some(&master_id));
    }
    assert_eq!(registry.len(), 3);
}

#[test]
fn child_update_recomputes_master() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios"]);
    registry.update_status(&child_ids[0], BuildStatus::Queued);
    registry.update_status(&child_ids[1], BuildStatus::Queued);

    registry.update_status(&child_ids[0], BuildStatus::Building);
    assert_eq!(registry.get(&master_id).unwrap().status, BuildStatus::Building);

    // A failed sibling outranks everything
    registry.update_status(&child_ids[1], BuildStatus::Failed);
    assert_eq!(registry.get(&master_id).unwrap().status, BuildStatus::Failed);
}

#[test]
fn master_always_tracks_max_priority_child() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios", "wp8"]);
    let statuses = [
        BuildStatus::Success,
        BuildStatus::Building,
        BuildStatus::Queued,
    ];
    for (id, status) in child_ids.iter().zip(statuses) {
        registry.update_status(id, status);
        // Invariant holds immediately after *any* child update
        let expected = BuildStatus::max_priority(
            registry
                .get(&master_id)
                .unwrap()
                .children
                .iter()
                .map(|c| registry.get(c).unwrap().status),
        );
        assert_eq!(registry.get(&master_id).unwrap().status, expected);
    }
}

#[test]
fn root_change_is_reported_for_persistence_once() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios"]);

    // First transition changes the master: persist
    let root = registry.update_status(&child_ids[0], BuildStatus::Queued);
    assert_eq!(root, Some(master_id.clone()));

    // Same summary again: nothing to persist
    let root = registry.update_status(&child_ids[1], BuildStatus::Queued);
    assert_eq!(root, None);
}

#[test]
fn standalone_root_reports_itself() {
    let mut registry = BuildRegistry::default();
    let build = Build::new(BuildConfig::default().child_for("android"));
    let id = build.id.clone();
    registry.insert_tree(build, Vec::new());

    assert_eq!(registry.update_status(&id, BuildStatus::Queued), Some(id.clone()));
    assert_eq!(registry.update_status(&id, BuildStatus::Queued), None);
}

#[test]
fn unknown_build_is_a_noop() {
    let mut registry = BuildRegistry::default();
    assert_eq!(registry.update_status(&"bld-nope".into(), BuildStatus::Failed), None);
}

#[test]
fn all_children_terminal_tracks_siblings() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios"]);
    assert!(!registry.all_children_terminal(&master_id));

    registry.update_status(&child_ids[0], BuildStatus::Success);
    assert!(!registry.all_children_terminal(&master_id));

    registry.update_status(&child_ids[1], BuildStatus::Failed);
    assert!(registry.all_children_terminal(&master_id));
}

#[test]
fn remove_master_removes_children() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios"]);
    let removed = registry.remove_tree(&master_id);

    assert_eq!(removed.len(), 3);
    assert!(registry.is_empty());
    assert!(registry.roots().next().is_none());
    for id in child_ids {
        assert!(!registry.contains(&id));
    }
}

#[test]
fn remove_child_detaches_from_master() {
    let (mut registry, master_id, child_ids) = tree(&["android", "ios"]);
    let removed = registry.remove_tree(&child_ids[0]);

    assert_eq!(removed, vec![child_ids[0].clone()]);
    let master = registry.get(&master_id).unwrap();
    assert_eq!(master.children, vec![child_ids[1].clone()]);
}

#[test]
fn payload_nests_children_on_request() {
    let (registry, master_id, child_ids) = tree(&["android"]);

    let flat = registry
        .payload(&master_id, SerializeOpts::STATUS, SerializeOpts::STATUS)
        .unwrap();
    assert!(flat.platforms.is_none());

    let nested = registry
        .payload(
            &master_id,
            SerializeOpts { platforms: true, ..SerializeOpts::STATUS },
            SerializeOpts::STATUS,
        )
        .unwrap();
    let children = nested.platforms.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child_ids[0]);
}

#[test]
fn root_of_resolves_masters_and_selves() {
    let (registry, master_id, child_ids) = tree(&["android"]);
    assert_eq!(registry.root_of(&child_ids[0]).unwrap().id, master_id);
    assert_eq!(registry.root_of(&master_id).unwrap().id, master_id);
}

#[test]
fn root_by_label_finds_numbered_build() {
    let (registry, master_id, _) = tree(&["android"]);
    assert_eq!(registry.root_by_label("7").unwrap().id, master_id);
    assert!(registry.root_by_label("unknown").is_none());
}
