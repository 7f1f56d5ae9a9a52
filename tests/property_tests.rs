//! Property-Based Tests for Clearphone
//!
//! These tests verify:
//! - Package removal partitions every package into exactly one outcome
//! - Conditional package filtering
//! - Device model pattern matching
//! - Phase ordering

mod common;

use common::FakeDevice;
use proptest::prelude::*;

use clearphone::device::model_matches;
use clearphone::profile::{ConditionalChoices, DeviceProfile, DeviceSpec, PackageAction};
use clearphone::remover::{FailureReason, KNOX_PROTECTED_PACKAGES};
use clearphone::workflow::{Phase, PhaseTracker};
use clearphone::{EventKind, EventLog, PackageRemover, PackageToRemove};
use std::path::PathBuf;

fn package(id: &str, action: PackageAction, conditional: Option<&str>) -> PackageToRemove {
    PackageToRemove {
        id: id.to_string(),
        name: id.to_string(),
        source: String::new(),
        function: String::new(),
        category: String::new(),
        action,
        conditional: conditional.map(str::to_string),
        removal_rationale: String::new(),
    }
}

// =============================================================================
// Package removal
// =============================================================================

const POOL: &[&str] = &[
    "com.samsung.android.bixby.agent",
    "com.samsung.android.app.spage",
    "com.facebook.katana",
    "com.google.android.youtube",
    "com.samsung.android.knox.containercore",
    "com.samsung.android.knox.attestation",
    "com.android.chrome",
    "com.sec.android.app.sbrowser",
];

/// (pool index, installed, uninstall fails)
fn removal_case() -> impl Strategy<Value = Vec<(usize, bool, bool)>> {
    prop::collection::vec((0..POOL.len(), any::<bool>(), any::<bool>()), 0..16)
}

proptest! {
    /// Every package lands in exactly one bucket and the counts match the
    /// device state
    #[test]
    fn removal_partitions_packages(case in removal_case()) {
        let mut device = FakeDevice::new("SM-S921U");
        let mut packages = Vec::new();
        for (idx, installed, fails) in &case {
            let id = POOL[*idx];
            packages.push(package(id, PackageAction::Remove, None));
            if *installed && !device.installed.iter().any(|p| p == id) {
                device.installed.push(id.to_string());
            }
            if *fails {
                device
                    .failing_uninstalls
                    .insert(id.to_string(), "Failure [DELETE_FAILED_INTERNAL_ERROR]".to_string());
            }
        }

        let mut log = EventLog::new();
        let summary = PackageRemover::new(&device, false)
            .remove_packages(&packages, &mut log)
            .unwrap();

        prop_assert_eq!(summary.total(), packages.len());
        prop_assert_eq!(summary.outcomes.len(), packages.len());

        let mut expected_removed = 0;
        let mut expected_failed = 0;
        for pkg in &packages {
            let installed = device.installed.contains(&pkg.id);
            let protected = KNOX_PROTECTED_PACKAGES.contains(&pkg.id.as_str());
            if installed && !protected {
                if device.failing_uninstalls.contains_key(&pkg.id) {
                    expected_failed += 1;
                } else {
                    expected_removed += 1;
                }
            }
        }
        prop_assert_eq!(summary.removed, expected_removed);
        prop_assert_eq!(summary.failed, expected_failed);
        prop_assert_eq!(log.count(EventKind::PackageRemoved), expected_removed);
        prop_assert_eq!(log.count(EventKind::PackageRemovalFailed), expected_failed);

        // Protected and absent packages are never sent to the device
        for id in device.uninstalled() {
            prop_assert!(device.installed.contains(&id));
            prop_assert!(!KNOX_PROTECTED_PACKAGES.contains(&id.as_str()));
        }
    }

    /// Dry run reports what a real run would remove without uninstalling
    #[test]
    fn dry_run_matches_real_run_without_calls(case in removal_case()) {
        let mut device = FakeDevice::new("SM-S921U");
        let mut packages = Vec::new();
        for (idx, installed, _) in &case {
            packages.push(package(POOL[*idx], PackageAction::Remove, None));
            if *installed {
                device.installed.push(POOL[*idx].to_string());
            }
        }

        let mut log = EventLog::new();
        let dry = PackageRemover::new(&device, true)
            .remove_packages(&packages, &mut log)
            .unwrap();
        prop_assert!(device.uninstalled().is_empty());

        let real = PackageRemover::new(&device, false)
            .remove_packages(&packages, &mut log)
            .unwrap();
        prop_assert_eq!(dry.outcomes, real.outcomes);
    }

    /// Categorizing arbitrary device output never panics and always names a reason
    #[test]
    fn failure_reason_is_total(text in ".{0,80}") {
        let reason = FailureReason::categorize(&text);
        prop_assert!(!reason.to_string().is_empty());
    }
}

// =============================================================================
// Conditional filtering
// =============================================================================

fn profile_package() -> impl Strategy<Value = (PackageAction, Option<&'static str>)> {
    (
        prop_oneof![Just(PackageAction::Remove), Just(PackageAction::Disable)],
        prop_oneof![Just(None), Just(Some("camera")), Just(Some("keyboard"))],
    )
}

fn profile_with(packages: Vec<PackageToRemove>) -> DeviceProfile {
    DeviceProfile {
        path: PathBuf::from("generated.toml"),
        device: DeviceSpec {
            model_pattern: "SM-S921*".to_string(),
            name: "Generated".to_string(),
            android_version: "14".to_string(),
            maintainer: "proptest".to_string(),
        },
        apps: Default::default(),
        packages,
    }
}

proptest! {
    /// A package is selected iff it is a removal and its condition, if any,
    /// resolved to true. Order is preserved.
    #[test]
    fn conditional_filtering(
        specs in prop::collection::vec(profile_package(), 0..20),
        camera in any::<bool>(),
        keyboard in proptest::option::of(any::<bool>()),
    ) {
        let packages: Vec<PackageToRemove> = specs
            .iter()
            .enumerate()
            .map(|(i, (action, cond))| package(&format!("pkg.{}", i), *action, *cond))
            .collect();
        let profile = profile_with(packages.clone());

        let mut choices = ConditionalChoices::new();
        choices.insert("camera".to_string(), camera);
        if let Some(keyboard) = keyboard {
            choices.insert("keyboard".to_string(), keyboard);
        }

        let expected: Vec<String> = packages
            .iter()
            .filter(|p| p.action == PackageAction::Remove)
            .filter(|p| match &p.conditional {
                None => true,
                Some(tag) => choices.get(tag).copied().unwrap_or(false),
            })
            .map(|p| p.id.clone())
            .collect();

        let selected: Vec<String> = profile
            .get_packages_to_remove(&choices)
            .into_iter()
            .map(|p| p.id)
            .collect();
        prop_assert_eq!(selected, expected);
    }
}

// =============================================================================
// Model matching
// =============================================================================

proptest! {
    /// Any model sharing the literal prefix matches a trailing-star pattern
    #[test]
    fn star_pattern_matches_prefix(suffix in "[A-Z0-9]{0,6}") {
        let model = format!("SM-S921{}", suffix);
        prop_assert!(model_matches("SM-S921*", &model));
    }

    /// A different model line never matches
    #[test]
    fn star_pattern_rejects_other_lines(suffix in "[A-Z0-9]{0,6}") {
        let model = format!("SM-S911{}", suffix);
        prop_assert!(!model_matches("SM-S921*", &model));
    }
}

// =============================================================================
// Phase ordering
// =============================================================================

proptest! {
    /// Starting phases in an arbitrary order only ever advances one step
    #[test]
    fn phases_only_advance_in_order(order in prop::collection::vec(0..8usize, 1..24)) {
        let mut tracker = PhaseTracker::new();
        for idx in order {
            let phase = Phase::ALL[idx];
            let expected_next = match tracker.completed().last() {
                None => Some(Phase::LoadProfile),
                Some(last) => last.next(),
            };
            let accepted = tracker.begin(phase).is_ok();
            prop_assert_eq!(accepted, Some(phase) == expected_next);
            if accepted {
                tracker.complete().unwrap();
            }
        }
        let completed = tracker.completed();
        prop_assert_eq!(completed, &Phase::ALL[..completed.len()]);
    }
}
