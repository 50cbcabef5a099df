//! Module binding and lifecycle tests
//!
//! Drives the manager with in-process mock modules and checks slot ownership,
//! worker counts, status transitions and teardown behaviour.

mod support;

use crate::support::{harness, wait_until, MockPlan, RunBehavior};
use api::{Channels, ModuleState};
use std::thread;
use std::time::Duration;
use vrft_d::ModuleStatus;

fn status(eye: ModuleState, lip: ModuleState) -> ModuleStatus {
    ModuleStatus { eye, lip }
}

mod slot_assignment {
    use super::*;

    #[test]
    fn dual_module_fills_both_slots_and_stops_the_scan() {
        let a = MockPlan::new("a", Channels::BOTH);
        let b = MockPlan::new("b", Channels::BOTH);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        let bindings = h.manager.bindings();
        assert_eq!(bindings.eye.as_deref(), Some("a"));
        assert_eq!(bindings.lip.as_deref(), Some("a"));
        assert_eq!(bindings.workers, 1, "one worker per instance");
        assert!(h.manager.shares_owner());
        assert_eq!(b.stats.created(), 0, "scan must stop once both slots are bound");
        assert_eq!(
            h.status.get(),
            status(ModuleState::Active, ModuleState::Active)
        );

        h.manager.teardown();
        assert_eq!(a.stats.torn_down(), 1);
    }

    #[test]
    fn lip_only_module_then_dual_module() {
        let a = MockPlan::new("lip-only", Channels::LIP);
        let b = MockPlan::new("dual", Channels::BOTH);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        let bindings = h.manager.bindings();
        assert_eq!(bindings.lip.as_deref(), Some("lip-only"));
        assert_eq!(bindings.eye.as_deref(), Some("dual"));
        assert_eq!(bindings.workers, 2);
        assert!(!h.manager.shares_owner());
        assert_eq!(b.stats.initialized(), 1);
        assert_eq!(
            h.status.get(),
            status(ModuleState::Active, ModuleState::Active)
        );

        h.manager.teardown();
        assert_eq!(a.stats.torn_down(), 1);
        assert_eq!(b.stats.torn_down(), 1);
    }

    #[test]
    fn failed_initialize_falls_through_to_next_candidate() {
        let a = MockPlan::new("broken", Channels::BOTH).reports(None);
        let b = MockPlan::new("good", Channels::BOTH);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        let bindings = h.manager.bindings();
        assert_eq!(bindings.eye.as_deref(), Some("good"));
        assert_eq!(bindings.lip.as_deref(), Some("good"));
        assert_eq!(a.stats.initialized(), 1);
        assert_eq!(a.stats.torn_down(), 1, "discarded instance must be torn down");
    }

    #[test]
    fn reported_channels_limit_the_claim() {
        let a = MockPlan::new("eye-came-up", Channels::BOTH).reports(Some(Channels::EYE));
        let b = MockPlan::new("lip", Channels::LIP);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        let bindings = h.manager.bindings();
        assert_eq!(bindings.eye.as_deref(), Some("eye-came-up"));
        assert_eq!(bindings.lip.as_deref(), Some("lip"));
    }

    #[test]
    fn unrequested_channel_is_never_claimed() {
        let a = MockPlan::new("dual", Channels::BOTH);
        let b = MockPlan::new("lip", Channels::LIP);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::EYE).unwrap();
        h.manager.wait_for_discovery();

        let bindings = h.manager.bindings();
        assert_eq!(bindings.eye.as_deref(), Some("dual"));
        assert_eq!(bindings.lip, None);
        assert_eq!(bindings.workers, 1);
        // The lip slot stays open, so the scan carries on and discards `b`.
        assert_eq!(b.stats.initialized(), 1);
        assert_eq!(b.stats.torn_down(), 1);
        assert_eq!(h.status.lip(), ModuleState::Uninitialized);
    }

    #[test]
    fn partial_availability_leaves_other_channel_uninitialized() {
        let a = MockPlan::new("lip", Channels::LIP);
        let h = harness(&[&a]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        assert_eq!(
            h.status.get(),
            status(ModuleState::Uninitialized, ModuleState::Active)
        );
        assert_eq!(h.manager.bindings().eye, None);
    }

    #[test]
    fn no_candidates() {
        let h = harness(&[]);
        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        assert_eq!(h.manager.bindings().workers, 0);
        assert_eq!(
            h.status.get(),
            status(ModuleState::Uninitialized, ModuleState::Uninitialized)
        );
    }
}

mod status_policy {
    use super::*;

    #[test]
    fn status_resets_once_per_pass_not_per_candidate() {
        let a = MockPlan::new("broken", Channels::BOTH).reports(None);
        let b = MockPlan::new("also-broken", Channels::BOTH).reports(None);
        let c = MockPlan::new("lip", Channels::LIP);
        let h = harness(&[&a, &b, &c]);
        let rx = h.status.subscribe();

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        let seen: Vec<ModuleStatus> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                status(ModuleState::Uninitialized, ModuleState::Uninitialized),
                status(ModuleState::Uninitialized, ModuleState::Active),
            ]
        );
    }

    #[test]
    fn restart_resets_previous_states() {
        let a = MockPlan::new("dual", Channels::BOTH);
        let h = harness(&[&a]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();
        let rx = h.status.subscribe();

        h.manager.start(Channels::LIP).unwrap();
        h.manager.wait_for_discovery();

        let seen: Vec<ModuleStatus> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                // teardown of the previous worker
                status(ModuleState::Idle, ModuleState::Active),
                status(ModuleState::Idle, ModuleState::Idle),
                // new pass
                status(ModuleState::Uninitialized, ModuleState::Uninitialized),
                status(ModuleState::Uninitialized, ModuleState::Active),
            ]
        );
        assert_eq!(a.stats.created(), 2);
        assert_eq!(a.stats.torn_down(), 1);
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn repeated_passes_keep_one_worker_per_instance() {
        let a = MockPlan::new("dual", Channels::BOTH);
        let h = harness(&[&a]);

        for _ in 0..3 {
            h.manager.start(Channels::BOTH).unwrap();
            h.manager.wait_for_discovery();
            assert_eq!(h.manager.bindings().workers, 1);
            assert!(h.manager.shares_owner());
        }

        assert_eq!(a.stats.created(), 3);
        assert_eq!(a.stats.torn_down(), 2);
        h.manager.teardown();
        assert_eq!(a.stats.torn_down(), 3);
    }

    #[test]
    fn teardown_is_idempotent() {
        let a = MockPlan::new("dual", Channels::BOTH);
        let h = harness(&[&a]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        h.manager.teardown();
        h.manager.teardown();

        assert_eq!(a.stats.torn_down(), 1);
        assert_eq!(h.manager.bindings().workers, 0);
        assert_eq!(h.status.get(), status(ModuleState::Idle, ModuleState::Idle));
    }

    #[test]
    fn drop_tears_down() {
        let a = MockPlan::new("dual", Channels::BOTH);
        let h = harness(&[&a]);
        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        drop(h);
        assert_eq!(a.stats.torn_down(), 1);
    }

    #[test]
    fn teardown_cancels_in_flight_discovery() {
        let slow = MockPlan::new("slow", Channels::BOTH)
            .reports(None)
            .init_delay(Duration::from_millis(200));
        let next = MockPlan::new("next", Channels::BOTH);
        let h = harness(&[&slow, &next]);

        h.manager.start(Channels::BOTH).unwrap();
        assert!(wait_until(|| slow.stats.initialized() == 1));
        h.manager.teardown();

        assert_eq!(next.stats.created(), 0);
        assert_eq!(h.manager.bindings().workers, 0);
    }

    #[test]
    fn bound_worker_publishes_only_its_channels() {
        let a = MockPlan::new("lip", Channels::LIP);
        let h = harness(&[&a]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        assert!(wait_until(|| h.store.snapshot().shapes[0].weight == 0.5));
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.eye.left.openness, 1.0, "eye data is not owned by `lip`");
        h.manager.teardown();
    }
}

mod crashes {
    use super::*;

    fn crashed_worker_is_demoted(behavior: RunBehavior) {
        let a = MockPlan::new("flaky", Channels::BOTH).behavior(behavior);
        let h = harness(&[&a]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        assert!(wait_until(|| h.status.get()
            == status(ModuleState::Idle, ModuleState::Idle)));
        // The slot stays claimed until the next pass or teardown.
        assert_eq!(h.manager.bindings().eye.as_deref(), Some("flaky"));

        h.manager.teardown();
        assert_eq!(a.stats.torn_down(), 1);
    }

    #[test]
    fn run_error_demotes_to_idle() {
        crashed_worker_is_demoted(RunBehavior::Fail);
    }

    #[test]
    fn panic_demotes_to_idle() {
        crashed_worker_is_demoted(RunBehavior::Panic);
    }

    #[test]
    fn early_exit_demotes_to_idle() {
        crashed_worker_is_demoted(RunBehavior::Exit);
    }

    #[test]
    fn crash_does_not_touch_other_owner() {
        let a = MockPlan::new("lip", Channels::LIP).behavior(RunBehavior::Fail);
        let b = MockPlan::new("eye", Channels::EYE);
        let h = harness(&[&a, &b]);

        h.manager.start(Channels::BOTH).unwrap();
        h.manager.wait_for_discovery();

        assert!(wait_until(|| h.status.lip() == ModuleState::Idle));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(h.status.eye(), ModuleState::Active);
        h.manager.teardown();
    }
}
