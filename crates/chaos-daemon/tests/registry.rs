//! Integration tests for the effect registry
//!
//! A fake effect records what it was asked to do and can be told to fail
//! on injection or recovery.

use std::sync::Arc;
use std::thread;

use chaos_core::{ChaosError, ErrorKind, Missing, Result};
use chaos_daemon::{EffectConfig, EffectRegistry, EffectTarget, ProcessEffect, Withdrawal};

#[derive(Debug, Clone, PartialEq)]
struct FakeConfig {
    i: i64,
}

#[derive(Debug, Default)]
struct FakeChaos {
    value: i64,
    err_when_inject: bool,
    err_when_recover: bool,
    keep_on_withdrawal: bool,
    injected: Vec<i64>,
    recovered: usize,
}

impl ProcessEffect for FakeChaos {
    fn inject(&mut self, _target: EffectTarget) -> Result<()> {
        if self.err_when_inject {
            return Err(ChaosError::NotImplemented("inject"));
        }
        self.injected.push(self.value);
        Ok(())
    }

    fn recover(&mut self, _target: EffectTarget) -> Result<()> {
        if self.err_when_recover {
            return Err(ChaosError::NotImplemented("recover"));
        }
        self.recovered += 1;
        Ok(())
    }

    fn withdrawal(&self) -> Withdrawal {
        if self.keep_on_withdrawal {
            Withdrawal::Keep
        } else {
            Withdrawal::Reapply
        }
    }
}

impl EffectConfig for FakeConfig {
    type Effect = FakeChaos;

    fn combine(&mut self, other: &Self) -> Result<()> {
        if other.i < 0 {
            return Err(ChaosError::CanNotAdd(format!("negative value {}", other.i)));
        }
        self.i += other.i;
        Ok(())
    }

    fn assign(&self, effect: &mut FakeChaos) -> Result<()> {
        effect.value = self.i;
        Ok(())
    }
}

fn fake(i: i64) -> FakeConfig {
    FakeConfig { i }
}

#[test]
fn test_task_lifecycle() {
    let m = EffectRegistry::new();
    let uid1 = "1";

    m.create(uid1, 1, fake(1), FakeChaos::default).unwrap();
    let err = m.apply(uid1, 1, fake(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateEntity);
    m.recover(uid1, 1).unwrap();
    let err = m.recover(uid1, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound(Missing::Pid));

    let err = m
        .create(uid1, 1, fake(1), || FakeChaos {
            err_when_inject: true,
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented("inject"));
    let err = m.get_with_uid(uid1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound(Missing::Uid));

    m.create(uid1, 1, fake(1), || FakeChaos {
        err_when_recover: true,
        ..Default::default()
    })
    .unwrap();
    let err = m.recover(uid1, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented("recover"));
    assert_eq!(m.get_with_uid(uid1).unwrap(), (1, fake(1)));

    m.with_effect(1, |chaos| chaos.err_when_recover = false).unwrap();
    m.recover(uid1, 1).unwrap();
    assert!(m.targets().is_empty());
}

#[test]
fn merged_config_is_order_independent() {
    let forward = EffectRegistry::new();
    forward.create("a", 5, fake(1), FakeChaos::default).unwrap();
    forward.apply("b", 5, fake(2)).unwrap();
    forward.apply("c", 5, fake(4)).unwrap();

    let backward = EffectRegistry::new();
    backward.create("c", 5, fake(4), FakeChaos::default).unwrap();
    backward.apply("b", 5, fake(2)).unwrap();
    backward.apply("a", 5, fake(1)).unwrap();

    assert_eq!(forward.get_with_pid(5).unwrap(), fake(7));
    assert_eq!(backward.get_with_pid(5).unwrap(), fake(7));

    let ids: Vec<_> = backward
        .contributions(5)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn duplicate_create_leaves_state_unchanged() {
    let m = EffectRegistry::new();
    m.create("a", 2, fake(3), FakeChaos::default).unwrap();

    let err = m.create("a", 2, fake(100), FakeChaos::default).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateEntity);
    assert_eq!(m.get_with_pid(2).unwrap(), fake(3));
    assert_eq!(m.contributions(2), vec![("a".to_string(), fake(3))]);
    assert_eq!(m.with_effect(2, |chaos| chaos.injected.clone()).unwrap(), vec![3]);
}

#[test]
fn recover_unknown_request() {
    let m = EffectRegistry::new();
    m.create("a", 3, fake(1), FakeChaos::default).unwrap();

    assert_eq!(
        m.recover("b", 3).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Uid)
    );
    assert_eq!(
        m.recover("a", 4).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Pid)
    );
    assert_eq!(m.get_with_pid(3).unwrap(), fake(1));
}

#[test]
fn last_recover_uninjects_target() {
    let m = EffectRegistry::new();
    m.create("a", 9, fake(1), FakeChaos::default).unwrap();
    m.apply("b", 9, fake(2)).unwrap();

    m.recover("a", 9).unwrap();
    assert_eq!(m.get_with_pid(9).unwrap(), fake(2));
    assert_eq!(m.targets(), vec![9]);

    m.recover("b", 9).unwrap();
    assert_eq!(
        m.get_with_pid(9).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Pid)
    );
    assert!(m.targets().is_empty());

    // a fresh effect is built for the next request
    m.create("c", 9, fake(5), FakeChaos::default).unwrap();
    assert_eq!(m.with_effect(9, |chaos| chaos.recovered).unwrap(), 0);
}

#[test]
fn remaining_contributions_are_reinjected() {
    let m = EffectRegistry::new();
    m.create("a", 6, fake(1), FakeChaos::default).unwrap();
    m.apply("b", 6, fake(10)).unwrap();
    m.recover("a", 6).unwrap();

    let injected = m.with_effect(6, |chaos| chaos.injected.clone()).unwrap();
    assert_eq!(injected, vec![1, 11, 10]);
}

#[test]
fn failed_reinjection_keeps_withdrawal() {
    let m = EffectRegistry::new();
    m.create("a", 6, fake(1), FakeChaos::default).unwrap();
    m.apply("b", 6, fake(10)).unwrap();

    m.with_effect(6, |chaos| chaos.err_when_inject = true).unwrap();
    let err = m.recover("a", 6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented("inject"));

    assert_eq!(m.contributions(6), vec![("b".to_string(), fake(10))]);
    assert_eq!(m.get_with_pid(6).unwrap(), fake(10));
    assert_eq!(
        m.get_with_uid("a").unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Uid)
    );

    // the next change re-injects the remaining value
    m.with_effect(6, |chaos| chaos.err_when_inject = false).unwrap();
    m.update("b", 6, fake(10)).unwrap();
    let injected = m.with_effect(6, |chaos| chaos.injected.clone()).unwrap();
    assert_eq!(injected.last(), Some(&10));
}

#[test]
fn keep_policy_skips_reinjection() {
    let m = EffectRegistry::new();
    m.create("a", 6, fake(1), || FakeChaos {
        keep_on_withdrawal: true,
        ..Default::default()
    })
    .unwrap();
    m.apply("b", 6, fake(10)).unwrap();
    m.recover("a", 6).unwrap();

    assert_eq!(m.get_with_pid(6).unwrap(), fake(10));
    let injected = m.with_effect(6, |chaos| chaos.injected.clone()).unwrap();
    assert_eq!(injected, vec![1, 11]);
}

#[test]
fn failed_merge_records_nothing() {
    let m = EffectRegistry::new();
    m.create("a", 7, fake(2), FakeChaos::default).unwrap();

    let err = m.apply("bad", 7, fake(-1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CanNotAdd);

    m.with_effect(7, |chaos| chaos.err_when_inject = true).unwrap();
    let err = m.apply("b", 7, fake(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented("inject"));

    assert_eq!(m.get_with_pid(7).unwrap(), fake(2));
    assert_eq!(m.contributions(7).len(), 1);
    // the previous merged value was assigned back
    assert_eq!(m.with_effect(7, |chaos| chaos.value).unwrap(), 2);
    assert_eq!(
        m.get_with_uid("b").unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Uid)
    );
}

#[test]
fn update_replaces_contribution() {
    let m = EffectRegistry::new();
    m.create("a", 8, fake(1), FakeChaos::default).unwrap();
    m.apply("b", 8, fake(2)).unwrap();

    m.update("b", 8, fake(20)).unwrap();
    assert_eq!(m.get_with_pid(8).unwrap(), fake(21));
    assert_eq!(m.get_with_uid("b").unwrap(), (8, fake(20)));

    assert_eq!(
        m.update("z", 8, fake(1)).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Uid)
    );
    assert_eq!(
        m.update("a", 99, fake(1)).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Pid)
    );
}

#[test]
fn apply_requires_injected_target() {
    let m: EffectRegistry<FakeConfig> = EffectRegistry::new();
    assert_eq!(
        m.apply("a", 1, fake(1)).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Pid)
    );
    assert_eq!(
        m.with_effect(1, |_| ()).unwrap_err().kind(),
        ErrorKind::NotFound(Missing::Pid)
    );
}

#[test]
fn concurrent_requests_on_shared_targets() {
    let m = Arc::new(EffectRegistry::new());
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let target = worker % 2;
                for round in 0..50 {
                    let id = format!("w{}-r{}", worker, round);
                    match m.create(&id, target, fake(1), FakeChaos::default) {
                        Ok(()) => {}
                        Err(e) => panic!("create {} failed: {}", id, e),
                    }
                    m.recover(&id, target).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(m.targets().is_empty());
}

#[test]
fn concurrent_contributions_fold_completely() {
    let m = Arc::new(EffectRegistry::new());
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for round in 0..25 {
                    let id = format!("w{}-r{}", worker, round);
                    m.create(&id, 42, fake(1), FakeChaos::default).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(m.get_with_pid(42).unwrap(), fake(100));
    assert_eq!(m.contributions(42).len(), 100);
}
