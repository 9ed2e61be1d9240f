mod common;

use common::{engine, user};
use points_ledger::{
    domain::{ChangeType, RuleId},
    engine::ErrorKind,
};

#[test]
fn applying_a_rule_changes_balance_and_logs_the_event() {
    let engine = engine();
    let alice = user("alice");
    let points = engine.points();
    let rule = points
        .register_rule("DAILY_LOGIN", ChangeType::Gain, 5, "daily login")
        .unwrap();

    let (entry, event) = points.apply_rule(&alice, "DAILY_LOGIN").unwrap();

    assert_eq!(entry.delta, 5);
    assert_eq!(entry.description, "daily login");
    assert_eq!(entry.ref_rule_id, Some(rule.rule_id));
    assert_eq!(event.rule_id, rule.rule_id);
    assert_eq!(event.points_id, entry.points_id);
    assert_eq!(points.rule_events(&alice).unwrap(), vec![event]);
}

#[test]
fn loss_rules_respect_the_balance_floor() {
    let engine = engine();
    let alice = user("alice");
    let points = engine.points();
    points
        .register_rule("LATE_HOMEWORK", ChangeType::Loss, 10, "late homework")
        .unwrap();

    let err = points.apply_rule(&alice, "LATE_HOMEWORK").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert!(points.rule_events(&alice).unwrap().is_empty());

    points.grant(&alice, 15, "bonus", None).unwrap();
    let (entry, _) = points.apply_rule(&alice, "LATE_HOMEWORK").unwrap();
    assert_eq!(entry.balance_after, 5);
}

#[test]
fn disabled_rules_are_not_applied() {
    let engine = engine();
    let alice = user("alice");
    let points = engine.points();
    let rule = points
        .register_rule("SIGNUP", ChangeType::Gain, 100, "signup")
        .unwrap();

    let disabled = points.set_rule_enabled(rule.rule_id, false).unwrap();
    let err = points.apply_rule(&alice, "SIGNUP").unwrap_err();

    assert!(!disabled.enabled);
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(points.get_balance(&alice).unwrap(), 0);

    points.set_rule_enabled(rule.rule_id, true).unwrap();
    assert!(points.apply_rule(&alice, "SIGNUP").is_ok());
}

#[test]
fn rule_registration_is_validated() {
    let engine = engine();
    let points = engine.points();
    points
        .register_rule("SIGNUP", ChangeType::Gain, 100, "signup")
        .unwrap();

    let duplicate = points.register_rule("SIGNUP", ChangeType::Gain, 1, "again");
    let blank = points.register_rule(" ", ChangeType::Gain, 1, "blank");
    let zero = points.register_rule("ZERO", ChangeType::Gain, 0, "zero");
    let refund = points.register_rule("REFUND", ChangeType::Refund, 1, "refund");

    for result in [duplicate, blank, zero, refund] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn unknown_rules_are_not_found() {
    let engine = engine();
    let points = engine.points();

    assert_eq!(
        points.apply_rule(&user("alice"), "NOPE").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        points
            .set_rule_enabled(RuleId::from(999_999_u64), false)
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn concurrent_registrations_of_one_code_yield_a_single_rule() {
    const ATTEMPTS: usize = 8;
    let engine = engine();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|i| {
                let points = engine.points();
                s.spawn(move || {
                    points.register_rule("QUIZ_WIN", ChangeType::Gain, 10 + i as i64, "quiz")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::InvalidArgument)
    );
}

#[test]
fn concurrent_toggles_settle_on_a_stored_state() {
    let engine = engine();
    let points = engine.points();
    let rule = points
        .register_rule("STREAK", ChangeType::Gain, 3, "streak")
        .unwrap();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| s.spawn(move || points.set_rule_enabled(rule.rule_id, i % 2 == 0)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|r| r.is_ok()));
    points.set_rule_enabled(rule.rule_id, false).unwrap();
    assert_eq!(
        points.apply_rule(&user("alice"), "STREAK").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}
