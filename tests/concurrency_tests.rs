mod common;

use std::{sync::Arc, thread, time::Duration};

use common::{FaultyStore, assert_ledger_consistent, engine, engine_over, item, user};
use points_ledger::{config::EngineConfig, domain::Category, engine::ErrorKind};

#[test]
fn concurrent_purchases_never_oversell() {
    const BUYERS: usize = 16;
    const STOCK: i64 = 5;
    let engine = engine();
    let poster = item(&engine, "poster", Category::Other, 10, STOCK);
    let buyers: Vec<_> = (0..BUYERS).map(|i| user(&format!("student-{i}"))).collect();
    for buyer in &buyers {
        engine.points().grant(buyer, 100, "bonus", None).unwrap();
    }

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = buyers
            .iter()
            .map(|buyer| {
                let engine = &engine;
                let item_id = poster.item_id;
                s.spawn(move || engine.purchase(buyer, &item_id, 1, None))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::InsufficientStock))
        .count();
    assert_eq!(succeeded, STOCK as usize);
    assert_eq!(out_of_stock, BUYERS - STOCK as usize);
    assert_eq!(engine.get_item(&poster.item_id).unwrap().stock, 0);

    let spent: i64 = buyers
        .iter()
        .map(|b| 100 - engine.points().get_balance(b).unwrap())
        .sum();
    assert_eq!(spent, 10 * STOCK);
}

#[test]
fn concurrent_grants_and_deducts_lose_no_updates() {
    const WORKERS: i64 = 8;
    const ROUNDS: i64 = 25;
    let engine = engine();
    let alice = user("alice");
    engine.points().grant(&alice, 1_000, "seed", None).unwrap();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let engine = &engine;
            let alice = &alice;
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    if worker % 2 == 0 {
                        engine.points().grant(alice, 3, "quiz", None).unwrap();
                    } else {
                        engine.points().deduct(alice, 2, "late", None).unwrap();
                    }
                }
            });
        }
    });

    let expected = 1_000 + (WORKERS / 2) * ROUNDS * 3 - (WORKERS / 2) * ROUNDS * 2;
    assert_eq!(engine.points().get_balance(&alice).unwrap(), expected);
    assert_ledger_consistent(&engine, &alice);
}

#[test]
fn concurrent_debits_never_drive_balance_negative() {
    const ATTEMPTS: usize = 20;
    let engine = engine();
    let alice = user("alice");
    engine.points().grant(&alice, 50, "seed", None).unwrap();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|_| {
                let engine = &engine;
                let alice = &alice;
                s.spawn(move || engine.points().use_points(alice, 7, "snack", None, "snack"))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 7);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::InsufficientBalance)
    );
    assert_eq!(engine.points().get_balance(&alice).unwrap(), 1);
    assert_ledger_consistent(&engine, &alice);
}

#[test]
fn overlapping_buyers_of_different_items_do_not_deadlock() {
    let engine = engine();
    let (alice, bob) = (user("alice"), user("bob"));
    for buyer in [&alice, &bob] {
        engine.points().grant(buyer, 10_000, "seed", None).unwrap();
    }
    let pen = item(&engine, "pen", Category::Stationery, 1, 1_000);
    let cookie = item(&engine, "cookie", Category::Snack, 1, 1_000);

    thread::scope(|s| {
        for (buyer, first, second) in [
            (&alice, pen.item_id, cookie.item_id),
            (&bob, cookie.item_id, pen.item_id),
            (&alice, cookie.item_id, pen.item_id),
            (&bob, pen.item_id, cookie.item_id),
        ] {
            let engine = &engine;
            s.spawn(move || {
                for _ in 0..50 {
                    engine.purchase(buyer, &first, 1, None).unwrap();
                    engine.purchase(buyer, &second, 1, None).unwrap();
                }
            });
        }
    });

    assert_eq!(engine.get_item(&pen.item_id).unwrap().stock, 800);
    assert_eq!(engine.get_item(&cookie.item_id).unwrap().stock, 800);
    assert_eq!(engine.points().get_balance(&alice).unwrap(), 10_000 - 200);
    assert_ledger_consistent(&engine, &alice);
    assert_ledger_consistent(&engine, &bob);
}

#[test]
fn lock_wait_beyond_budget_is_a_retryable_conflict() {
    let store = Arc::new(FaultyStore::slow(Duration::from_millis(300)));
    let config = EngineConfig::default().with_lock_timeout(Duration::from_millis(30));
    let engine = engine_over(store, config);
    let alice = user("alice");

    let contended = thread::scope(|s| {
        let holder = s.spawn(|| engine.points().grant(&alice, 10, "slow", None));
        thread::sleep(Duration::from_millis(100));
        let contended = engine.points().grant(&alice, 5, "fast", None);
        holder.join().unwrap().unwrap();
        contended
    });

    assert_eq!(contended.unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(engine.points().get_balance(&alice).unwrap(), 10);

    engine.points().grant(&alice, 5, "retry", None).unwrap();
    assert_eq!(engine.points().get_balance(&alice).unwrap(), 15);
}

#[test]
fn different_users_do_not_wait_on_each_other() {
    let store = Arc::new(FaultyStore::slow(Duration::from_millis(300)));
    let config = EngineConfig::default().with_lock_timeout(Duration::from_millis(30));
    let engine = engine_over(store, config);
    let (alice, bob) = (user("alice"), user("bob"));

    let other = thread::scope(|s| {
        let holder = s.spawn(|| engine.points().grant(&alice, 10, "slow", None));
        thread::sleep(Duration::from_millis(100));
        let other = engine.points().grant(&bob, 5, "other user", None);
        holder.join().unwrap().unwrap();
        other
    });

    assert!(other.is_ok());
    assert_eq!(engine.points().get_balance(&bob).unwrap(), 5);
}

#[test]
fn concurrent_first_purchases_of_a_one_time_item_allow_exactly_one() {
    const ATTEMPTS: usize = 16;
    let engine = engine();
    let alice = user("alice");
    let badge = item(&engine, "gold badge", Category::Badge, 10, 100);
    engine.points().grant(&alice, 10_000, "seed", None).unwrap();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|_| {
                let engine = &engine;
                let alice = &alice;
                let item_id = badge.item_id;
                s.spawn(move || engine.purchase(alice, &item_id, 1, None))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::AlreadyPurchased)
    );
    assert_eq!(engine.points().get_balance(&alice).unwrap(), 9_990);
    assert_eq!(engine.get_item(&badge.item_id).unwrap().stock, 99);
    assert_eq!(engine.list_my_logs(&alice, 0, 20).unwrap().total_elements, 1);
    assert_ledger_consistent(&engine, &alice);
}
