use super::test_db;
use crate::error::{DatabaseError, Error};
use crate::types::{RelayAddr, fail_ratio};
use std::sync::Arc;

fn addr(port: u16) -> RelayAddr {
    RelayAddr::new("198.51.100.7", port)
}

#[tokio::test]
async fn test_upsert_relay_reports_new_and_keeps_counters() {
    let (db, _temp_file) = test_db().await;

    assert!(db.upsert_relay(&addr(1), Some("harvester")).await.unwrap());
    db.record_relay_attempt(&addr(1), false).await.unwrap();

    assert!(!db.upsert_relay(&addr(1), Some("manual")).await.unwrap());
    let row = db.get_relay(&addr(1)).await.unwrap().unwrap();
    assert_eq!(row.used_total, 1);
    assert_eq!(row.failed_total, 1);
    assert_eq!(row.source.as_deref(), Some("manual"));
    assert_eq!(row.last_outcome.as_deref(), Some("failure"));
}

#[tokio::test]
async fn test_list_relays_orders_best_first() {
    let (db, _temp_file) = test_db().await;

    for port in [1, 2] {
        db.upsert_relay(&addr(port), None).await.unwrap();
    }
    // Port 1: 20 uses, all failed; port 2 stays fresh
    for _ in 0..20 {
        db.record_relay_attempt(&addr(1), false).await.unwrap();
    }

    let relays = db.list_relays().await.unwrap();
    assert_eq!(relays.len(), 2);
    assert_eq!(relays[0].addr, addr(2));
    assert_eq!(relays[0].fail_ratio, 0.0);
    assert_eq!(relays[1].addr, addr(1));
    assert_eq!(relays[1].fail_ratio, 1.0);
}

#[tokio::test]
async fn test_fail_ratio_matches_counters_for_any_sequence() {
    let (db, _temp_file) = test_db().await;
    db.upsert_relay(&addr(3), None).await.unwrap();

    let mut used = 0;
    let mut failed = 0;
    for i in 0..45 {
        let success = i % 4 != 0;
        db.record_relay_attempt(&addr(3), success).await.unwrap();
        used += 1;
        if !success {
            failed += 1;
        }

        let row = db.get_relay(&addr(3)).await.unwrap().unwrap();
        assert_eq!(row.used_total, used);
        assert_eq!(row.failed_total, failed);
        assert!(
            (row.fail_ratio - fail_ratio(used, failed)).abs() < 1e-12,
            "ratio {} after {} uses",
            row.fail_ratio,
            used
        );
    }
}

#[tokio::test]
async fn test_concurrent_outcomes_are_not_lost() {
    let (db, _temp_file) = test_db().await;
    let db = Arc::new(db);
    db.upsert_relay(&addr(4), None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.record_relay_attempt(&addr(4), i % 2 == 0).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let row = db.get_relay(&addr(4)).await.unwrap().unwrap();
    assert_eq!(row.used_total, 40);
    assert_eq!(row.failed_total, 20);
    assert_eq!(row.fail_ratio, 0.5);
}

#[tokio::test]
async fn test_record_unknown_relay_is_not_found() {
    let (db, _temp_file) = test_db().await;
    let result = db.record_relay_attempt(&addr(9), true).await;
    assert!(matches!(
        result,
        Err(Error::Database(DatabaseError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_blacklist_and_reset() {
    let (db, _temp_file) = test_db().await;
    db.upsert_relay(&addr(5), None).await.unwrap();
    for _ in 0..25 {
        db.record_relay_attempt(&addr(5), false).await.unwrap();
    }

    db.set_relay_blacklisted(&addr(5), true).await.unwrap();
    let relays = db.list_relays().await.unwrap();
    assert!(relays[0].blacklisted);

    assert_eq!(db.reset_relay_stats().await.unwrap(), 1);
    let row = db.get_relay(&addr(5)).await.unwrap().unwrap();
    assert_eq!(row.used_total, 0);
    assert_eq!(row.failed_total, 0);
    assert_eq!(row.fail_ratio, 0.0);
    assert!(row.blacklisted, "reset must not clear the blacklist");

    assert!(db.set_relay_blacklisted(&addr(6), true).await.is_err());
}
