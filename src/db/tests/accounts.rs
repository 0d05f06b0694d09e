use super::test_db;

#[tokio::test]
async fn test_add_accounts_lowercases_and_ignores_known() {
    let (db, _temp_file) = test_db().await;

    let added = db
        .add_accounts(&["Alice".to_string(), " bob ".to_string()])
        .await
        .unwrap();
    assert_eq!(added, 2);

    let added = db
        .add_accounts(&["ALICE".to_string(), "carol".to_string()])
        .await
        .unwrap();
    assert_eq!(added, 1);

    assert_eq!(
        db.eligible_accounts().await.unwrap(),
        vec!["alice", "bob", "carol"]
    );
    assert!(db.has_account("Alice").await.unwrap());
    assert!(!db.has_account("dave").await.unwrap());
}

#[tokio::test]
async fn test_blacklisted_accounts_are_not_eligible() {
    let (db, _temp_file) = test_db().await;
    db.add_accounts(&["alice".to_string(), "bob".to_string()])
        .await
        .unwrap();

    db.set_account_blacklisted("bob", true).await.unwrap();
    assert_eq!(db.eligible_accounts().await.unwrap(), vec!["alice"]);
    // Still known, so "only new" lists skip it
    assert!(db.has_account("bob").await.unwrap());

    db.set_account_blacklisted("bob", false).await.unwrap();
    assert_eq!(db.eligible_accounts().await.unwrap(), vec!["alice", "bob"]);

    assert!(db.set_account_blacklisted("nobody", true).await.is_err());
}
