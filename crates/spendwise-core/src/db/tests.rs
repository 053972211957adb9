//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn insert(db: &Database, user_id: i64, d: NaiveDate, desc: &str, amount: f64) -> i64 {
        match db
            .insert_transaction(user_id, None, &NewTransaction::new(d, desc, amount), None)
            .unwrap()
        {
            TransactionInsertResult::Inserted(id) => id,
            TransactionInsertResult::Duplicate(id) => panic!("unexpected duplicate {}", id),
        }
    }

    fn suggestion(category: &str) -> CacheSuggestion {
        CacheSuggestion {
            category: category.to_string(),
            note: Some("Streaming".to_string()),
            confidence: Confidence::High,
            explanation: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_accounts(1).unwrap().is_empty());
        assert!(db.list_user_transactions(1).unwrap().is_empty());
    }

    #[test]
    fn test_account_upsert_is_idempotent() {
        let db = Database::in_memory().unwrap();

        let id = db.upsert_account(1, "CHEQUING", "1234").unwrap();
        let id2 = db.upsert_account(1, "CHEQUING", "1234").unwrap();
        assert_eq!(id, id2);

        // Same card number for another user is a different account
        let other = db.upsert_account(2, "CHEQUING", "1234").unwrap();
        assert_ne!(id, other);

        let accounts = db.list_accounts(1).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "CHEQUING •••• 1234");
        assert_eq!(accounts[0].currency, "CAD");
    }

    #[test]
    fn test_create_account() {
        let db = Database::in_memory().unwrap();

        let account = db
            .create_account(
                1,
                &NewAccount {
                    institution: Some("RBC".to_string()),
                    account_type: Some("Visa".to_string()),
                    number_last4: Some("4510 1234 5678 9012".to_string()),
                    currency: "usd".to_string(),
                    ..NewAccount::named("  Travel card ")
                },
            )
            .unwrap();
        assert_eq!(account.name, "Travel card");
        assert_eq!(account.institution.as_deref(), Some("RBC"));
        assert_eq!(account.number_last4.as_deref(), Some("9012"));
        assert_eq!(account.currency, "USD");

        assert!(db.get_account(2, account.id).unwrap().is_none());
        assert!(matches!(
            db.create_account(1, &NewAccount::named(" ")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.create_account(
                1,
                &NewAccount {
                    currency: "dollars".to_string(),
                    ..NewAccount::named("Cash")
                }
            ),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_insert_derives_merchant_key_and_expense_flag() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "MCDONALD'S #400", -12.5);

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.merchant_key, "MCDONALDS");
        assert!(tx.is_expense);
        assert_eq!(tx.category, UNCATEGORIZED);
        assert_eq!(tx.category_source, CategorySource::Uncategorized);

        let income = insert(&db, 1, date(2025, 1, 6), "PAYROLL DEPOSIT", 2000.0);
        assert!(!db.get_transaction(1, income).unwrap().unwrap().is_expense);
    }

    #[test]
    fn test_insert_with_category_counts_as_user_choice() {
        let db = Database::in_memory().unwrap();
        let mut new_tx = NewTransaction::new(date(2025, 1, 5), "CORNER STORE", -4.0);
        new_tx.category = Some("Groceries".to_string());

        let id = match db.insert_transaction(1, None, &new_tx, None).unwrap() {
            TransactionInsertResult::Inserted(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, "Groceries");
        assert_eq!(tx.category_source, CategorySource::User);
    }

    #[test]
    fn test_import_hash_deduplicates() {
        let db = Database::in_memory().unwrap();
        let new_tx = NewTransaction::new(date(2025, 1, 5), "NETFLIX.COM", -15.99);

        let first = db.insert_transaction(1, None, &new_tx, Some("abc")).unwrap();
        let second = db.insert_transaction(1, None, &new_tx, Some("abc")).unwrap();

        let TransactionInsertResult::Inserted(id) = first else {
            panic!("first insert should succeed");
        };
        assert_eq!(second, TransactionInsertResult::Duplicate(id));
        assert_eq!(db.list_user_transactions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_transactions_are_user_scoped() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "NETFLIX.COM", -15.99);

        assert!(db.get_transaction(2, id).unwrap().is_none());
        assert!(db.get_transactions_by_ids(2, &[id]).unwrap().is_empty());
        assert_eq!(db.get_transactions_by_ids(1, &[id, 9999]).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_ai_category_never_overwrites_user() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "NETFLIX.COM", -15.99);

        db.set_transaction_category(1, id, "Shopping").unwrap();
        let changed = db
            .apply_ai_category(1, id, "Subscription", Some("Netflix"))
            .unwrap();
        assert!(!changed);

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, "Shopping");
        assert_eq!(tx.category_source, CategorySource::User);
        assert!(tx.note_user.is_none());
    }

    #[test]
    fn test_apply_ai_category_keeps_existing_note() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "NETFLIX.COM", -15.99);
        db.set_transaction_note(1, id, Some("family plan")).unwrap();

        assert!(db
            .apply_ai_category(1, id, "Subscription", Some("Netflix"))
            .unwrap());

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, "Subscription");
        assert_eq!(tx.category_source, CategorySource::Ai);
        assert_eq!(tx.note_user.as_deref(), Some("family plan"));

        // Re-applying is idempotent
        assert!(db
            .apply_ai_category(1, id, "Subscription", Some("Other note"))
            .unwrap());
        let again = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(again.note_user.as_deref(), Some("family plan"));
    }

    #[test]
    fn test_update_transaction_flips_expense_flag() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "REFUND", -20.0);

        let updated = db
            .update_transaction(
                1,
                id,
                &TransactionUpdate {
                    date: Some(date(2025, 1, 7)),
                    amount: Some(20.0),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.date, date(2025, 1, 7));
        assert!(!updated.is_expense);
    }

    #[test]
    fn test_search_and_count_with_filter() {
        let db = Database::in_memory().unwrap();
        insert(&db, 1, date(2025, 1, 5), "NETFLIX.COM", -15.99);
        insert(&db, 1, date(2025, 1, 10), "LOBLAWS 123", -80.0);
        insert(&db, 1, date(2025, 2, 1), "NETFLIX.COM", -15.99);
        insert(&db, 2, date(2025, 1, 5), "NETFLIX.COM", -15.99);

        let filter = TransactionFilter::new().search(Some("netflix"));
        assert_eq!(db.count_transactions(1, &filter).unwrap(), 2);

        let page = db.search_transactions(1, &filter, 1, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].date, date(2025, 2, 1));

        let january = TransactionFilter::new()
            .date_range(Some((date(2025, 1, 1), date(2025, 1, 31))));
        let rows = db.filtered_transactions(1, &january).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].date <= rows[1].date);
    }

    #[test]
    fn test_merchant_cache_upsert_single_row() {
        let db = Database::in_memory().unwrap();

        let first = db
            .put_cached_merchant(1, "NETFLIXCOM", &suggestion("Subscription"))
            .unwrap();
        let second = db
            .put_cached_merchant(1, "NETFLIXCOM", &suggestion("Shopping"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.suggested_category, "Shopping");
        assert!(second.last_used_at >= first.last_used_at);
        assert_eq!(db.list_cached_merchants(1).unwrap().len(), 1);
        assert!(db.get_cached_merchant(2, "NETFLIXCOM").unwrap().is_none());
    }

    #[test]
    fn test_merchant_cache_touch_is_monotonic() {
        let db = Database::in_memory().unwrap();
        assert!(!db.touch_cached_merchant(1, "NETFLIXCOM").unwrap());

        db.put_cached_merchant(1, "NETFLIXCOM", &suggestion("Subscription"))
            .unwrap();

        // Force a future timestamp; a touch must not move it backwards
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE merchant_cache SET last_used_at = '2999-01-01T00:00:00.000000Z'",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(db.touch_cached_merchant(1, "NETFLIXCOM").unwrap());
        let entry = db.get_cached_merchant(1, "NETFLIXCOM").unwrap().unwrap();
        assert_eq!(entry.last_used_at.format("%Y").to_string(), "2999");
    }

    #[test]
    fn test_categories_seeded_on_first_read() {
        let db = Database::in_memory().unwrap();
        let categories = db.list_categories(1).unwrap();

        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len() + 1);
        let last = categories.last().unwrap();
        assert_eq!(last.name, SYSTEM_CATEGORY);
        assert!(last.is_system);

        // Second read doesn't seed again
        assert_eq!(db.list_categories(1).unwrap().len(), categories.len());
        assert_eq!(
            db.resolve_category_name(1, "eating out").unwrap().as_deref(),
            Some("Eating Out")
        );
        assert!(db.resolve_category_name(1, "Crypto").unwrap().is_none());
    }

    #[test]
    fn test_create_category_rejects_duplicates_and_reserved() {
        let db = Database::in_memory().unwrap();

        let pets = db.create_category(1, "  Pets ", Some("#123456")).unwrap();
        assert_eq!(pets.name, "Pets");
        assert_eq!(pets.sort_order, DEFAULT_CATEGORIES.len() as i64 + 1);

        assert!(matches!(
            db.create_category(1, "pets", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.create_category(1, "uncategorized", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.create_category(1, "", None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rename_category_cascades() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "UBER EATS", -30.0);
        db.apply_ai_category(1, id, "Eating Out", None).unwrap();
        db.put_cached_merchant(1, "UBEREATS", &suggestion("Eating Out"))
            .unwrap();

        let eating_out = db
            .list_categories(1)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Eating Out")
            .unwrap();
        let renamed = db.rename_category(1, eating_out.id, "Restaurants").unwrap();
        assert_eq!(renamed.name, "Restaurants");

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, "Restaurants");
        let cached = db.get_cached_merchant(1, "UBEREATS").unwrap().unwrap();
        assert_eq!(cached.suggested_category, "Restaurants");
    }

    #[test]
    fn test_system_category_is_protected() {
        let db = Database::in_memory().unwrap();
        let other = db
            .list_categories(1)
            .unwrap()
            .into_iter()
            .find(|c| c.is_system)
            .unwrap();

        assert!(matches!(
            db.rename_category(1, other.id, "Misc"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.delete_category(1, other.id),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.delete_category(1, 99_999),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_category_resets_transactions_keeps_cache() {
        let db = Database::in_memory().unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "LOBLAWS 123", -80.0);
        db.set_transaction_category(1, id, "Groceries").unwrap();
        db.put_cached_merchant(1, "LOBLAWS", &suggestion("Groceries"))
            .unwrap();

        let groceries = db
            .list_categories(1)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Groceries")
            .unwrap();
        assert_eq!(db.delete_category(1, groceries.id).unwrap(), 1);

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, UNCATEGORIZED);
        assert_eq!(tx.category_source, CategorySource::Uncategorized);
        assert!(db.get_cached_merchant(1, "LOBLAWS").unwrap().is_some());
    }

    #[test]
    fn test_reorder_categories() {
        let db = Database::in_memory().unwrap();
        let categories = db.list_categories(1).unwrap();
        let id_of = |name: &str| categories.iter().find(|c| c.name == name).unwrap().id;
        let other = id_of("Other");

        let reordered = db
            .reorder_categories(1, &[id_of("Income"), other, id_of("Groceries")])
            .unwrap();
        assert_eq!(reordered[0].name, "Income");
        let groceries = reordered.iter().find(|c| c.name == "Groceries").unwrap();
        assert_eq!(groceries.sort_order, 3);
        assert_eq!(reordered.last().unwrap().name, "Other");

        assert!(matches!(
            db.reorder_categories(1, &[id_of("Rent"), 9999]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.reorder_categories(1, &[id_of("Rent"), id_of("Rent")]),
            Err(Error::Validation(_))
        ));
        assert!(db.reorder_categories(2, &[id_of("Rent")]).is_err());
        assert!(db.reorder_categories(1, &[]).is_err());
    }

    #[test]
    fn test_reset_categories() {
        let db = Database::in_memory().unwrap();
        db.create_category(1, "Pets", None).unwrap();
        let id = insert(&db, 1, date(2025, 1, 5), "PET SMART", -40.0);
        db.set_transaction_category(1, id, "Pets").unwrap();

        let categories = db.reset_categories(1).unwrap();
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len() + 1);
        assert!(categories.iter().all(|c| c.name != "Pets"));

        let tx = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(tx.category, UNCATEGORIZED);
        assert_eq!(tx.category_source, CategorySource::Uncategorized);
    }

    #[test]
    fn test_recurring_snapshot_roundtrip_and_invalidation() {
        let db = Database::in_memory().unwrap();
        assert!(db.load_recurring_snapshot(1).unwrap().is_none());

        let group = RecurringGroup {
            merchant_key: "NETFLIXCOM".to_string(),
            merchant_name: "NETFLIX.COM".to_string(),
            category: "Subscription".to_string(),
            frequency: Frequency::Monthly,
            typical_amount: 15.99,
            monthly_amount: 15.99,
            amount_variance: AmountVariance::Stable,
            confidence: Confidence::High,
            transaction_count: 3,
            interval_days: Some(30.5),
            first_transaction_date: date(2025, 9, 26),
            last_transaction_date: date(2025, 11, 26),
            next_expected_date: Some(date(2025, 12, 26)),
            transaction_ids: vec![1, 2, 3],
            sample_descriptions: vec!["NETFLIX.COM".to_string()],
        };
        let generation = db.recurring_generation(1).unwrap();
        assert!(db
            .save_recurring_snapshot(1, generation, "cfg", std::slice::from_ref(&group))
            .unwrap());

        let snapshot = db.load_recurring_snapshot(1).unwrap().unwrap();
        assert_eq!(snapshot.config_key, "cfg");
        assert_eq!(snapshot.groups, vec![group]);

        // Any insert makes it stale
        insert(&db, 1, date(2025, 12, 1), "LOBLAWS", -10.0);
        assert!(db.load_recurring_snapshot(1).unwrap().is_none());
    }

    #[test]
    fn test_recurring_snapshot_replaced_wholesale() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO recurring_cache (user_id, merchant_key, merchant_name, category, frequency,
                typical_amount, monthly_amount, amount_variance, confidence, transaction_count,
                first_transaction_date, last_transaction_date, transaction_ids, sample_descriptions)
             VALUES (?, 'OLD', 'OLD', 'Other', 'monthly', 1, 1, 'stable', 'low', 3,
                '2025-01-01', '2025-03-01', '[]', '[]')",
            params![1],
        )
        .unwrap();
        drop(conn);

        let generation = db.recurring_generation(1).unwrap();
        assert!(db.save_recurring_snapshot(1, generation, "cfg", &[]).unwrap());
        let snapshot = db.load_recurring_snapshot(1).unwrap().unwrap();
        assert!(snapshot.groups.is_empty());

        db.invalidate_recurring_snapshot(1).unwrap();
        assert!(db.load_recurring_snapshot(1).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_cache_writes_keep_one_row() {
        let db = Database::in_memory().unwrap();
        let categories = ["Subscription", "Shopping", "Other", "Utilities"];

        std::thread::scope(|scope| {
            for category in categories {
                let db = &db;
                scope.spawn(move || {
                    let mut last_seen = None;
                    for _ in 0..10 {
                        let stored = db
                            .put_cached_merchant(1, "NETFLIX", &suggestion(category))
                            .unwrap();
                        assert!(last_seen.map_or(true, |seen| stored.last_used_at >= seen));
                        last_seen = Some(stored.last_used_at);

                        assert!(db.touch_cached_merchant(1, "NETFLIX").unwrap());
                        let touched = db.get_cached_merchant(1, "NETFLIX").unwrap().unwrap();
                        assert!(last_seen.map_or(true, |seen| touched.last_used_at >= seen));
                        last_seen = Some(touched.last_used_at);
                    }
                });
            }
        });

        let entries = db.list_cached_merchants(1).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(categories.contains(&entries[0].suggested_category.as_str()));
        assert!(entries[0].last_used_at >= entries[0].created_at);
    }

    #[test]
    fn test_recurring_snapshot_not_saved_after_concurrent_insert() {
        let db = Database::in_memory().unwrap();
        insert(&db, 1, date(2025, 9, 26), "NETFLIX", -15.99);

        // A detection run reads the generation, then an insert lands mid-scan
        let generation = db.recurring_generation(1).unwrap();
        insert(&db, 1, date(2025, 10, 26), "NETFLIX", -15.99);

        assert!(!db.save_recurring_snapshot(1, generation, "cfg", &[]).unwrap());
        assert!(db.load_recurring_snapshot(1).unwrap().is_none());

        // A run that starts after the insert is stored
        let generation = db.recurring_generation(1).unwrap();
        assert!(db.save_recurring_snapshot(1, generation, "cfg", &[]).unwrap());
        assert!(db.load_recurring_snapshot(1).unwrap().is_some());

        // Invalidation bumps the generation for everyone else
        db.invalidate_recurring_snapshot(1).unwrap();
        assert_eq!(db.recurring_generation(1).unwrap(), generation + 1);
        assert!(db.load_recurring_snapshot(1).unwrap().is_none());
    }
}
