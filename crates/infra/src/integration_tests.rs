//! Integration tests for the full ledger pipeline.
//!
//! Tests: Command → LedgerEngine → LedgerStore → EventBus
//!
//! Verifies:
//! - Operations keep batches, totals and the transaction log consistent
//! - Conditional writes survive concurrent writers without losing stock
//! - Transfers on single-key stores can be resumed or compensated

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use stockledger_catalog::{
    InMemoryProductCatalog, InMemoryWarehouseRegistry, NewProduct, NewWarehouse, WarehouseCategory,
    WarehouseStatus,
};
use stockledger_core::{ActorName, BatchCode, ProductName, WarehouseId};
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockledger_ledger::{
    EditBatch, LedgerEvent, StockIn, StockOut, TransactionType, Transfer, TransferStatus,
};

use crate::config::{DuplicateSubmissionPolicy, LedgerConfig};
use crate::engine::{HistoryFilter, LedgerEngine};
use crate::error::LedgerError;
use crate::maintenance::delete_warehouse_cascade;
use crate::store::{InMemoryLedgerStore, TransactionLog, TransferJournal};

type Bus = Arc<InMemoryEventBus<EventEnvelope<LedgerEvent>>>;
type Engine = LedgerEngine<Arc<InMemoryLedgerStore>, Bus>;

struct Fixture {
    engine: Arc<Engine>,
    store: Arc<InMemoryLedgerStore>,
    bus: Bus,
    registry: Arc<InMemoryWarehouseRegistry>,
    catalog: Arc<InMemoryProductCatalog>,
}

fn w(id: &str) -> WarehouseId {
    WarehouseId::parse(id).unwrap()
}

fn code(c: &str) -> BatchCode {
    BatchCode::parse(c).unwrap()
}

fn product(name: &str) -> ProductName {
    ProductName::parse(name).unwrap()
}

fn actor() -> ActorName {
    ActorName::parse("ana").unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn fixture_with(store: InMemoryLedgerStore, config: LedgerConfig) -> Fixture {
    let store = Arc::new(store);
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let registry = Arc::new(InMemoryWarehouseRegistry::new());
    let catalog = Arc::new(InMemoryProductCatalog::new());

    for (id, name) in [("W1", "Main Store"), ("W2", "Kitchen")] {
        registry
            .create(NewWarehouse {
                id: w(id),
                name: name.to_string(),
                location: "Downtown".to_string(),
                category: WarehouseCategory::Storage,
                status: WarehouseStatus::Active,
            })
            .unwrap();
    }
    for (name, threshold) in [("Vanilla Syrup", Some(10)), ("Milk", None)] {
        catalog
            .upsert(NewProduct {
                name: product(name),
                category: "Beverage".to_string(),
                unit: "bottle".to_string(),
                low_stock_threshold: threshold,
            })
            .unwrap();
    }

    let engine = Arc::new(LedgerEngine::new(
        store.clone(),
        bus.clone(),
        registry.clone(),
        catalog.clone(),
        config,
    ));
    Fixture {
        engine,
        store,
        bus,
        registry,
        catalog,
    }
}

fn fixture() -> Fixture {
    fixture_with(InMemoryLedgerStore::new(), LedgerConfig::default())
}

fn stock_in(warehouse: &str, c: &str, name: &str, quantity: i64) -> StockIn {
    StockIn {
        warehouse_id: w(warehouse),
        product: product(name),
        code: code(c),
        quantity,
        expiry_date: NaiveDate::from_ymd_opt(2025, 1, 31),
        reason: "New Supply".to_string(),
        actor: actor(),
        occurred_at: at(1, 9),
    }
}

fn stock_out(warehouse: &str, c: &str, name: &str, quantity: i64) -> StockOut {
    StockOut {
        warehouse_id: w(warehouse),
        product: product(name),
        code: code(c),
        quantity,
        reason: "Used".to_string(),
        actor: actor(),
        occurred_at: at(2, 10),
    }
}

fn transfer(c: &str, quantity: i64, occurred_at: DateTime<Utc>) -> Transfer {
    Transfer {
        from: w("W1"),
        to: w("W2"),
        product: product("Vanilla Syrup"),
        code: code(c),
        quantity,
        reason: "Transfer".to_string(),
        actor: actor(),
        occurred_at,
    }
}

#[test]
fn stock_in_creates_batch_and_record() {
    let f = fixture();
    let tx = f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();

    assert_eq!(tx.kind, TransactionType::StockIn);
    assert_eq!(tx.quantity, 50);
    assert_eq!(tx.unit, "bottle");
    assert_eq!(tx.sequence, 1);

    let batches = f.engine.batches(&w("W1")).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].code, code("B001"));
    assert_eq!(batches[0].quantity, 50);
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 50);
    assert_eq!(f.engine.transactions(&w("W1")).unwrap().len(), 1);
}

#[test]
fn stock_in_rejects_existing_code() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();

    let err = f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateBatch { .. }));
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 50);

    // Codes are only unique per warehouse.
    f.engine.stock_in(stock_in("W2", "B001", "Vanilla Syrup", 5)).unwrap();
}

#[test]
fn stock_in_requires_known_warehouse_and_product() {
    let f = fixture();
    let err = f.engine.stock_in(stock_in("W9", "B001", "Vanilla Syrup", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let err = f.engine.stock_in(stock_in("W1", "B001", "Oat Milk", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert!(f.store.transactions(&w("W1")).unwrap().is_empty());
}

#[test]
fn stock_out_debits_and_rejects_overdraw() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();

    let tx = f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 20)).unwrap();
    assert_eq!(tx.kind, TransactionType::StockOut);
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 30);

    let err = f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 40)).unwrap_err();
    match err {
        LedgerError::InsufficientStock {
            available,
            requested,
        } => {
            assert_eq!(available, 30);
            assert_eq!(requested, 40);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 30);
    assert_eq!(f.engine.transactions(&w("W1")).unwrap().len(), 2);
}

#[test]
fn stock_out_to_zero_keeps_record_but_hides_it() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();
    f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 5)).unwrap();

    assert_eq!(f.engine.batches(&w("W1")).unwrap().len(), 1);
    assert!(f.engine.held_batches(&w("W1")).unwrap().is_empty());
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 0);
}

#[test]
fn stock_out_of_other_product_is_not_found() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();

    let err = f.engine.stock_out(stock_out("W1", "B001", "Milk", 1)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    let err = f.engine.stock_out(stock_out("W1", "B404", "Milk", 1)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn transfer_moves_stock_and_links_records() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();

    let receipt = f.engine.transfer(transfer("B001", 30, at(3, 14))).unwrap();
    assert_eq!(receipt.transfer_out.kind, TransactionType::TransferOut);
    assert_eq!(receipt.transfer_in.kind, TransactionType::TransferIn);
    assert_eq!(receipt.transfer_out.quantity, 30);
    assert_eq!(receipt.transfer_in.quantity, 30);
    assert_eq!(receipt.transfer_out.counterpart_warehouse, Some(w("W2")));
    assert_eq!(receipt.transfer_in.counterpart_warehouse, Some(w("W1")));
    assert_eq!(receipt.transfer_out.display_reason(), "Transfer OUT → W2");

    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 0);
    let moved = f.engine.batch(&w("W2"), &code("B001")).unwrap();
    assert_eq!(moved.quantity, 30);
    assert_eq!(moved.product, product("Vanilla Syrup"));
    assert_eq!(moved.expiry_date, NaiveDate::from_ymd_opt(2025, 1, 31));
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 0);
    assert_eq!(f.engine.total_items(&w("W2")).unwrap(), 30);
}

#[test]
fn transfer_merges_into_existing_destination_batch() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();
    f.engine.stock_in(stock_in("W2", "B001", "Vanilla Syrup", 4)).unwrap();

    f.engine.transfer(transfer("B001", 10, at(3, 14))).unwrap();
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 20);
    assert_eq!(f.engine.batch(&w("W2"), &code("B001")).unwrap().quantity, 14);
    assert_eq!(f.engine.batches(&w("W2")).unwrap().len(), 1);
}

#[test]
fn transfer_refuses_to_merge_different_product() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();
    f.engine.stock_in(stock_in("W2", "B001", "Milk", 4)).unwrap();

    let err = f.engine.transfer(transfer("B001", 10, at(3, 14))).unwrap_err();
    assert!(matches!(err, LedgerError::Invariant(_)));
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 30);
}

#[test]
fn transfer_validation_and_overdraw_write_nothing() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();

    let mut same = transfer("B001", 1, at(3, 14));
    same.to = w("W1");
    assert!(matches!(f.engine.transfer(same).unwrap_err(), LedgerError::Validation(_)));

    let err = f.engine.transfer(transfer("B001", 6, at(3, 14))).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { available: 5, .. }));
    assert_eq!(f.store.transactions(&w("W1")).unwrap().len(), 1);
    assert!(f.store.transactions(&w("W2")).unwrap().is_empty());
}

#[test]
fn edit_sets_quantity_and_records_previous() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();

    let tx = f
        .engine
        .edit_batch(EditBatch {
            warehouse_id: w("W1"),
            code: code("B001"),
            quantity: 42,
            expiry_date: NaiveDate::from_ymd_opt(2025, 6, 30),
            reason: "Recount".to_string(),
            actor: actor(),
            occurred_at: at(4, 8),
        })
        .unwrap();

    assert_eq!(tx.kind, TransactionType::Edit);
    assert_eq!(tx.quantity, 42);
    assert_eq!(tx.previous_quantity, Some(50));
    let batch = f.engine.batch(&w("W1"), &code("B001")).unwrap();
    assert_eq!(batch.quantity, 42);
    assert_eq!(batch.expiry_date, NaiveDate::from_ymd_opt(2025, 6, 30));
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 42);
}

#[test]
fn low_stock_alerts_each_batch_of_short_product() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 6)).unwrap();
    f.engine.stock_in(stock_in("W1", "B002", "Vanilla Syrup", 4)).unwrap();
    f.engine.stock_in(stock_in("W1", "M001", "Milk", 11)).unwrap();

    let alerts = f.engine.low_stock().evaluate(Some(&w("W1"))).unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.product == product("Vanilla Syrup")));
    assert!(alerts.iter().all(|a| a.total_quantity == 10 && a.threshold == 10));

    let shortages = f.engine.low_stock().shortages(None).unwrap();
    assert_eq!(shortages.len(), 1);
    assert_eq!(shortages[0].codes.len(), 2);
}

#[test]
fn low_stock_uses_default_threshold_and_ignores_empty_batches() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "M001", "Milk", 10)).unwrap();
    f.engine.stock_in(stock_in("W1", "M002", "Milk", 3)).unwrap();
    f.engine.stock_out(stock_out("W1", "M002", "Milk", 3)).unwrap();

    let alerts = f.engine.low_stock().evaluate(None).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].code, code("M001"));
    assert_eq!(alerts[0].threshold, 10);

    f.catalog.set_threshold(&product("Milk"), Some(5)).unwrap();
    assert!(f.engine.low_stock().evaluate(None).unwrap().is_empty());

    let err = f.engine.low_stock().evaluate(Some(&w("W9"))).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn history_is_newest_first_and_filterable() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();
    let mut april = stock_in("W2", "B002", "Milk", 5);
    april.occurred_at = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
    f.engine.stock_in(april).unwrap();
    f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1)).unwrap();

    let all = f.engine.history(HistoryFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].warehouse_id, w("W2"));
    assert!(all.windows(2).all(|p| p[0].timestamp >= p[1].timestamp));

    let march = f
        .engine
        .history(HistoryFilter {
            year: Some(2024),
            month: Some(3),
        })
        .unwrap();
    assert_eq!(march.len(), 2);

    let err = f
        .engine
        .history(HistoryFilter {
            year: None,
            month: Some(13),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn notifications_follow_commits() {
    let f = fixture();
    let sub = f.bus.subscribe();

    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();
    f.engine.transfer(transfer("B001", 10, at(3, 14))).unwrap();
    let _ = f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 500));

    let mut kinds = Vec::new();
    while let Ok(envelope) = sub.recv_timeout(Duration::from_millis(50)) {
        if let LedgerEvent::TransactionRecorded { transaction } = envelope.payload() {
            assert_eq!(envelope.sequence_number(), transaction.sequence);
            kinds.push(transaction.kind);
        }
    }
    assert_eq!(
        kinds,
        vec![
            TransactionType::StockIn,
            TransactionType::TransferOut,
            TransactionType::TransferIn
        ]
    );
}

#[test]
fn concurrent_stock_out_never_overdraws() {
    let f = fixture_with(
        InMemoryLedgerStore::new(),
        LedgerConfig {
            max_conflict_retries: 64,
            ..LedgerConfig::default()
        },
    );
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 100)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = f.engine.clone();
            std::thread::spawn(move || {
                let mut ok = 0;
                for _ in 0..20 {
                    if engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1)).is_ok() {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();
    let succeeded: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(succeeded, 100);
    let batch = f.engine.batch(&w("W1"), &code("B001")).unwrap();
    assert_eq!(batch.quantity, 0);
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 0);
    // One stock-in plus one record per successful issue.
    assert_eq!(f.store.transaction_count(&w("W1")).unwrap(), 101);
}

#[test]
fn concurrent_transfers_conserve_stock() {
    let f = fixture_with(
        InMemoryLedgerStore::new(),
        LedgerConfig {
            max_conflict_retries: 64,
            ..LedgerConfig::default()
        },
    );
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 40)).unwrap();

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let engine = f.engine.clone();
            std::thread::spawn(move || {
                for i in 0..10u32 {
                    let when = Utc.with_ymd_and_hms(2024, 3, 3, 10 + t, i, 0).unwrap();
                    engine.transfer(transfer("B001", 1, when)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let source = f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity;
    let destination = f.engine.batch(&w("W2"), &code("B001")).unwrap().quantity;
    assert_eq!(source, 0);
    assert_eq!(destination, 40);
}

#[test]
fn single_key_transfer_runs_as_saga() {
    let f = fixture_with(InMemoryLedgerStore::single_key(), LedgerConfig::default());
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();

    let receipt = f.engine.transfer(transfer("B001", 30, at(3, 14))).unwrap();
    let intent = f.engine.transfer_intent(&receipt.intent_id).unwrap();
    assert_eq!(intent.status, TransferStatus::Completed);
    assert!(f.engine.pending_transfers().unwrap().is_empty());
    assert_eq!(f.engine.batch(&w("W2"), &code("B001")).unwrap().quantity, 30);
}

#[test]
fn failed_credit_reports_partial_transfer_then_resumes() {
    let f = fixture_with(InMemoryLedgerStore::single_key(), LedgerConfig::default());
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();
    let sub = f.bus.subscribe();

    f.store.fail_commits_for(Some(w("W2")));
    let err = f.engine.transfer(transfer("B001", 12, at(3, 14))).unwrap_err();
    let intent_id = match err {
        LedgerError::PartialTransfer {
            intent_id, quantity, ..
        } => {
            assert_eq!(quantity, 12);
            intent_id
        }
        other => panic!("unexpected error: {other:?}"),
    };

    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 18);
    assert!(f.engine.batch(&w("W2"), &code("B001")).is_err());
    let open = f.engine.pending_transfers().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, TransferStatus::Debited);
    assert!(open[0].error.is_some());

    let stalled = std::iter::from_fn(|| sub.recv_timeout(Duration::from_millis(50)).ok())
        .any(|env| matches!(env.payload(), LedgerEvent::TransferStalled { .. }));
    assert!(stalled);

    f.store.fail_commits_for(None);
    let resumed = f.engine.resume_transfer(&intent_id).unwrap();
    assert_eq!(resumed.status, TransferStatus::Completed);
    assert_eq!(f.engine.batch(&w("W2"), &code("B001")).unwrap().quantity, 12);
    assert!(f.engine.pending_transfers().unwrap().is_empty());

    let err = f.engine.resume_transfer(&intent_id).unwrap_err();
    assert!(matches!(err, LedgerError::Invariant(_)));
}

#[test]
fn failed_credit_can_be_compensated() {
    let f = fixture_with(InMemoryLedgerStore::single_key(), LedgerConfig::default());
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();

    f.store.fail_commits_for(Some(w("W2")));
    let err = f.engine.transfer(transfer("B001", 12, at(3, 14))).unwrap_err();
    let LedgerError::PartialTransfer { intent_id, .. } = err else {
        panic!("expected partial transfer");
    };

    let compensated = f.engine.compensate_transfer(&intent_id).unwrap();
    assert_eq!(compensated.status, TransferStatus::Compensated);
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 30);

    let log = f.engine.transactions(&w("W1")).unwrap();
    assert_eq!(log[0].kind, TransactionType::TransferIn);
    assert_eq!(log[0].reason, "Transfer reversal");
    assert_eq!(log[0].counterpart_warehouse, Some(w("W2")));
    assert!(f.store.transactions(&w("W2")).unwrap().is_empty());
}

#[test]
fn pending_intent_without_debit_is_cancelled() {
    let f = fixture_with(InMemoryLedgerStore::single_key(), LedgerConfig::default());
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();

    let source = f.engine.batch(&w("W1"), &code("B001")).unwrap();
    let intent = stockledger_ledger::TransferIntent::new(
        &transfer("B001", 5, at(5, 9)),
        &source,
        &source.unit,
        &source.category,
    );
    f.store.record_intent(&intent).unwrap();

    let settled = f.engine.resume_transfer(&intent.id).unwrap();
    assert_eq!(settled.status, TransferStatus::Cancelled);
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 30);
}

#[test]
fn duplicate_submissions_follow_policy() {
    let allow = fixture();
    allow.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();
    allow.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1)).unwrap();
    allow.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1)).unwrap();
    assert_eq!(allow.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 48);

    let reject = fixture_with(
        InMemoryLedgerStore::new(),
        LedgerConfig {
            duplicate_submissions: DuplicateSubmissionPolicy::Reject,
            ..LedgerConfig::default()
        },
    );
    reject.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 50)).unwrap();
    reject.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1)).unwrap();
    let err = reject
        .engine
        .stock_out(stock_out("W1", "B001", "Vanilla Syrup", 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateSubmission { .. }));
    assert_eq!(reject.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 49);
}

#[test]
fn purge_batch_only_removes_empty_batches() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();

    let err = f.engine.purge_batch(&w("W1"), &code("B001")).unwrap_err();
    assert!(matches!(err, LedgerError::Invariant(_)));

    f.engine.stock_out(stock_out("W1", "B001", "Vanilla Syrup", 5)).unwrap();
    let removed = f.engine.purge_batch(&w("W1"), &code("B001")).unwrap();
    assert_eq!(removed.quantity, 0);
    assert!(f.engine.batches(&w("W1")).unwrap().is_empty());
    // History is kept.
    assert_eq!(f.engine.transactions(&w("W1")).unwrap().len(), 2);

    let err = f.engine.purge_batch(&w("W1"), &code("B001")).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn resync_rewrites_batches_but_not_history() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();
    f.engine.stock_in(stock_in("W2", "B009", "Vanilla Syrup", 5)).unwrap();

    f.catalog
        .upsert(NewProduct {
            name: product("Vanilla Syrup"),
            category: "Syrups".to_string(),
            unit: "litre".to_string(),
            low_stock_threshold: Some(10),
        })
        .unwrap();
    assert_eq!(f.engine.resync_product(&product("Vanilla Syrup")).unwrap(), 2);

    let batch = f.engine.batch(&w("W1"), &code("B001")).unwrap();
    assert_eq!(batch.unit, "litre");
    assert_eq!(batch.category, "Syrups");
    let log = f.engine.transactions(&w("W1")).unwrap();
    assert_eq!(log[0].unit, "bottle");
}

#[test]
fn cascade_delete_removes_ledger_and_registry_entry() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();
    f.engine.stock_in(stock_in("W2", "B002", "Milk", 5)).unwrap();

    let summary = delete_warehouse_cascade(&f.engine, &f.registry, &w("W1")).unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.transactions, 1);

    assert!(matches!(f.engine.batches(&w("W1")).unwrap_err(), LedgerError::NotFound(_)));
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), 0);
    assert_eq!(f.engine.history(HistoryFilter::default()).unwrap().len(), 1);

    let err = delete_warehouse_cascade(&f.engine, &f.registry, &w("W1")).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn stock_in_past_warehouse_capacity_is_rejected_and_store_stays_usable() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "A", "Vanilla Syrup", i64::MAX)).unwrap();

    let err = f.engine.stock_in(stock_in("W1", "B", "Vanilla Syrup", 1)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(f.engine.batches(&w("W1")).unwrap().len(), 1);
    assert_eq!(f.engine.total_items(&w("W1")).unwrap(), i64::MAX);

    let tx = f.engine.stock_in(stock_in("W2", "C", "Milk", 5)).unwrap();
    assert_eq!(tx.quantity, 5);
    assert_eq!(f.engine.total_items(&w("W2")).unwrap(), 5);
}

#[test]
fn transfer_merge_past_i64_max_writes_nothing() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 5)).unwrap();
    f.engine.stock_in(stock_in("W2", "B001", "Vanilla Syrup", i64::MAX)).unwrap();

    let err = f.engine.transfer(transfer("B001", 1, at(3, 14))).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(f.engine.batch(&w("W1"), &code("B001")).unwrap().quantity, 5);
    assert_eq!(f.engine.batch(&w("W2"), &code("B001")).unwrap().quantity, i64::MAX);
    assert_eq!(f.store.transactions(&w("W1")).unwrap().len(), 1);
}

#[test]
fn transfer_reason_goes_on_records_not_on_created_batch() {
    let f = fixture();
    f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", 30)).unwrap();

    let mut cmd = transfer("B001", 10, at(3, 14));
    cmd.reason = "Restock".to_string();
    let receipt = f.engine.transfer(cmd).unwrap();

    assert_eq!(receipt.transfer_out.reason, "Restock");
    assert_eq!(receipt.transfer_in.reason, "Restock");
    assert_eq!(f.engine.batch(&w("W2"), &code("B001")).unwrap().reason, "Transfer");
}

#[derive(Debug, Clone)]
enum Movement {
    Issue { warehouse: &'static str, quantity: i64 },
    Transfer { from: &'static str, to: &'static str, quantity: i64 },
}

fn movement() -> impl Strategy<Value = Movement> {
    prop_oneof![
        (prop_oneof![Just("W1"), Just("W2")], 1i64..30)
            .prop_map(|(warehouse, quantity)| Movement::Issue { warehouse, quantity }),
        (any::<bool>(), 1i64..30).prop_map(|(forward, quantity)| {
            let (from, to) = if forward { ("W1", "W2") } else { ("W2", "W1") };
            Movement::Transfer { from, to, quantity }
        }),
    ]
}

fn held_sum(f: &Fixture, warehouse: &str) -> i64 {
    f.engine
        .batches(&w(warehouse))
        .unwrap()
        .iter()
        .filter(|b| b.is_held())
        .map(|b| b.quantity)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Stock only leaves through stock-out; every batch stays non-negative
    /// and the stored totals match the batches after each step.
    #[test]
    fn random_movements_conserve_stock_on_both_store_kinds(
        single_key in any::<bool>(),
        initial in 1i64..120,
        movements in prop::collection::vec(movement(), 1..25),
    ) {
        let store = if single_key {
            InMemoryLedgerStore::single_key()
        } else {
            InMemoryLedgerStore::new()
        };
        let f = fixture_with(store, LedgerConfig::default());
        f.engine.stock_in(stock_in("W1", "B001", "Vanilla Syrup", initial)).unwrap();
        let mut issued = 0i64;

        for (step, movement) in movements.into_iter().enumerate() {
            let when = at(3, 10) + chrono::Duration::seconds(step as i64);
            match movement {
                Movement::Issue { warehouse, quantity } => {
                    let mut cmd = stock_out(warehouse, "B001", "Vanilla Syrup", quantity);
                    cmd.occurred_at = when;
                    if f.engine.stock_out(cmd).is_ok() {
                        issued += quantity;
                    }
                }
                Movement::Transfer { from, to, quantity } => {
                    let mut cmd = transfer("B001", quantity, when);
                    cmd.from = w(from);
                    cmd.to = w(to);
                    if let Err(err) = f.engine.transfer(cmd) {
                        prop_assert!(err.is_rejection(), "unexpected failure: {err}");
                    }
                }
            }

            for warehouse in ["W1", "W2"] {
                for batch in f.engine.batches(&w(warehouse)).unwrap() {
                    prop_assert!(batch.quantity >= 0);
                }
                prop_assert_eq!(f.engine.total_items(&w(warehouse)).unwrap(), held_sum(&f, warehouse));
            }
            prop_assert_eq!(held_sum(&f, "W1") + held_sum(&f, "W2"), initial - issued);
        }
        prop_assert!(f.engine.pending_transfers().unwrap().is_empty());
    }
}
