use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_core::{ExpectedVersion, ProductName, WarehouseId};
use stockledger_ledger::rules::apply_write;
use stockledger_ledger::transaction::newest_first;
use stockledger_ledger::{Batch, BatchKey, BatchWrite, Changeset, Transaction, TransactionId, TransferIntent};

use super::{Atomicity, BatchStore, LedgerStore, PurgeSummary, StoreError, TransactionLog, TransferJournal};

#[derive(Debug, Default)]
struct State {
    batches: BTreeMap<BatchKey, Batch>,
    totals: HashMap<WarehouseId, i64>,
    logs: HashMap<WarehouseId, Vec<Transaction>>,
    intents: BTreeMap<TransactionId, TransferIntent>,
}

/// Batches and warehouse totals a changeset would leave behind.
struct Staged {
    batches: BTreeMap<BatchKey, Batch>,
    totals: Vec<(WarehouseId, i64)>,
}

/// Sum of held quantities; `None` on overflow.
fn held_total<'a>(batches: impl Iterator<Item = &'a Batch>) -> Option<i64> {
    batches
        .filter(|b| b.is_held())
        .try_fold(0i64, |acc, b| acc.checked_add(b.quantity))
}

impl State {
    /// Check and compute every write without touching state.
    fn stage(&self, writes: &[BatchWrite]) -> Result<Staged, StoreError> {
        let mut staged: BTreeMap<BatchKey, Batch> = BTreeMap::new();
        for write in writes {
            let key = write.key();
            let current = staged.get(&key).or_else(|| self.batches.get(&key));
            let actual = current.map(|b| b.version);
            let expected = write.expected();
            if !expected.matches(actual) {
                return Err(StoreError::version_mismatch(&key, expected, actual));
            }
            let next = apply_write(current, write).map_err(|e| StoreError::from_write(&key, e))?;
            staged.insert(key, next);
        }
        Ok(Staged {
            totals: self.staged_totals(&staged)?,
            batches: staged,
        })
    }

    /// Held totals of every warehouse the staged batches touch, as they
    /// would be after the commit.
    fn staged_totals(&self, staged: &BTreeMap<BatchKey, Batch>) -> Result<Vec<(WarehouseId, i64)>, StoreError> {
        let touched: BTreeSet<&WarehouseId> = staged.keys().map(|k| &k.warehouse_id).collect();
        let mut totals = Vec::with_capacity(touched.len());
        for warehouse_id in touched {
            let existing = self
                .batches
                .iter()
                .filter(|(key, _)| &key.warehouse_id == warehouse_id && !staged.contains_key(*key))
                .map(|(_, b)| b);
            let incoming = staged.values().filter(|b| &b.warehouse_id == warehouse_id);
            let total = held_total(existing.chain(incoming)).ok_or_else(|| {
                StoreError::Rejected(format!("total items of warehouse '{warehouse_id}' would overflow"))
            })?;
            totals.push((warehouse_id.clone(), total));
        }
        Ok(totals)
    }

    fn apply(&mut self, staged: Staged, transactions: Vec<Transaction>) -> Vec<Transaction> {
        for (key, batch) in staged.batches {
            self.batches.insert(key, batch);
        }
        self.totals.extend(staged.totals);

        let mut stored = Vec::with_capacity(transactions.len());
        for mut tx in transactions {
            let log = self.logs.entry(tx.warehouse_id.clone()).or_default();
            tx.sequence = log.len() as u64 + 1;
            log.push(tx.clone());
            stored.push(tx);
        }
        stored
    }

    /// Only used after removals, which can't push a total past what was
    /// already accepted.
    fn recompute_total(&mut self, warehouse_id: &WarehouseId) {
        let batches = self.batches.values().filter(|b| &b.warehouse_id == warehouse_id);
        let total = held_total(batches).unwrap_or(i64::MAX);
        self.totals.insert(warehouse_id.clone(), total);
    }

    fn write_one(&mut self, write: BatchWrite) -> Result<Batch, StoreError> {
        let key = write.key();
        let staged = self.stage(std::slice::from_ref(&write))?;
        self.apply(staged, vec![]);
        self.batches
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))
    }
}

/// In-memory ledger store.
///
/// Every write takes one lock over the whole ledger, so commits are
/// serialized and multi-key changesets are atomic. [`InMemoryLedgerStore::single_key`]
/// builds a store that refuses multi-key changesets, which emulates a
/// document store and forces the engine onto its transfer saga.
///
/// Intended for tests/dev and single-process deployments.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    atomicity: Atomicity,
    #[cfg(test)]
    fail_commits_for: std::sync::Mutex<Option<WarehouseId>>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::with_atomicity(Atomicity::MultiKey)
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_key() -> Self {
        Self::with_atomicity(Atomicity::SingleKey)
    }

    fn with_atomicity(atomicity: Atomicity) -> Self {
        Self {
            state: RwLock::new(State::default()),
            atomicity,
            #[cfg(test)]
            fail_commits_for: std::sync::Mutex::new(None),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Make every later commit touching `warehouse_id` fail until cleared.
    #[cfg(test)]
    pub(crate) fn fail_commits_for(&self, warehouse_id: Option<WarehouseId>) {
        if let Ok(mut slot) = self.fail_commits_for.lock() {
            *slot = warehouse_id;
        }
    }

    #[cfg(test)]
    fn injected_fault(&self, changeset: &Changeset) -> Result<(), StoreError> {
        let target = self.fail_commits_for.lock().ok().and_then(|slot| slot.clone());
        match target {
            Some(w) if changeset.keys().iter().any(|k| k.warehouse_id == w) => {
                Err(StoreError::Backend(format!("injected fault writing to '{w}'")))
            }
            _ => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn injected_fault(&self, _changeset: &Changeset) -> Result<(), StoreError> {
        Ok(())
    }
}

impl BatchStore for InMemoryLedgerStore {
    fn batches(&self, warehouse_id: &WarehouseId) -> Result<Vec<Batch>, StoreError> {
        let state = self.read()?;
        Ok(state
            .batches
            .values()
            .filter(|b| &b.warehouse_id == warehouse_id)
            .cloned()
            .collect())
    }

    fn batch(&self, key: &BatchKey) -> Result<Option<Batch>, StoreError> {
        Ok(self.read()?.batches.get(key).cloned())
    }

    fn total_items(&self, warehouse_id: &WarehouseId) -> Result<i64, StoreError> {
        Ok(self.read()?.totals.get(warehouse_id).copied().unwrap_or(0))
    }

    fn upsert_quantity(&self, key: &BatchKey, delta: i64, seed: Option<Batch>) -> Result<Batch, StoreError> {
        self.write()?.write_one(BatchWrite::Adjust {
            key: key.clone(),
            expected: ExpectedVersion::Any,
            delta,
            seed,
        })
    }

    fn set_quantity(&self, key: &BatchKey, quantity: i64) -> Result<Batch, StoreError> {
        let mut state = self.write()?;
        let expiry_date = state
            .batches
            .get(key)
            .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))?
            .expiry_date;
        state.write_one(BatchWrite::Set {
            key: key.clone(),
            expected: ExpectedVersion::Any,
            quantity,
            expiry_date,
        })
    }

    fn purge_batch(&self, key: &BatchKey, expected: ExpectedVersion) -> Result<Batch, StoreError> {
        let mut state = self.write()?;
        let actual = state.batches.get(key).map(|b| b.version);
        if actual.is_none() {
            return Err(StoreError::NotFound(format!("batch '{key}'")));
        }
        if !expected.matches(actual) {
            return Err(StoreError::version_mismatch(key, expected, actual));
        }
        let removed = state
            .batches
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))?;
        state.recompute_total(&key.warehouse_id);
        Ok(removed)
    }

    fn refresh_product_attributes(
        &self,
        product: &ProductName,
        unit: &str,
        category: &str,
    ) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let mut changed = 0;
        for batch in state.batches.values_mut().filter(|b| &b.product == product) {
            if batch.unit != unit || batch.category != category {
                batch.unit = unit.to_string();
                batch.category = category.to_string();
                batch.version += 1;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl TransactionLog for InMemoryLedgerStore {
    fn transactions(&self, warehouse_id: &WarehouseId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.read()?.logs.get(warehouse_id).cloned().unwrap_or_default())
    }

    fn transaction_count(&self, warehouse_id: &WarehouseId) -> Result<u64, StoreError> {
        Ok(self.read()?.logs.get(warehouse_id).map_or(0, |l| l.len() as u64))
    }

    fn contains_transaction(&self, warehouse_id: &WarehouseId, id: &TransactionId) -> Result<bool, StoreError> {
        Ok(self
            .read()?
            .logs
            .get(warehouse_id)
            .is_some_and(|log| log.iter().any(|tx| &tx.id == id)))
    }

    fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut all: Vec<Transaction> = self.read()?.logs.values().flatten().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }
}

impl TransferJournal for InMemoryLedgerStore {
    fn record_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.intents.contains_key(&intent.id) {
            return Err(StoreError::AlreadyExists(format!("transfer '{}'", intent.id)));
        }
        state.intents.insert(intent.id.clone(), intent.clone());
        Ok(())
    }

    fn save_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let slot = state
            .intents
            .get_mut(&intent.id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer '{}'", intent.id)))?;
        *slot = intent.clone();
        Ok(())
    }

    fn load_intent(&self, id: &TransactionId) -> Result<Option<TransferIntent>, StoreError> {
        Ok(self.read()?.intents.get(id).cloned())
    }

    fn open_intents(&self) -> Result<Vec<TransferIntent>, StoreError> {
        let mut open: Vec<TransferIntent> = self
            .read()?
            .intents
            .values()
            .filter(|i| i.status.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn atomicity(&self) -> Atomicity {
        self.atomicity
    }

    fn commit(&self, changeset: Changeset) -> Result<Vec<Transaction>, StoreError> {
        if self.atomicity == Atomicity::SingleKey && changeset.keys().len() > 1 {
            return Err(StoreError::Backend(format!(
                "single-key store cannot commit {} batches atomically",
                changeset.keys().len()
            )));
        }
        self.injected_fault(&changeset)?;

        let mut state = self.write()?;
        let staged = state.stage(&changeset.writes)?;
        Ok(state.apply(staged, changeset.transactions))
    }

    fn purge_warehouse(&self, warehouse_id: &WarehouseId) -> Result<PurgeSummary, StoreError> {
        let mut state = self.write()?;
        let before = state.batches.len();
        state.batches.retain(|key, _| &key.warehouse_id != warehouse_id);
        let batches = before - state.batches.len();
        state.totals.remove(warehouse_id);
        let transactions = state.logs.remove(warehouse_id).map_or(0, |l| l.len());
        Ok(PurgeSummary {
            batches,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use stockledger_core::{ActorName, BatchCode};

    use super::*;

    fn key(w: &str, c: &str) -> BatchKey {
        BatchKey::new(WarehouseId::parse(w).unwrap(), BatchCode::parse(c).unwrap())
    }

    fn seed(w: &str, c: &str) -> Batch {
        Batch {
            warehouse_id: WarehouseId::parse(w).unwrap(),
            code: BatchCode::parse(c).unwrap(),
            product: ProductName::parse("Vanilla Syrup").unwrap(),
            product_ref: "Vanilla Syrup".to_string(),
            quantity: 0,
            unit: "bottle".to_string(),
            expiry_date: None,
            reason: "New Supply".to_string(),
            category: "Syrup".to_string(),
            created_by: ActorName::parse("ann").unwrap(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn upsert_creates_then_adds_and_tracks_total() {
        let store = InMemoryLedgerStore::new();
        let k = key("W1", "B001");
        let w = k.warehouse_id.clone();

        let created = store.upsert_quantity(&k, 50, Some(seed("W1", "B001"))).unwrap();
        assert_eq!(created.quantity, 50);
        assert_eq!(created.version, 1);

        let updated = store.upsert_quantity(&k, -20, None).unwrap();
        assert_eq!(updated.quantity, 30);
        assert_eq!(store.total_items(&w).unwrap(), 30);
    }

    #[test]
    fn upsert_refuses_to_go_negative() {
        let store = InMemoryLedgerStore::new();
        let k = key("W1", "B001");
        store.upsert_quantity(&k, 5, Some(seed("W1", "B001"))).unwrap();

        let err = store.upsert_quantity(&k, -6, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::WouldGoNegative {
                available: 5,
                requested: 6,
                ..
            }
        ));
        assert_eq!(store.batch(&k).unwrap().unwrap().quantity, 5);
    }

    #[test]
    fn overflowing_total_is_rejected_and_store_stays_usable() {
        let store = InMemoryLedgerStore::new();
        let a = key("W1", "A");
        let b = key("W1", "B");
        store.upsert_quantity(&a, i64::MAX, Some(seed("W1", "A"))).unwrap();

        let err = store.upsert_quantity(&b, 1, Some(seed("W1", "B"))).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.batch(&b).unwrap().is_none());
        assert_eq!(store.total_items(&a.warehouse_id).unwrap(), i64::MAX);

        let err = store.upsert_quantity(&a, 1, None).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));

        let other = key("W2", "C");
        assert_eq!(store.upsert_quantity(&other, 5, Some(seed("W2", "C"))).unwrap().quantity, 5);
    }

    #[test]
    fn set_quantity_keeps_zero_records() {
        let store = InMemoryLedgerStore::new();
        let k = key("W1", "B001");
        store.upsert_quantity(&k, 5, Some(seed("W1", "B001"))).unwrap();
        store.set_quantity(&k, 0).unwrap();

        assert_eq!(store.batches(&k.warehouse_id).unwrap().len(), 1);
        assert_eq!(store.total_items(&k.warehouse_id).unwrap(), 0);
        assert!(store.set_quantity(&k, -1).is_err());
    }

    #[test]
    fn stale_expected_version_rejects_whole_changeset() {
        let store = InMemoryLedgerStore::new();
        let a = key("W1", "A");
        let b = key("W2", "B");
        store.upsert_quantity(&a, 5, Some(seed("W1", "A"))).unwrap();
        store.upsert_quantity(&b, 5, Some(seed("W2", "B"))).unwrap();

        let changeset = Changeset::new(
            vec![
                BatchWrite::Adjust {
                    key: a.clone(),
                    expected: ExpectedVersion::Exact(1),
                    delta: -1,
                    seed: None,
                },
                BatchWrite::Adjust {
                    key: b.clone(),
                    expected: ExpectedVersion::Exact(7),
                    delta: 1,
                    seed: None,
                },
            ],
            vec![],
        );
        assert!(matches!(store.commit(changeset), Err(StoreError::Conflict(_))));
        assert_eq!(store.batch(&a).unwrap().unwrap().quantity, 5);
        assert_eq!(store.batch(&b).unwrap().unwrap().quantity, 5);
    }

    #[test]
    fn single_key_store_rejects_multi_key_changesets() {
        let store = InMemoryLedgerStore::single_key();
        let changeset = Changeset::new(
            vec![
                BatchWrite::Create(seed("W1", "A")),
                BatchWrite::Create(seed("W2", "A")),
            ],
            vec![],
        );
        assert!(matches!(store.commit(changeset), Err(StoreError::Backend(_))));
        assert!(store.batches(&WarehouseId::parse("W1").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn purge_requires_matching_version() {
        let store = InMemoryLedgerStore::new();
        let k = key("W1", "B001");
        store.upsert_quantity(&k, 0, Some(seed("W1", "B001"))).unwrap();

        assert!(matches!(
            store.purge_batch(&k, ExpectedVersion::Exact(9)),
            Err(StoreError::Conflict(_))
        ));
        store.purge_batch(&k, ExpectedVersion::Exact(1)).unwrap();
        assert!(store.batch(&k).unwrap().is_none());
        assert!(matches!(
            store.purge_batch(&k, ExpectedVersion::Any),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn refresh_rewrites_only_changed_batches() {
        let store = InMemoryLedgerStore::new();
        store.upsert_quantity(&key("W1", "A"), 1, Some(seed("W1", "A"))).unwrap();
        store.upsert_quantity(&key("W2", "B"), 1, Some(seed("W2", "B"))).unwrap();

        let name = ProductName::parse("Vanilla Syrup").unwrap();
        assert_eq!(store.refresh_product_attributes(&name, "case", "Syrup").unwrap(), 2);
        assert_eq!(store.refresh_product_attributes(&name, "case", "Syrup").unwrap(), 0);
        assert_eq!(store.batch(&key("W2", "B")).unwrap().unwrap().unit, "case");
    }
}
