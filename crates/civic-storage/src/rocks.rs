use crate::backend::AdjudicationStore;
use crate::error::StorageError;
use crate::Result;
use async_trait::async_trait;
use civic_types::{
    Appeal, AppealId, AppealStatus, Claim, ClaimId, ClaimState, FraudRecord, Identity,
    InspectionId, InspectionRecord, InspectionStatus, RewardAmount, WarningRecord,
};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// RocksDB-backed store. Values are JSON; keys are string-prefixed so one
/// keyspace serves every entity family. Compare-and-swap sections serialize
/// through `write_lock` since RocksDB itself offers no conditional write.
pub struct RocksBackend {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl RocksBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_background_jobs(2);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::Backend(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn claim_key(id: &ClaimId) -> Vec<u8> {
        format!("claim:{}", id.to_hex()).into_bytes()
    }

    fn token_key(token_id: &str) -> Vec<u8> {
        format!("token:{}", token_id).into_bytes()
    }

    fn appeal_key(id: &AppealId) -> Vec<u8> {
        format!("appeal:{}", id.to_hex()).into_bytes()
    }

    fn warn_key(identity: &Identity) -> Vec<u8> {
        format!("warn:{}", identity).into_bytes()
    }

    fn insp_key(id: &InspectionId) -> Vec<u8> {
        format!("insp:{}", id.to_hex()).into_bytes()
    }

    fn balance_key(identity: &Identity) -> Vec<u8> {
        format!("bal:{}", identity).into_bytes()
    }

    fn credited_key(claim_id: &ClaimId) -> Vec<u8> {
        format!("credited:{}", claim_id.to_hex()).into_bytes()
    }

    fn settled_key(identity: &Identity) -> Vec<u8> {
        format!("settled:{}", identity).into_bytes()
    }

    fn fraud_key(identity: &Identity, seq: u64) -> Vec<u8> {
        format!("fraud:{}:{:08}", identity, seq).into_bytes()
    }

    fn fraud_seq_key(identity: &Identity) -> Vec<u8> {
        format!("fraudn:{}", identity).into_bytes()
    }

    fn inspector_key(identity: &Identity) -> Vec<u8> {
        format!("inspector:{}", identity).into_bytes()
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.db.get(key) {
            Ok(Some(data)) => {
                let value = serde_json::from_slice(&data)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Backend(format!("RocksDB get error: {}", e))),
        }
    }

    fn put_json<T: serde::Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let data =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db
            .put(key, data)
            .map_err(|e| StorageError::Backend(format!("RocksDB put error: {}", e)))
    }

    fn get_u64(&self, key: &[u8]) -> Result<u64> {
        match self.db.get(key) {
            Ok(Some(data)) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Serialization("bad u64 value".to_string()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StorageError::Backend(format!("RocksDB get error: {}", e))),
        }
    }

    fn scan_json<T: serde::de::DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) =
                item.map_err(|e| StorageError::Backend(format!("Iterator error: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            let parsed = serde_json::from_slice(&value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            out.push(parsed);
        }
        Ok(out)
    }

    fn lock_err() -> StorageError {
        StorageError::Backend("write lock poisoned".to_string())
    }
}

#[async_trait]
impl AdjudicationStore for RocksBackend {
    async fn put_claim(&self, claim: &Claim) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::claim_key(&claim.id);
        if self
            .db
            .get(&key)
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?
            .is_some()
        {
            return Err(StorageError::AlreadyExists(claim.id.to_hex()));
        }
        let data = serde_json::to_vec(claim)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut batch = WriteBatch::default();
        batch.put(&key, data);
        if let Some(token) = claim.token() {
            batch.put(Self::token_key(&token.token_id), claim.id.to_hex().as_bytes());
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(format!("RocksDB batch write error: {}", e)))
    }

    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>> {
        self.get_json(&Self::claim_key(id))
    }

    async fn update_claim(&self, claim: &Claim, expected_version: u64) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::claim_key(&claim.id);
        let current: Claim = self
            .get_json(&key)?
            .ok_or_else(|| StorageError::NotFound(claim.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = claim.clone();
        next.version = expected_version + 1;
        self.put_json(&key, &next)
    }

    async fn claims_by_state(&self, state: ClaimState) -> Result<Vec<Claim>> {
        let mut claims: Vec<Claim> = self.scan_json(b"claim:")?;
        claims.retain(|c| c.state == state);
        claims.sort_by_key(|c| c.created_at);
        Ok(claims)
    }

    async fn claims_by_identity(&self, identity: &Identity) -> Result<Vec<Claim>> {
        let mut claims: Vec<Claim> = self.scan_json(b"claim:")?;
        claims.retain(|c| &c.identity == identity);
        claims.sort_by_key(|c| c.created_at);
        Ok(claims)
    }

    async fn claim_by_token(&self, token_id: &str) -> Result<Option<Claim>> {
        let data = self
            .db
            .get(Self::token_key(token_id))
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let hex = String::from_utf8(data)
            .map_err(|_| StorageError::Serialization("bad token index".to_string()))?;
        let id = ClaimId::from_hex(&hex)
            .map_err(|_| StorageError::Serialization("bad token index".to_string()))?;
        self.get_json(&Self::claim_key(&id))
    }

    async fn put_appeal(&self, appeal: &Appeal) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::appeal_key(&appeal.id);
        if self
            .db
            .get(&key)
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?
            .is_some()
        {
            return Err(StorageError::AlreadyExists(appeal.id.to_hex()));
        }
        let appeals: Vec<Appeal> = self.scan_json(b"appeal:")?;
        if appeals
            .iter()
            .any(|a| a.claim_id == appeal.claim_id && a.status == AppealStatus::Pending)
        {
            return Err(StorageError::AlreadyExists(format!(
                "pending appeal for claim {}",
                appeal.claim_id
            )));
        }
        self.put_json(&key, appeal)
    }

    async fn get_appeal(&self, id: &AppealId) -> Result<Option<Appeal>> {
        self.get_json(&Self::appeal_key(id))
    }

    async fn update_appeal(&self, appeal: &Appeal, expected_version: u64) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::appeal_key(&appeal.id);
        let current: Appeal = self
            .get_json(&key)?
            .ok_or_else(|| StorageError::NotFound(appeal.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = appeal.clone();
        next.version = expected_version + 1;
        self.put_json(&key, &next)
    }

    async fn pending_appeal_for_claim(&self, claim_id: &ClaimId) -> Result<Option<Appeal>> {
        let appeals: Vec<Appeal> = self.scan_json(b"appeal:")?;
        Ok(appeals
            .into_iter()
            .find(|a| &a.claim_id == claim_id && a.status == AppealStatus::Pending))
    }

    async fn appeals_by_status(&self, status: AppealStatus) -> Result<Vec<Appeal>> {
        let mut appeals: Vec<Appeal> = self.scan_json(b"appeal:")?;
        appeals.retain(|a| a.status == status);
        appeals.sort_by_key(|a| a.created_at);
        Ok(appeals)
    }

    async fn get_warnings(&self, identity: &Identity) -> Result<Option<WarningRecord>> {
        self.get_json(&Self::warn_key(identity))
    }

    async fn put_warnings(&self, record: &WarningRecord) -> Result<()> {
        self.put_json(&Self::warn_key(&record.identity), record)
    }

    async fn put_inspection(&self, record: &InspectionRecord) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::insp_key(&record.id);
        if self
            .db
            .get(&key)
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?
            .is_some()
        {
            return Err(StorageError::AlreadyExists(record.id.to_hex()));
        }
        self.put_json(&key, record)
    }

    async fn get_inspection(&self, id: &InspectionId) -> Result<Option<InspectionRecord>> {
        self.get_json(&Self::insp_key(id))
    }

    async fn update_inspection(
        &self,
        record: &InspectionRecord,
        expected_version: u64,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let key = Self::insp_key(&record.id);
        let current: InspectionRecord = self
            .get_json(&key)?
            .ok_or_else(|| StorageError::NotFound(record.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = record.clone();
        next.version = expected_version + 1;
        self.put_json(&key, &next)
    }

    async fn pending_inspection_for(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>> {
        let records: Vec<InspectionRecord> = self.scan_json(b"insp:")?;
        Ok(records
            .into_iter()
            .find(|r| &r.identity == identity && r.is_active()))
    }

    async fn inspections_by_status(
        &self,
        status: InspectionStatus,
    ) -> Result<Vec<InspectionRecord>> {
        let mut records: Vec<InspectionRecord> = self.scan_json(b"insp:")?;
        records.retain(|r| r.status == status);
        records.sort_by_key(|r| r.scheduled_at);
        Ok(records)
    }

    async fn last_completed_inspection(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>> {
        let records: Vec<InspectionRecord> = self.scan_json(b"insp:")?;
        Ok(records
            .into_iter()
            .filter(|r| {
                &r.identity == identity
                    && matches!(
                        r.status,
                        InspectionStatus::Completed | InspectionStatus::FraudFound
                    )
            })
            .max_by_key(|r| r.completed_at))
    }

    async fn get_balance(&self, identity: &Identity) -> Result<RewardAmount> {
        self.get_u64(&Self::balance_key(identity))
            .map(RewardAmount::from_tokens)
    }

    async fn credit_if_absent(
        &self,
        identity: &Identity,
        claim_id: &ClaimId,
        amount: RewardAmount,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let credited_key = Self::credited_key(claim_id);
        if self
            .db
            .get(&credited_key)
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?
            .is_some()
        {
            return Ok(false);
        }
        let balance_key = Self::balance_key(identity);
        let current = self.get_u64(&balance_key)?;
        let next = current.saturating_add(amount.to_tokens());
        let mut batch = WriteBatch::default();
        batch.put(&balance_key, next.to_be_bytes());
        batch.put(&credited_key, b"1");
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(format!("RocksDB batch write error: {}", e)))?;
        Ok(true)
    }

    async fn settle_balance(
        &self,
        identity: &Identity,
        expected: RewardAmount,
        _reference: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let balance_key = Self::balance_key(identity);
        let current = self.get_u64(&balance_key)?;
        if current != expected.to_tokens() {
            return Err(StorageError::VersionConflict {
                expected: expected.to_tokens(),
                actual: current,
            });
        }
        let settled_key = Self::settled_key(identity);
        let count = self.get_u64(&settled_key)?;
        let mut batch = WriteBatch::default();
        batch.put(&balance_key, 0u64.to_be_bytes());
        batch.put(&settled_key, (count + 1).to_be_bytes());
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(format!("RocksDB batch write error: {}", e)))
    }

    async fn settlement_count(&self, identity: &Identity) -> Result<u64> {
        self.get_u64(&Self::settled_key(identity))
    }

    async fn append_fraud_record(&self, record: &FraudRecord) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| Self::lock_err())?;
        let seq_key = Self::fraud_seq_key(&record.identity);
        let seq = self.get_u64(&seq_key)?;
        let data = serde_json::to_vec(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut batch = WriteBatch::default();
        batch.put(Self::fraud_key(&record.identity, seq), data);
        batch.put(&seq_key, (seq + 1).to_be_bytes());
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(format!("RocksDB batch write error: {}", e)))
    }

    async fn fraud_records(&self, identity: &Identity) -> Result<Vec<FraudRecord>> {
        let prefix = format!("fraud:{}:", identity).into_bytes();
        self.scan_json(&prefix)
    }

    async fn add_inspector(&self, identity: &Identity) -> Result<()> {
        self.db
            .put(Self::inspector_key(identity), b"1")
            .map_err(|e| StorageError::Backend(format!("RocksDB put error: {}", e)))
    }

    async fn remove_inspector(&self, identity: &Identity) -> Result<bool> {
        let key = Self::inspector_key(identity);
        let present = self
            .db
            .get(&key)
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))?
            .is_some();
        if present {
            self.db
                .delete(&key)
                .map_err(|e| StorageError::Backend(format!("RocksDB delete error: {}", e)))?;
        }
        Ok(present)
    }

    async fn is_inspector(&self, identity: &Identity) -> Result<bool> {
        self.db
            .get(Self::inspector_key(identity))
            .map(|v| v.is_some())
            .map_err(|e| StorageError::Backend(format!("RocksDB get error: {}", e)))
    }
}
