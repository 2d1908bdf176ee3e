use async_trait::async_trait;
use civic_appeals::AppealDecision;
use civic_claims::{ReadingOutcome, ReadingRequest};
use civic_ledger::SettlementClient;
use civic_node::clients::{LoggingPenalty, LoggingSink, StoreHistory};
use civic_node::config::NodeConfig;
use civic_node::service::AdjudicationService;
use civic_storage::MemoryBackend;
use civic_types::{
    ClaimState, Domain, ErrorKind, Identity, MaterialType, Quantity, RewardAmount,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CITIZEN: &str = "0x1111111111111111111111111111111111111111";
const STAFF: &str = "0x2222222222222222222222222222222222222222";
const ADMIN: &str = "0x3333333333333333333333333333333333333333";
const INSPECTOR: &str = "0x4444444444444444444444444444444444444444";

/// Rail that can be flipped into an outage.
struct FlakyRail {
    down: AtomicBool,
}

#[async_trait]
impl SettlementClient for FlakyRail {
    async fn transfer(
        &self,
        _to: &Identity,
        _amount: RewardAmount,
        reference: &str,
    ) -> anyhow::Result<String> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("rail outage");
        }
        Ok(format!("tx-{}", reference))
    }
}

struct Harness {
    service: Arc<AdjudicationService>,
    rail: Arc<FlakyRail>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryBackend::new());
    let rail = Arc::new(FlakyRail {
        down: AtomicBool::new(false),
    });
    let config = NodeConfig::default();
    let service = Arc::new(AdjudicationService::new(
        store.clone(),
        rail.clone(),
        Arc::new(LoggingPenalty),
        Arc::new(LoggingSink),
        Arc::new(StoreHistory::new(store)),
        &config.adjudication,
    ));
    Harness { service, rail }
}

fn worked_declaration() -> BTreeMap<MaterialType, Quantity> {
    BTreeMap::from([
        (MaterialType::Plastic, Quantity::from_kg(2.5)),
        (MaterialType::Glass, Quantity::from_kg(1.0)),
    ])
}

#[tokio::test]
async fn declaration_approval_and_settlement() {
    let h = harness();

    let claim = h
        .service
        .create_declaration(CITIZEN, worked_declaration())
        .await
        .unwrap();
    assert_eq!(claim.computed_reward, RewardAmount::from_tokens(37));

    let token_id = claim.token().unwrap().token_id.clone();
    let by_token = h.service.claim_for_token(&token_id).await.unwrap();
    assert_eq!(by_token.id, claim.id);

    h.service.approve_claim(&claim.id, STAFF).await.unwrap();
    assert_eq!(
        h.service.balance(CITIZEN).await.unwrap(),
        RewardAmount::from_tokens(37)
    );

    // Outage: the decision stands, the balance survives.
    h.rail.down.store(true, Ordering::SeqCst);
    let err = h.service.claim_rewards(CITIZEN).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert_eq!(
        h.service.balance(CITIZEN).await.unwrap(),
        RewardAmount::from_tokens(37)
    );

    h.rail.down.store(false, Ordering::SeqCst);
    let receipt = h.service.claim_rewards(CITIZEN).await.unwrap();
    assert_eq!(receipt.amount, RewardAmount::from_tokens(37));
    assert_eq!(h.service.balance(CITIZEN).await.unwrap(), RewardAmount::ZERO);
}

#[tokio::test]
async fn fraud_mark_appeal_approval_restores_everything() {
    let h = harness();

    let claim = h
        .service
        .create_declaration(CITIZEN, worked_declaration())
        .await
        .unwrap();
    let (flagged, appeal) = h
        .service
        .mark_claim_fraud(&claim.id, STAFF, "suspicious weights")
        .await
        .unwrap();
    assert_eq!(flagged.state, ClaimState::Fraud);
    assert_eq!(h.service.balance(CITIZEN).await.unwrap(), RewardAmount::ZERO);

    // A second flag on the same claim conflicts; a second appeal is refused.
    let err = h
        .service
        .mark_claim_fraud(&claim.id, STAFF, "again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = h.service.open_appeal(&claim.id, STAFF, "again").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    h.service
        .resolve_appeal(&appeal.id, ADMIN, AppealDecision::Approve, Some("vindicated"))
        .await
        .unwrap();

    let restored = h.service.get_claim(&claim.id).await.unwrap();
    assert_eq!(restored.state, ClaimState::Approved);
    assert_eq!(
        h.service.balance(CITIZEN).await.unwrap(),
        RewardAmount::from_tokens(37)
    );
    let status = h.service.fraud_status(CITIZEN).await.unwrap();
    assert_eq!(status.warnings.remaining(Domain::Recycling), 2);
    assert!(status.fraud_records.is_empty());
}

#[tokio::test]
async fn two_rejections_blacklist_and_block_creation() {
    let h = harness();

    for reason in ["first strike", "second strike"] {
        let claim = h
            .service
            .create_declaration(CITIZEN, worked_declaration())
            .await
            .unwrap();
        let (_, appeal) = h
            .service
            .mark_claim_fraud(&claim.id, STAFF, reason)
            .await
            .unwrap();
        h.service
            .resolve_appeal(&appeal.id, ADMIN, AppealDecision::Reject, None)
            .await
            .unwrap();
    }

    let status = h.service.fraud_status(CITIZEN).await.unwrap();
    assert_eq!(status.warnings.remaining(Domain::Recycling), 0);
    assert!(status.warnings.is_blacklisted(Domain::Recycling));
    assert_eq!(status.fraud_records.len(), 2);
    assert_eq!(status.pending_balance, RewardAmount::ZERO);

    let err = h
        .service
        .create_declaration(CITIZEN, worked_declaration())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn reading_guard_and_inspection_reconciliation() {
    let h = harness();

    // Build a consumption baseline from accepted readings.
    let mut index = 2000u64;
    for delta in [100u64, 95, 105] {
        let previous = index;
        index += delta;
        let outcome = h
            .service
            .submit_reading(
                CITIZEN,
                ReadingRequest {
                    meter_ref: "WM-7".into(),
                    reading_index: index,
                    previous_index: previous,
                    confirmed_drop: false,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ReadingOutcome::Created(_)));
    }

    // A 90% drop is held until the citizen confirms it.
    let held = h
        .service
        .submit_reading(
            CITIZEN,
            ReadingRequest {
                meter_ref: "WM-7".into(),
                reading_index: index + 10,
                previous_index: index,
                confirmed_drop: false,
                metadata: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(held, ReadingOutcome::NeedsConfirmation { .. }));

    let confirmed = h
        .service
        .submit_reading(
            CITIZEN,
            ReadingRequest {
                meter_ref: "WM-7".into(),
                reading_index: index + 10,
                previous_index: index,
                confirmed_drop: true,
                metadata: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(confirmed, ReadingOutcome::Created(_)));

    // Inspection with the worked numbers: reported 2114, actual 3120.
    h.service.authorize_inspector(INSPECTOR).await.unwrap();
    let inspection = h
        .service
        .schedule_inspection(CITIZEN, "WM-7", 2114, None)
        .await
        .unwrap();
    let done = h
        .service
        .complete_inspection(&inspection.id, INSPECTOR, 3120, true, Some("seal broken"))
        .await
        .unwrap();
    assert!(done.fraud_found);

    let status = h.service.fraud_status(CITIZEN).await.unwrap();
    assert_eq!(status.warnings.remaining(Domain::Water), 1);
    assert_eq!(status.fraud_records.len(), 1);
    assert_eq!(status.fraud_records[0].underpayment, 10060.0);

    // Identity is now covered; the due scan leaves it alone.
    let due = h.service.inspections_due().await.unwrap();
    assert!(due.iter().all(|(id, _)| id.as_str() != Identity::parse(CITIZEN).unwrap().as_str()));
}

#[tokio::test]
async fn sweep_is_idempotent_with_nothing_to_do() {
    let h = harness();
    h.service.sweep().await.unwrap();
    h.service.sweep().await.unwrap();
    assert!(h.service.pending_claims().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_identity_is_a_validation_error() {
    let h = harness();
    let err = h
        .service
        .create_declaration("not-an-address", worked_declaration())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
