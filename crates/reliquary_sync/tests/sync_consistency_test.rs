//! # Sync Consistency Verification Tests
//!
//! End-to-end runs of the service against the in-memory store:
//!
//! 1. **Ordering**: mutations of one actor reach the store in enqueue order
//! 2. **Absolute writes**: payloads carry clamped totals, never deltas
//! 3. **Failure handling**: failed syncs hand the rollback snapshot back
//! 4. **Diagnostics**: every resolved mutation leaves one record
//!
//! Run with: cargo test -p reliquary_sync --test sync_consistency_test -- --nocapture

use reliquary_economy::{
    apply_outcome, ActorId, BoosterPick, CardDefinition, Catalog, CollectionSnapshot, EconomyError,
    Outcome, Target, Tier,
};
use reliquary_sync::{
    build_payload, AuditLog, FailureNotice, MemoryAuditSink, MemoryStore, ReliquaryConfig,
    SyncCommand, SyncConfig, SyncError, SyncService, ValidationStatus, ALL_PASSED,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn catalog() -> Catalog {
    Catalog::new(vec![
        CardDefinition::new("cardA", Tier::T0).with_weight(10.0),
        CardDefinition::new("cardB", Tier::T1).with_weight(5.0),
        CardDefinition::new("cardC", Tier::T1).with_weight(5.0),
        CardDefinition::new("cardD", Tier::T2).with_weight(2.0),
    ])
}

fn service_with(
    store: &Arc<MemoryStore>,
    sync: SyncConfig,
) -> (SyncService, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new(1_000));
    let config = ReliquaryConfig {
        sync,
        ..ReliquaryConfig::default()
    };
    let service = SyncService::new(config, store.clone(), store.clone(), audit.clone())
        .expect("default config is valid")
        .with_seed(7);
    (service, audit)
}

fn temp_audit_path() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    std::env::temp_dir().join(format!("reliquary_audit_{nanos}.log"))
}

// ============================================================================
// SINGLE MUTATION
// ============================================================================

#[tokio::test]
async fn test_foil_outcome_writes_absolute_totals() {
    println!("\n=== ALICE: FOIL ON A NORMAL COPY ===");
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, audit) = service_with(&store, SyncConfig::default());

    let alice = service.resolve_actor("Alice").await.expect("store healthy");
    store.seed_collection(&alice, CollectionSnapshot::with_currency(3).with_card("cardA", 2, 0));
    service.refresh_catalog().await.expect("catalog served");

    let mut view = service.load_view(&alice).await.expect("store healthy");
    let target = Target::normal("cardA");
    let pending = service
        .apply(&mut view, &Outcome::Foil, Some(&target))
        .expect("queue accepts");

    // Optimistic view updates before the store answers.
    assert_eq!(view.snapshot().normal("cardA"), 1);
    assert_eq!(view.snapshot().foil("cardA"), 1);
    assert_eq!(view.snapshot().currency, 2);

    let receipt = pending.await.expect("sync succeeds");
    let payload_card = &receipt.payload.cards["cardA"];
    println!("  payload: {payload_card:?} currency {}", receipt.payload.currency);
    assert_eq!((payload_card.normal, payload_card.foil), (1, 1));
    assert_eq!(receipt.payload.currency, 2);
    assert_eq!(receipt.clamped_fields, 0);
    assert_eq!(receipt.verdict.status, ValidationStatus::Ok);
    assert_eq!(receipt.verdict.notes, ALL_PASSED);

    assert_eq!(store.collection(&alice), Some(view.snapshot().clone()));

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action_details.card_id.as_deref(), Some("cardA"));
    assert_eq!(records[0].action_details.card_tier, Some(Tier::T0));
    assert_eq!(records[0].state_before.cards_by_tier.get("T0"), Some(&2));
}

#[tokio::test]
async fn test_destroying_missing_copy_clamps_at_zero() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let carol = ActorId::new("carol");
    store.seed_collection(&carol, CollectionSnapshot::with_currency(5).with_card("cardB", 1, 0));

    let mut view = service.load_view(&carol).await.expect("store healthy");
    // Another device already spent the copy.
    store.seed_collection(&carol, CollectionSnapshot::with_currency(5).with_card("cardB", 0, 0));

    let receipt = service
        .apply(&mut view, &Outcome::Destroyed, Some(&Target::normal("cardB")))
        .expect("queue accepts")
        .await
        .expect("sync succeeds");

    assert_eq!(receipt.payload.cards["cardB"].normal, 0);
    assert_eq!(receipt.clamped_fields, 1);
    assert_eq!(receipt.payload.currency, 4);
    assert_eq!(receipt.verdict.status, ValidationStatus::Warning);
    assert!(receipt.verdict.notes.contains("Card delta incorrect for destroyed"));
}

#[tokio::test]
async fn test_booster_from_empty_catalog_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (service, audit) = service_with(&store, SyncConfig::default());
    let dave = ActorId::new("dave");

    let error = service.open_booster(&dave).await.expect_err("catalog is empty");
    assert_eq!(error, SyncError::Economy(EconomyError::EmptyCatalog));
    assert!(store.write_log().is_empty());
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_catalog_outage_is_reported() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_catalog_unavailable(true);
    let (service, _audit) = service_with(&store, SyncConfig::default());

    let error = service.open_booster(&ActorId::new("erin")).await.expect_err("catalog offline");
    assert!(matches!(error, SyncError::CatalogUnavailable(_)));

    store.set_catalog_unavailable(false);
    let outcome = service.open_booster(&ActorId::new("erin")).await.expect("catalog back");
    assert!(matches!(outcome, Outcome::Booster { ref picks } if picks.len() == 5));
}

#[tokio::test]
async fn test_actor_resolution_failure() {
    let store = Arc::new(MemoryStore::new());
    store.set_resolution_unavailable(true);
    let (service, _audit) = service_with(&store, SyncConfig::default());

    let error = service.resolve_actor("Frank").await.expect_err("directory offline");
    assert!(matches!(error, SyncError::ActorResolutionFailure { ref name, .. } if name == "Frank"));
    assert!(!error.is_retryable());
}

// ============================================================================
// ORDERING
// ============================================================================

#[tokio::test]
async fn test_outcomes_land_in_enqueue_order() {
    println!("\n=== BOB: NOTHING, THEN DESTROYED ON A FOIL ===");
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(5));
    let (service, audit) = service_with(&store, SyncConfig::default());

    let bob = ActorId::new("bob");
    store.seed_collection(&bob, CollectionSnapshot::with_currency(5).with_card("cardB", 0, 1));
    let mut view = service.load_view(&bob).await.expect("store healthy");

    let first = service.apply(&mut view, &Outcome::Nothing, None).expect("queue accepts");
    let second = service
        .apply(&mut view, &Outcome::Destroyed, Some(&Target::foil("cardB")))
        .expect("queue accepts");

    let first = first.await.expect("first sync");
    let second = second.await.expect("second sync");
    assert!(first.record_sequence < second.record_sequence);

    let writes = store.write_log();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].payload.currency, 4);
    assert!(writes[0].payload.cards.is_empty());
    assert_eq!(writes[1].payload.currency, 3);
    assert_eq!(writes[1].payload.cards["cardB"].foil, 0);

    let records = audit.records();
    assert!(records.iter().all(|r| r.status == ValidationStatus::Ok));
    assert_eq!(records[0].action_details.outcome.as_str(), "nothing");
    assert_eq!(records[1].action_details.outcome.as_str(), "destroyed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_matches_sequential_application() {
    println!("\n=== FIFO UNDER LATENCY ===");
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(2));
    let (service, _audit) = service_with(&store, SyncConfig::default());

    let grace = ActorId::new("grace");
    let start = CollectionSnapshot::with_currency(10).with_card("cardA", 3, 0);
    store.seed_collection(&grace, start.clone());
    let mut view = service.load_view(&grace).await.expect("store healthy");

    let script = [
        (Outcome::Duplicate, Some(Target::normal("cardA"))),
        (Outcome::Foil, Some(Target::normal("cardA"))),
        (Outcome::CurrencyGrant { amount: 5 }, None),
        (Outcome::Destroyed, Some(Target::normal("cardA"))),
        (Outcome::Transform { into: "cardC".to_string() }, Some(Target::normal("cardA"))),
        (Outcome::LoseFoil, Some(Target::foil("cardA"))),
        (Outcome::Destroyed, Some(Target::normal("cardA"))),
        (Outcome::Destroyed, Some(Target::normal("cardA"))),
        (Outcome::Destroyed, Some(Target::normal("cardA"))),
        (Outcome::Nothing, None),
    ];

    let mut expected = start;
    let mut pending = Vec::new();
    for round in 0..3 {
        for (outcome, target) in &script {
            let mutation = apply_outcome(&grace, outcome, target.as_ref()).expect("targets given");
            let (payload, _) = build_payload(&expected, &mutation, None);
            payload.merge_into(&mut expected);
            pending.push(service.apply(&mut view, outcome, target.as_ref()).expect("queue accepts"));
        }
        println!("  round {round}: {} in flight", service.status(&grace).pending);
    }

    for completion in pending {
        completion.await.expect("store healthy");
    }
    service.drain().await;

    let remote = store.collection(&grace).expect("record written");
    println!("  remote currency {} cards {}", remote.currency, remote.total_cards());
    assert_eq!(remote, expected);
    assert_eq!(store.write_log().len(), 30);
    let status = service.status(&grace);
    assert_eq!(status.processed, 30);
    assert!(!status.processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actors_are_independent() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(3));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for name in ["heidi", "ivan", "judy", "mallory"] {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            let actor = ActorId::new(name);
            let mut view = service.load_view(&actor).await.expect("store healthy");
            let mut pending = Vec::new();
            for amount in 1..=10 {
                let grant = Outcome::CurrencyGrant { amount };
                pending.push(service.apply(&mut view, &grant, None).expect("queue accepts"));
            }
            for completion in pending {
                completion.await.expect("store healthy");
            }
            actor
        }));
    }

    for task in tasks {
        let actor = task.await.expect("task completes");
        let currencies: Vec<u32> = store
            .write_log()
            .into_iter()
            .filter(|w| w.actor_id == actor)
            .map(|w| w.payload.currency)
            .collect();
        // 1, 3, 6, ... : running sums in enqueue order.
        let expected: Vec<u32> = (1..=10)
            .scan(0, |sum, n| {
                *sum += n;
                Some(*sum)
            })
            .collect();
        assert_eq!(currencies, expected, "writes for {actor} out of order");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_serialize_per_actor() {
    println!("\n=== 40 PRODUCERS, ONE ACTOR ===");
    const PRODUCERS: u32 = 40;
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(1));
    let (service, audit) = service_with(&store, SyncConfig::default());
    let service = Arc::new(service);
    let oscar = ActorId::new("oscar");

    let mut tasks = Vec::new();
    for amount in 1..=PRODUCERS {
        let service = Arc::clone(&service);
        let oscar = oscar.clone();
        tasks.push(tokio::spawn(async move {
            let grant = Outcome::CurrencyGrant { amount };
            let mutation = apply_outcome(&oscar, &grant, None).expect("no target");
            service
                .enqueue(SyncCommand::new(mutation, CollectionSnapshot::default()))
                .expect("unbounded")
                .await
        }));
    }
    for task in tasks {
        task.await.expect("task completes").expect("store healthy");
    }
    service.drain().await;

    let currencies: Vec<u32> = store
        .write_log()
        .into_iter()
        .filter(|w| w.actor_id == oscar)
        .map(|w| w.payload.currency)
        .collect();
    assert_eq!(currencies.len(), PRODUCERS as usize);
    assert!(currencies.windows(2).all(|pair| pair[0] < pair[1]), "lost update in {currencies:?}");

    let total: u32 = (1..=PRODUCERS).sum();
    let remote = store.collection(&oscar).expect("record written");
    println!("  final currency {} (expected {total})", remote.currency);
    assert_eq!(remote.currency, total);

    let status = service.status(&oscar);
    assert_eq!((status.processed, status.failed), (u64::from(PRODUCERS), 0));
    let records = audit.records();
    assert_eq!(records.len(), PRODUCERS as usize);
    assert!(records.iter().all(|r| r.status == ValidationStatus::Ok));
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_cleared_mutations_leave_error_records() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(20));
    let (service, audit) = service_with(&store, SyncConfig::default());
    let olga = ActorId::new("olga");
    store.seed_collection(&olga, CollectionSnapshot::with_currency(6));
    let mut view = service.load_view(&olga).await.expect("store healthy");

    let first = service.apply(&mut view, &Outcome::Nothing, None).expect("queue accepts");
    let second = service
        .apply(&mut view, &Outcome::CurrencyGrant { amount: 4 }, None)
        .expect("queue accepts");
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(service.queue_for(&olga).clear(), 1);
    first.await.expect("in-flight mutation completes");
    let failure = second.await.expect_err("cancelled");
    assert_eq!(failure.error, SyncError::Cancelled);
    assert_eq!(failure.rollback.currency, 5);
    service.drain().await;

    let records = audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ValidationStatus::Ok);
    assert_eq!(records[1].status, ValidationStatus::Error);
    assert_eq!(records[1].state_before.currency, 5);
    assert!(records[1].notes.contains("cancelled"), "{}", records[1].notes);
    assert_eq!(service.status(&olga).failed, 1);
    assert_eq!(store.write_log().len(), 1);
}

#[tokio::test]
async fn test_write_failure_hands_back_rollback() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, audit) = service_with(&store, SyncConfig::default());
    let ken = ActorId::new("ken");
    let start = CollectionSnapshot::with_currency(3).with_card("cardA", 2, 0);
    store.seed_collection(&ken, start.clone());

    let mut view = service.load_view(&ken).await.expect("store healthy");
    store.fail_next_writes(1);
    let failure = service
        .apply(&mut view, &Outcome::Foil, Some(&Target::normal("cardA")))
        .expect("queue accepts")
        .await
        .expect_err("write fails");

    assert!(matches!(failure.error, SyncError::RemoteWriteFailure { .. }));
    assert_ne!(view.snapshot(), &start);
    view.rollback(&failure);
    assert_eq!(view.snapshot(), &start);
    assert_eq!(store.collection(&ken), Some(start));

    assert_eq!(
        service.failure_notice(&failure.error, 1),
        FailureNotice::Retry { attempt: 1, remaining: 2 }
    );
    assert_eq!(service.failure_notice(&failure.error, 3), FailureNotice::SyncFailed);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ValidationStatus::Error);
    assert!(records[0].action_details.sync_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let leo = ActorId::new("leo");
    let mut view = service.load_view(&leo).await.expect("store healthy");

    store.set_latency(Duration::from_secs(30));
    let failure = service
        .apply(&mut view, &Outcome::CurrencyGrant { amount: 5 }, None)
        .expect("queue accepts")
        .await
        .expect_err("fetch times out");

    assert!(matches!(failure.error, SyncError::RemoteFetchFailure { .. }));
    assert_eq!(failure.rollback, CollectionSnapshot::default());
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn test_rejected_write_is_final() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let mia = ActorId::new("mia");
    let mut view = service.load_view(&mia).await.expect("store healthy");

    store.reject_next_writes(1);
    let failure = service
        .apply(&mut view, &Outcome::Nothing, None)
        .expect("queue accepts")
        .await
        .expect_err("write rejected");

    assert!(matches!(failure.error, SyncError::RemoteRejected { .. }));
    assert_eq!(service.failure_notice(&failure.error, 1), FailureNotice::SyncFailed);
}

#[tokio::test]
async fn test_bounded_queue_rejects_overflow() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    store.set_latency(Duration::from_millis(5));
    let sync = SyncConfig {
        max_queue_depth: Some(2),
        ..SyncConfig::default()
    };
    let (service, _audit) = service_with(&store, sync);
    let nina = ActorId::new("nina");
    let mut view = service.load_view(&nina).await.expect("store healthy");

    let grant = Outcome::CurrencyGrant { amount: 1 };
    let first = service.apply(&mut view, &grant, None).expect("room");
    let second = service.apply(&mut view, &grant, None).expect("room");
    let before_overflow = view.snapshot().clone();
    let overflow = service.apply(&mut view, &grant, None).expect_err("queue at depth");

    assert_eq!(overflow.error, SyncError::QueueFull { depth: 2 });
    assert_eq!(overflow.rollback, before_overflow);
    view.rollback(&overflow);
    assert_eq!(view.snapshot().currency, 2);

    first.await.expect("first sync");
    second.await.expect("second sync");
    assert_eq!(store.collection(&nina).map(|c| c.currency), Some(2));
}

#[tokio::test]
async fn test_missing_target_never_reaches_queue() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let olga = ActorId::new("olga");
    let mut view = service.load_view(&olga).await.expect("store healthy");

    let failure = service
        .apply(&mut view, &Outcome::Destroyed, None)
        .expect_err("target required");
    assert!(matches!(
        failure.error,
        SyncError::Economy(EconomyError::MissingTarget { .. })
    ));
    assert_eq!(view.snapshot(), &CollectionSnapshot::default());
    assert_eq!(service.status(&olga).processed, 0);
}

// ============================================================================
// CORRUPTION ROLLS
// ============================================================================

#[tokio::test]
async fn test_foil_target_only_loses_foil_or_dies() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let pat = ActorId::new("pat");
    let target = Target::foil("cardB");

    for _ in 0..200 {
        let outcome = service.roll_corruption(&pat, &target).await.expect("card known");
        assert!(
            matches!(outcome, Outcome::LoseFoil | Outcome::Destroyed),
            "unexpected {outcome:?}"
        );
    }
}

#[tokio::test]
async fn test_transform_stays_in_tier() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let quinn = ActorId::new("quinn");
    let target = Target::normal("cardB");

    let mut transforms = 0;
    for _ in 0..500 {
        let outcome = service.roll_corruption(&quinn, &target).await.expect("card known");
        if let Outcome::Transform { into } = outcome {
            assert_eq!(into, "cardC");
            transforms += 1;
        }
    }
    assert!(transforms > 0);

    let error = service
        .roll_corruption(&quinn, &Target::normal("ghost"))
        .await
        .expect_err("unknown card");
    assert_eq!(error, SyncError::Economy(EconomyError::UnknownCard("ghost".to_string())));
}

// ============================================================================
// AUDIT LOG
// ============================================================================

#[tokio::test]
async fn test_audit_log_receives_every_record() {
    let path = temp_audit_path();
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    {
        let (log, previous) = AuditLog::open(&path).expect("audit log opens");
        assert!(previous.is_empty());
        let service = SyncService::new(
            ReliquaryConfig::default(),
            store.clone(),
            store.clone(),
            Arc::new(log),
        )
        .expect("default config is valid");

        let rosa = ActorId::new("rosa");
        store.seed_collection(&rosa, CollectionSnapshot::with_currency(2).with_card("cardA", 1, 0));
        let mut view = service.load_view(&rosa).await.expect("store healthy");

        service
            .apply(&mut view, &Outcome::Nothing, None)
            .expect("queue accepts")
            .await
            .expect("first sync");
        store.fail_next_writes(1);
        service
            .apply(&mut view, &Outcome::Duplicate, Some(&Target::normal("cardA")))
            .expect("queue accepts")
            .await
            .expect_err("second write fails");
    }

    let records = AuditLog::read_all(&path).expect("log readable");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ValidationStatus::Ok);
    assert_eq!(records[1].status, ValidationStatus::Error);
    assert!(records[1].notes.contains("Synchronisation failed"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_reopened_audit_log_continues_sequences() {
    let path = temp_audit_path();
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let sam = ActorId::new("sam");
    store.seed_collection(&sam, CollectionSnapshot::with_currency(9));

    for run in 0..2 {
        let (log, previous) = AuditLog::open(&path).expect("audit log opens");
        assert_eq!(previous.len(), run * 2);
        let service = SyncService::new(ReliquaryConfig::default(), store.clone(), store.clone(), Arc::new(log))
            .expect("default config is valid");
        let mut view = service.load_view(&sam).await.expect("store healthy");
        for _ in 0..2 {
            service
                .apply(&mut view, &Outcome::Nothing, None)
                .expect("queue accepts")
                .await
                .expect("store healthy");
        }
    }

    let sequences: Vec<u64> = AuditLog::read_all(&path)
        .expect("log readable")
        .iter()
        .map(|r| r.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// CATALOG FIELDS
// ============================================================================

#[tokio::test]
async fn test_new_card_written_with_catalog_fields() {
    let store = Arc::new(MemoryStore::with_catalog(&catalog()));
    let (service, _audit) = service_with(&store, SyncConfig::default());
    let tess = ActorId::new("tess");
    store.seed_collection(&tess, CollectionSnapshot::with_currency(1).with_card("cardA", 1, 0));
    service.refresh_catalog().await.expect("catalog served");

    let mut view = service.load_view(&tess).await.expect("store healthy");
    let picks = vec![
        BoosterPick { card_id: "cardA".to_string(), tier: Tier::T0, foil: false },
        BoosterPick { card_id: "cardD".to_string(), tier: Tier::T2, foil: true },
    ];
    service
        .apply(&mut view, &Outcome::Booster { picks }, None)
        .expect("queue accepts")
        .await
        .expect("store healthy");

    let remote = store.collection(&tess).expect("record written");
    let drawn = remote.entry("cardD").expect("new card written");
    assert_eq!((drawn.normal, drawn.foil), (0, 1));
    assert_eq!(drawn.extra.get("tier"), Some(&serde_json::json!("T2")));
    assert_eq!(drawn.extra.get("quantity"), Some(&serde_json::json!(1)));
    // Cards already on record keep their stored shape.
    assert!(remote.entry("cardA").expect("still held").extra.is_empty());
    assert_eq!(remote.normal("cardA"), 2);
}
