//! # Sync Simulation
//!
//! Many actors producing outcomes far faster than a slow, flaky store can
//! answer. After draining, every actor's remote record is compared with the
//! result of applying its successful mutations one after another.
//!
//! ## Usage
//!
//! ```bash
//! sync_simulation --actors 50 --outcomes 40 --latency-ms 5 --fail-every 25
//! RUST_LOG=reliquary_sync=debug sync_simulation --seed 7 --audit /tmp/reliquary.audit
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reliquary_economy::{
    apply_outcome, ActorId, Buff, CardDefinition, Catalog, CollectionSnapshot, Mutation, Outcome,
    Target, Tier,
};
use reliquary_sync::{
    build_payload, AuditLog, AuditSink, MemoryAuditSink, MemoryStore, PendingSync, ReliquaryConfig,
    SyncService, ValidationStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

struct Options {
    actors: usize,
    outcomes: usize,
    latency_ms: u64,
    fail_every: usize,
    seed: u64,
    config: Option<String>,
    audit: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            actors: 50,
            outcomes: 40,
            latency_ms: 5,
            fail_every: 25,
            seed: 42,
            config: None,
            audit: None,
        }
    }
}

/// Parses command line flags. `None` means help was printed.
fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--actors" | "-a" => {
                options.actors = value.and_then(|v| v.parse().ok()).unwrap_or(options.actors);
                i += 1;
            }
            "--outcomes" | "-o" => {
                options.outcomes = value.and_then(|v| v.parse().ok()).unwrap_or(options.outcomes);
                i += 1;
            }
            "--latency-ms" | "-l" => {
                options.latency_ms = value.and_then(|v| v.parse().ok()).unwrap_or(options.latency_ms);
                i += 1;
            }
            "--fail-every" | "-f" => {
                options.fail_every = value.and_then(|v| v.parse().ok()).unwrap_or(options.fail_every);
                i += 1;
            }
            "--seed" | "-s" => {
                options.seed = value.and_then(|v| v.parse().ok()).unwrap_or(options.seed);
                i += 1;
            }
            "--config" | "-c" => {
                options.config = value.cloned();
                i += 1;
            }
            "--audit" => {
                options.audit = value.cloned();
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: sync_simulation [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -a, --actors <NUM>         Concurrent actors (default: 50)");
                println!("  -o, --outcomes <NUM>       Outcomes per actor (default: 40)");
                println!("  -l, --latency-ms <MS>      Store latency per call (default: 5)");
                println!("  -f, --fail-every <NUM>     Inject a write failure every N outcomes, 0 = never (default: 25)");
                println!("  -s, --seed <SEED>          RNG seed (default: 42)");
                println!("  -c, --config <PATH>        Config TOML file");
                println!("      --audit <PATH>         Append diagnostics to an audit log file");
                println!("  -h, --help                 Show this help");
                return None;
            }
            _ => {}
        }
        i += 1;
    }
    Some(options)
}

fn demo_catalog() -> Catalog {
    let mut cards = Vec::new();
    let tiers = [
        (Tier::T0, 6, 10.0),
        (Tier::T1, 4, 5.0),
        (Tier::T2, 3, 2.0),
        (Tier::T3, 2, 0.5),
    ];
    for (tier, count, weight) in tiers {
        for n in 0..count {
            let id = format!("{}-{n:02}", tier.as_str().to_lowercase());
            cards.push(CardDefinition::new(id, tier).with_weight(weight));
        }
    }
    Catalog::new(cards)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[derive(Default)]
struct ActorReport {
    actor: Option<ActorId>,
    succeeded: u64,
    failed: u64,
    mismatched: bool,
}

/// Drives one actor: produce every outcome without waiting, then await the
/// completions in order and check the remote record.
async fn run_actor(
    service: Arc<SyncService>,
    store: Arc<MemoryStore>,
    catalog: Arc<Catalog>,
    index: usize,
    options: Arc<Options>,
) -> ActorReport {
    let mut report = ActorReport::default();
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed.wrapping_add(index as u64));

    let actor = match service.resolve_actor(&format!("Actor{index:03}")).await {
        Ok(actor) => actor,
        Err(e) => {
            eprintln!("actor {index}: {e}");
            report.mismatched = true;
            return report;
        }
    };
    let start = CollectionSnapshot::with_currency(100).with_card("t0-00", 3, 0).with_card("t1-00", 1, 1);
    store.seed_collection(&actor, start.clone());
    if index % 5 == 0 {
        store.grant_buff(&actor, Buff::foil_boost(0.10, unix_now() + 3_600));
    }

    let mut view = match service.load_view(&actor).await {
        Ok(view) => view,
        Err(e) => {
            eprintln!("actor {actor}: {e}");
            report.mismatched = true;
            return report;
        }
    };

    let mut in_flight: Vec<(Mutation, PendingSync)> = Vec::with_capacity(options.outcomes);
    for n in 0..options.outcomes {
        if options.fail_every > 0 && (index * options.outcomes + n) % options.fail_every == 0 {
            store.fail_next_writes(1);
        }

        let (outcome, target) = match rng.gen_range(0..10) {
            0 => (service.open_booster(&actor).await, None),
            1 => (Ok(service.currency_grant()), None),
            _ => {
                let owned: Vec<Target> = view
                    .snapshot()
                    .cards
                    .iter()
                    .flat_map(|(id, entry)| {
                        let normal = (entry.normal > 0).then(|| Target::normal(id.clone()));
                        let foil = (entry.foil > 0).then(|| Target::foil(id.clone()));
                        normal.into_iter().chain(foil)
                    })
                    .collect();
                if owned.is_empty() {
                    (service.open_booster(&actor).await, None)
                } else {
                    let target = owned[rng.gen_range(0..owned.len())].clone();
                    (service.roll_corruption(&actor, &target).await, Some(target))
                }
            }
        };

        let outcome: Outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("actor {actor}: generation failed: {e}");
                continue;
            }
        };
        let Ok(mutation) = apply_outcome(&actor, &outcome, target.as_ref()) else {
            continue;
        };
        match service.apply(&mut view, &outcome, target.as_ref()) {
            Ok(pending) => in_flight.push((mutation, pending)),
            Err(failure) => {
                report.failed += 1;
                view.rollback(&failure);
            }
        }
    }

    let mut expected = start;
    for (mutation, pending) in in_flight {
        match pending.await {
            Ok(_) => {
                report.succeeded += 1;
                let (payload, _) = build_payload(&expected, &mutation, Some(&catalog));
                payload.merge_into(&mut expected);
            }
            Err(_) => report.failed += 1,
        }
    }

    let remote = store.collection(&actor).unwrap_or_default();
    report.mismatched = remote != expected;
    if report.mismatched {
        eprintln!("actor {actor}: remote record diverged from sequential application");
    }
    report.actor = Some(actor);
    report
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .try_init();

    let Some(options) = parse_args() else {
        return;
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         RELIQUARY - CONCURRENT SYNC SIMULATION                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let config = match options.config.as_deref().map(ReliquaryConfig::from_toml_file) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        None => ReliquaryConfig::default(),
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Actors:             {}", options.actors);
    println!("│ Outcomes / actor:   {}", options.outcomes);
    println!("│ Store latency:      {} ms", options.latency_ms);
    println!("│ Write fault every:  {}", options.fail_every);
    println!("│ Remote timeout:     {} ms", config.sync.remote_timeout_ms);
    println!("│ Booster size:       {}", config.economy.booster_size);
    println!("│ Seed:               {}", options.seed);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let catalog = demo_catalog();
    let store = Arc::new(MemoryStore::with_catalog(&catalog));
    store.set_latency(Duration::from_millis(options.latency_ms));

    let memory_audit = Arc::new(MemoryAuditSink::new(config.sync.audit_history));
    let audit: Arc<dyn AuditSink> = match options.audit.as_deref().map(AuditLog::open) {
        Some(Ok((log, previous))) => {
            println!("Audit log {} holds {} earlier records", log.path().display(), previous.len());
            Arc::new(log)
        }
        Some(Err(e)) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        None => memory_audit.clone(),
    };

    let service = match SyncService::new(config, store.clone(), store.clone(), audit) {
        Ok(service) => Arc::new(service.with_seed(options.seed)),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let catalog = match service.refresh_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    println!("Running...");
    let started = Instant::now();
    let options = Arc::new(options);
    let mut handles = Vec::with_capacity(options.actors);
    for index in 0..options.actors {
        handles.push(tokio::spawn(run_actor(
            Arc::clone(&service),
            Arc::clone(&store),
            Arc::clone(&catalog),
            index,
            Arc::clone(&options),
        )));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => eprintln!("actor task panicked: {e}"),
        }
    }
    service.drain().await;
    let elapsed = started.elapsed();

    let succeeded: u64 = reports.iter().map(|r| r.succeeded).sum();
    let failed: u64 = reports.iter().map(|r| r.failed).sum();
    let mismatched = reports.iter().filter(|r| r.mismatched).count();
    let consistent = reports.iter().filter(|r| r.actor.is_some() && !r.mismatched).count();

    println!();
    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Wall time:          {:.2} s", elapsed.as_secs_f64());
    println!("│ Mutations synced:   {succeeded}");
    println!("│ Mutations failed:   {failed}");
    println!("│ Remote writes:      {}", store.write_log().len());
    println!("│ Consistent actors:  {consistent}/{}", options.actors);
    if options.audit.is_none() {
        let records = memory_audit.records();
        let count = |status: ValidationStatus| records.iter().filter(|r| r.status == status).count();
        println!(
            "│ Diagnostics:        {} ok, {} warning, {} error",
            count(ValidationStatus::Ok),
            count(ValidationStatus::Warning),
            count(ValidationStatus::Error)
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");

    if mismatched == 0 && reports.len() == options.actors {
        println!("✓ Every remote record matches sequential application");
    } else {
        println!("✗ {mismatched} actors diverged");
        std::process::exit(1);
    }
}
