use std::path::PathBuf;
use std::sync::Arc;

use ulid::Ulid;

use lodge_availability::config::Config;
use lodge_availability::engine::{
    Alternatives, AvailabilityEngine, CalendarDate, DayStatus, EditContext, IgnoreReason,
    ToggleOutcome,
};
use lodge_availability::model::{Lodge, LodgeId};
use lodge_availability::notify::NotifyHub;
use lodge_availability::repository::LodgeRepository;
use lodge_availability::store::WalLodgeRepository;

// ── Test infrastructure ──────────────────────────────────────

fn test_config() -> Config {
    let dir = std::env::temp_dir().join(format!("lodge_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    Config {
        data_dir: dir,
        ..Config::default()
    }
}

fn open(config: &Config) -> Arc<WalLodgeRepository> {
    Arc::new(WalLodgeRepository::open(&config.wal_path(), config.compact_threshold).unwrap())
}

fn engine(repo: &Arc<WalLodgeRepository>) -> AvailabilityEngine {
    AvailabilityEngine::new(repo.clone(), Arc::new(NotifyHub::new()))
}

fn d(s: &str) -> CalendarDate {
    CalendarDate::parse(s).unwrap()
}

fn cleanup(dir: PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

async fn seed(repo: &WalLodgeRepository) {
    for (id, name) in [("cedar", "Cedar Lodge"), ("birch", "Birch Cabin"), ("aspen", "Aspen Hut")] {
        let mut lodge = Lodge::new(LodgeId::from(id), name, "Ridge Road");
        lodge.price_per_person_per_night = 45.0;
        repo.insert(lodge).await.unwrap();
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn toggles_survive_restart() {
    let config = test_config();
    let today = d("2024-03-01");
    let ctx = EditContext::editing();

    {
        let repo = open(&config);
        seed(&repo).await;
        let engine = engine(&repo);
        let cedar = LodgeId::from("cedar");
        engine.toggle_date_at(&cedar, d("2024-03-05"), today, &ctx).await.unwrap();
        engine.toggle_date_at(&cedar, d("2024-03-06"), today, &ctx).await.unwrap();
        engine.toggle_date_at(&cedar, d("2024-03-06"), today, &ctx).await.unwrap();
    }

    let repo = open(&config);
    let engine = engine(&repo);
    let snapshot = engine.load(&LodgeId::from("cedar")).await.unwrap();
    assert_eq!(snapshot.status_of(&d("2024-03-05")), DayStatus::Booked);
    assert_eq!(snapshot.status_of(&d("2024-03-06")), DayStatus::Blocked);
    assert_eq!(snapshot.status_of(&d("2024-03-07")), DayStatus::Available);

    cleanup(config.data_dir);
}

#[tokio::test]
async fn search_finds_alternatives_in_store_order() {
    let config = test_config();
    let repo = open(&config);
    seed(&repo).await;
    let engine = engine(&repo);
    let ctx = EditContext::editing();
    let today = d("2024-03-01");

    engine
        .toggle_date_at(&LodgeId::from("cedar"), d("2024-03-02"), today, &ctx)
        .await
        .unwrap();

    let outcome = engine
        .search(&LodgeId::from("cedar"), Some(d("2024-03-01")), Some(d("2024-03-03")))
        .await
        .unwrap();
    assert_eq!(
        outcome.availability.message(),
        "Unfortunately, 1 date in your range is unavailable."
    );
    let Alternatives::Found(found) = outcome.alternatives else {
        panic!("expected alternatives");
    };
    let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Birch Cabin", "Aspen Hut"]);

    cleanup(config.data_dir);
}

#[tokio::test]
async fn guest_cannot_edit_and_nothing_is_logged() {
    let config = test_config();
    let repo = open(&config);
    seed(&repo).await;
    let engine = engine(&repo);
    let before = repo.appends_since_compact().await;

    let outcome = engine
        .toggle_date_at(&LodgeId::from("birch"), d("2024-03-05"), d("2024-03-01"), &EditContext::guest())
        .await
        .unwrap();
    assert!(matches!(outcome, ToggleOutcome::Ignored(IgnoreReason::Unauthorized)));
    assert_eq!(repo.appends_since_compact().await, before);

    cleanup(config.data_dir);
}

#[tokio::test]
async fn deleted_lodge_drops_out_of_alternatives() {
    let config = test_config();
    let repo = open(&config);
    seed(&repo).await;
    let engine = engine(&repo);

    engine
        .toggle_date_at(&LodgeId::from("cedar"), d("2024-03-02"), d("2024-03-01"), &EditContext::editing())
        .await
        .unwrap();
    repo.delete(&LodgeId::from("birch")).await.unwrap();

    let outcome = engine
        .search(&LodgeId::from("cedar"), Some(d("2024-03-01")), Some(d("2024-03-04")))
        .await
        .unwrap();
    let Alternatives::Found(found) = outcome.alternatives else {
        panic!("expected alternatives");
    };
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, LodgeId::from("aspen"));
    assert_eq!(repo.list().await.unwrap().len(), 2);

    cleanup(config.data_dir);
}

#[tokio::test]
async fn compaction_keeps_state() {
    let mut config = test_config();
    config.compact_threshold = 5;
    let ctx = EditContext::editing();

    {
        let repo = open(&config);
        seed(&repo).await;
        let engine = engine(&repo);
        for day in ["2024-04-01", "2024-04-02", "2024-04-03", "2024-04-04"] {
            engine
                .toggle_date_at(&LodgeId::from("aspen"), d(day), d("2024-03-01"), &ctx)
                .await
                .unwrap();
        }
        assert!(repo.appends_since_compact().await < config.compact_threshold);
    }

    let repo = open(&config);
    let aspen = repo.get(&LodgeId::from("aspen")).await.unwrap();
    assert_eq!(
        aspen.booked_dates,
        vec!["2024-04-01", "2024-04-02", "2024-04-03", "2024-04-04"]
    );
    let ids: Vec<String> = repo
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.id.to_string())
        .collect();
    assert_eq!(ids, vec!["cedar", "birch", "aspen"]);

    cleanup(config.data_dir);
}
