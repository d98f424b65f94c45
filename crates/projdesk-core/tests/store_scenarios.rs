//! End-to-end store scenarios against an in-memory revision-checking remote.
//!
//! Covers:
//!   - the Avvika status/blocker update recorded against its actor
//!   - no-op updates record nothing and write nothing
//!   - the history cap
//!   - rename collisions leave both projects untouched
//!   - interleaved writers on different projects both survive
//!   - racing creates on an empty remote both survive
//!   - serialize/reload round trips

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use projdesk_core::error::DeskError;
use projdesk_core::history::HISTORY_CAP;
use projdesk_core::model::{Document, FieldChange, TrackedField, UNSET};
use projdesk_core::remote::DocumentClient;
use projdesk_core::remote::memory::MemoryDocumentClient;
use projdesk_core::store::{ProjectPatch, ProjectStore};

const SEED: &str = r#"{
    "channel_id": "C-REPORTS",
    "authorized_users": ["leo@powercommerce.com"],
    "channel_map": {"C-AVVIKA": {"client": "Avvika", "role": "external"}},
    "projects": [
        {"id": "prj-avvika", "client": "Avvika", "status": "In Progress", "blocker": "-",
         "owner": "Leo", "budget": 1200, "email_history": [{"subject": "kickoff"}]},
        {"id": "prj-avvika2", "client": "Avvika2", "status": "Initialized"},
        {"id": "prj-zeta", "client": "Zeta", "status": "Initialized"}
    ],
    "report_schedule": "weekly"
}"#;

fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, 2)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid time")
}

fn setup() -> (Arc<MemoryDocumentClient>, ProjectStore) {
    let remote = Arc::new(MemoryDocumentClient::with_content(SEED));
    let store = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));
    (remote, store)
}

fn stored(remote: &MemoryDocumentClient) -> Document {
    Document::parse(&remote.content().expect("document present")).expect("parse stored document")
}

#[test]
fn avvika_update_is_recorded_against_its_actor() {
    let (remote, store) = setup();
    let patch = ProjectPatch::new()
        .set(TrackedField::Status, "Completed")
        .set(TrackedField::Blocker, "Resolved");

    let outcome = store
        .apply_update("avvika", &patch, "leo@powercommerce.com")
        .expect("update");

    let entry = outcome.entry.expect("history entry");
    assert_eq!(entry.user, "leo@powercommerce.com");
    assert_eq!(entry.timestamp, "2025-04-02 12:00:00");
    assert_eq!(entry.changes.len(), 2);
    assert_eq!(entry.changes["status"], FieldChange::new("In Progress", "Completed"));
    assert_eq!(entry.changes["blocker"], FieldChange::new(UNSET, "Resolved"));
    assert_eq!(entry.previous_state.status, "In Progress");

    let doc = stored(&remote);
    let avvika = doc.find("Avvika").expect("avvika");
    assert_eq!(avvika.get(TrackedField::Status), "Completed");
    assert_eq!(avvika.history.len(), 1);
    assert_eq!(avvika.last_updated.as_deref(), Some("2025-04-02 12:00:00"));
    assert!(avvika.extra.contains_key("email_history"));
    assert!(doc.extra.contains_key("report_schedule"));
}

#[test]
fn noop_update_records_nothing_and_writes_nothing() {
    let (remote, store) = setup();
    let patch = ProjectPatch::new()
        .set(TrackedField::Status, "  In Progress ")
        .set(TrackedField::Blocker, "");

    let outcome = store
        .apply_update("Avvika", &patch, "leo@powercommerce.com")
        .expect("update");

    assert!(outcome.entry.is_none());
    assert!(!outcome.persisted);
    assert_eq!(remote.store_count(), 0);
    assert!(stored(&remote).find("Avvika").expect("avvika").history.is_empty());
}

#[test]
fn fifty_first_update_evicts_the_oldest_entry() {
    let (remote, store) = setup();
    for i in 0..=HISTORY_CAP {
        let patch = ProjectPatch::new().set(TrackedField::Owner, format!("owner-{i}"));
        store.apply_update("Zeta", &patch, "leo@powercommerce.com").expect("update");
    }

    let doc = stored(&remote);
    let history = &doc.find("Zeta").expect("zeta").history;
    assert_eq!(history.len(), HISTORY_CAP);
    assert_eq!(history[0].changes["owner"].new, format!("owner-{HISTORY_CAP}"));
    // The very first change (UNSET -> owner-0) is gone.
    assert!(history.iter().all(|e| e.changes["owner"].new != "owner-0"));
}

#[test]
fn rename_onto_existing_client_conflicts_and_touches_nothing() {
    let (remote, store) = setup();
    let before = stored(&remote);

    let err = store
        .rename("Avvika", "avvika2", "leo@powercommerce.com")
        .expect_err("collision");
    assert!(matches!(err, DeskError::Conflict(_)));

    assert_eq!(remote.store_count(), 0);
    let after = stored(&remote);
    assert_eq!(before, after);
}

#[test]
fn rename_keeps_id_and_records_client_change() {
    let (remote, store) = setup();
    let outcome = store
        .rename("AVVIKA", "Avvika Labs", "leo@powercommerce.com")
        .expect("rename");
    assert_eq!(outcome.project.id, "prj-avvika");
    assert_eq!(outcome.entry.changes["client"], FieldChange::new("Avvika", "Avvika Labs"));

    let doc = stored(&remote);
    assert!(doc.find("Avvika").is_none());
    let renamed = doc.find("avvika labs").expect("renamed");
    assert_eq!(renamed.id, "prj-avvika");
    assert!(renamed.history[0].is_rename());
    assert_eq!(doc.config.channel_map["C-AVVIKA"].client, "Avvika Labs");
}

#[test]
fn lookups_ignore_case() {
    let (_, store) = setup();
    let ids: Vec<String> = ["avvika", "Avvika", "AVVIKA", "  aVvIkA "]
        .iter()
        .map(|name| store.find_by_client(name).expect("found").id)
        .collect();
    assert!(ids.iter().all(|id| id == "prj-avvika"));
}

#[test]
fn interleaved_updates_to_different_projects_both_survive() {
    let remote = Arc::new(MemoryDocumentClient::with_content(SEED));
    let ours = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));
    let theirs = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));

    // The other writer lands between our fetch and our store.
    remote.before_next_store(move || {
        theirs
            .apply_update(
                "Zeta",
                &ProjectPatch::new().set(TrackedField::Status, "Blocked"),
                "ana@powercommerce.com",
            )
            .expect("racing update");
    });

    ours.apply_update(
        "Avvika",
        &ProjectPatch::new().set(TrackedField::Status, "Completed"),
        "leo@powercommerce.com",
    )
    .expect("our update");

    let doc = stored(&remote);
    assert_eq!(doc.find("Avvika").expect("avvika").get(TrackedField::Status), "Completed");
    assert_eq!(doc.find("Zeta").expect("zeta").get(TrackedField::Status), "Blocked");
    assert_eq!(doc.find("Zeta").expect("zeta").history[0].user, "ana@powercommerce.com");
}

#[test]
fn racing_creates_on_an_empty_remote_both_survive() {
    let remote = Arc::new(MemoryDocumentClient::new());
    let ours = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));
    let theirs = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));

    remote.before_next_store(move || {
        theirs
            .create("Zeta", &ProjectPatch::new(), "ana@powercommerce.com")
            .expect("racing create");
    });

    ours.create("Avvika", &ProjectPatch::new(), "leo@powercommerce.com")
        .expect("our create");

    let doc = stored(&remote);
    assert_eq!(doc.projects.len(), 2);
    assert!(doc.find("Zeta").is_some());
    assert!(doc.find("Avvika").is_some());
}

#[test]
fn update_that_became_noop_on_fresh_data_records_nothing() {
    let remote = Arc::new(MemoryDocumentClient::with_content(SEED));
    let ours = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));
    let theirs = ProjectStore::new(remote.clone()).with_clock(Arc::new(noon));

    remote.before_next_store(move || {
        theirs
            .apply_update(
                "Avvika",
                &ProjectPatch::new().set(TrackedField::Owner, "Mia"),
                "ana@powercommerce.com",
            )
            .expect("racing update");
    });

    // Our update sets the same owner the racer just wrote.
    let outcome = ours
        .apply_update(
            "Avvika",
            &ProjectPatch::new().set(TrackedField::Owner, "Mia"),
            "leo@powercommerce.com",
        )
        .expect("our update");

    assert!(outcome.entry.is_none());
    let history = &stored(&remote).find("Avvika").expect("avvika").history.clone();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user, "ana@powercommerce.com");
}

#[test]
fn created_project_round_trips_through_the_document() {
    let (remote, store) = setup();
    let created = store
        .create(
            "Northwind",
            &ProjectPatch::new().set(TrackedField::Owner, "Leo").notes("warm lead"),
            "leo@powercommerce.com",
        )
        .expect("create");
    for status in ["Kickoff", "Design", "Build"] {
        store
            .apply_update(
                "northwind",
                &ProjectPatch::new().set(TrackedField::Status, status),
                "leo@powercommerce.com",
            )
            .expect("update");
    }

    let doc = stored(&remote);
    let reloaded = Document::parse(&doc.to_json().expect("encode")).expect("reparse");
    assert_eq!(doc, reloaded);

    let northwind = reloaded.find("Northwind").expect("northwind");
    assert_eq!(northwind.id, created.id);
    assert_eq!(northwind.history.len(), 3);
    assert_eq!(northwind.history[0].changes["status"].new, "Build");
    assert_eq!(northwind.internal_notes.as_deref(), Some("warm lead"));
}

#[test]
fn missing_project_is_not_found_and_unwritten() {
    let (remote, store) = setup();
    let err = store
        .apply_update(
            "Ghost",
            &ProjectPatch::new().set(TrackedField::Status, "x"),
            "leo@powercommerce.com",
        )
        .expect_err("missing");
    assert!(matches!(err, DeskError::NotFound { .. }));
    assert_eq!(remote.store_count(), 0);
    assert!(remote.fetch().expect("fetch").is_some());
}
