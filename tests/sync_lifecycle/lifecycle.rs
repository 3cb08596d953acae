//! Open, capture, sweep, shutdown and reopen

use crate::TestSync;
use datasync::{
    BackendKind, DataSyncConfig, DeserializeOutcome, OwnerQuery, RetentionPolicy, Subject,
    SweepScope, CONFIG_FILE_NAME,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_first_open_writes_default_config() {
    let t = TestSync::new();
    assert!(t.dir.path().join(CONFIG_FILE_NAME).exists());
    assert_eq!(t.sync.config(), DataSyncConfig::default());
    assert_eq!(t.sync.config().backend_kind(), BackendKind::Document);
    assert_eq!(t.sync.engine().retention(), RetentionPolicy::KeepAll);
    assert_eq!(t.sync.data_dir(), Some(t.dir.path()));
}

#[tokio::test]
async fn test_history_survives_reopen() {
    for backend in ["document", "embedded"] {
        let t = TestSync::with_config(Some(&format!("backend = \"{}\"\n", backend)));
        let subject = t.join("nia", 42);
        let user = subject.user_id();

        t.sync.engine().optimize_all("Manual").unwrap();
        t.sync.engine().wait_idle().await;
        // No owner existed yet, so the full sweep had nothing to visit
        assert_eq!(t.sync.engine().last_summary().unwrap().stats.members_total, 0);

        t.sync.engine().optimize_users(vec![user], "Manual").unwrap();
        t.sync.engine().wait_idle().await;

        let t = t.reopen().await;
        let ids = t
            .sync
            .snapshots()
            .get_snapshot_ids(OwnerQuery::ByUser(user))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1, "{}", backend);

        subject.set(datasync::DataKey::TotalExperience, json!(0));
        let outcome = t.sync.user_serializer().deserialize(subject.clone()).await.unwrap();
        assert!(matches!(outcome, DeserializeOutcome::Restored(_)));
        assert_eq!(subject.get(datasync::DataKey::TotalExperience), Some(json!(42)));
    }
}

#[tokio::test]
async fn test_sweep_prunes_to_configured_history() {
    let t = TestSync::with_config(Some(
        "backend = \"embedded\"\n\n[optimization]\nretention = \"keep_last\"\nkeep_last = 2\n",
    ));
    let subject = t.join("ola", 7);
    let user = subject.user_id();
    for _ in 0..4 {
        t.sync
            .user_serializer()
            .serialize(subject.clone(), "Manual")
            .await
            .unwrap();
    }

    t.sync.engine().optimize_all("Manual").unwrap();
    t.sync.engine().wait_idle().await;

    let summary = t.sync.engine().last_summary().unwrap();
    assert_eq!(summary.scope, SweepScope::Full);
    assert_eq!(summary.stats.snapshots_uploaded, 1);
    assert_eq!(summary.stats.snapshots_deleted, 3);
    assert_eq!(
        t.sync
            .snapshots()
            .get_snapshot_ids(OwnerQuery::ByUser(user))
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_locked_users_untouched_by_full_sweep() {
    let t = TestSync::new();
    let kept = t.join("pia", 1);
    let locked = t.join("quin", 2);
    for subject in [&kept, &locked] {
        let subject: Arc<dyn Subject> = (*subject).clone();
        t.sync.user_serializer().serialize(subject, "Manual").await.unwrap();
    }
    assert!(t.sync.locks().lock(locked.user_id()));
    assert_eq!(t.sync.locks().locked(), vec![locked.user_id()]);

    t.sync.engine().optimize_all("Manual").unwrap();
    t.sync.engine().wait_idle().await;

    let count = |user| {
        let snapshots = t.sync.snapshots().clone();
        async move {
            snapshots
                .get_snapshot_ids(OwnerQuery::ByUser(user))
                .await
                .unwrap()
                .len()
        }
    };
    assert_eq!(count(kept.user_id()).await, 2);
    assert_eq!(count(locked.user_id()).await, 1);

    assert!(t.sync.locks().unlock(locked.user_id()));
    assert!(!t.sync.locks().is_locked(locked.user_id()));
}

#[tokio::test]
async fn test_auto_task_follows_interval() {
    let t = TestSync::new();
    assert!(!t.sync.start_auto_task().unwrap());
    assert!(!t.sync.auto_task_running());

    let t = TestSync::with_config(Some("[optimization]\nauto_interval_minutes = 30\n"));
    assert!(t.sync.start_auto_task().unwrap());
    assert!(t.sync.auto_task_running());

    t.sync.shutdown().await.unwrap();
    assert!(!t.sync.auto_task_running());
}

#[test]
fn test_auto_task_requires_runtime() {
    let t = TestSync::with_config(Some("[optimization]\nauto_interval_minutes = 30\n"));
    assert!(t.sync.start_auto_task().is_err());
}
