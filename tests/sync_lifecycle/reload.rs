//! Runtime configuration changes

use crate::TestSync;
use datasync::serializer::modules;
use datasync::storage::DocumentBackend;
use datasync::{
    BackendKind, DataSync, DataSyncConfig, Error, RetentionPolicy, SubjectDirectory,
};
use std::sync::Arc;

#[tokio::test]
async fn test_reload_applies_modules_and_retention() {
    let t = TestSync::new();
    assert_eq!(t.sync.pipeline().enabled_names().len(), modules::BUILTIN_NAMES.len());

    t.rewrite_config(
        r#"
[serialize]
enabled = ["datasync:health"]

[optimization]
retention = "keep_last"
keep_last = 3
"#,
    );
    t.sync.reload().unwrap();

    assert_eq!(t.sync.pipeline().enabled_names(), vec![modules::HEALTH.to_string()]);
    assert_eq!(t.sync.engine().retention(), RetentionPolicy::KeepLast(3));
    assert_eq!(t.sync.config().optimization.keep_last, 3);
}

#[tokio::test]
async fn test_invalid_reload_keeps_previous_config() {
    let t = TestSync::new();
    t.rewrite_config("[optimization]\nretention = \"sometimes\"\n");

    let err = t.sync.reload().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(t.sync.config(), DataSyncConfig::default());
    assert_eq!(t.sync.engine().retention(), RetentionPolicy::KeepAll);
}

#[tokio::test]
async fn test_backend_change_waits_for_restart() {
    let t = TestSync::new();
    t.rewrite_config("backend = \"embedded\"\n");
    t.sync.reload().unwrap();
    assert_eq!(t.sync.config().backend_kind(), BackendKind::Document);

    let t = t.reopen().await;
    assert_eq!(t.sync.config().backend_kind(), BackendKind::Embedded);
}

#[tokio::test]
async fn test_reload_reschedules_auto_task() {
    let t = TestSync::with_config(Some("[optimization]\nauto_interval_minutes = 10\n"));
    assert!(t.sync.start_auto_task().unwrap());

    t.rewrite_config("[optimization]\nauto_interval_minutes = 0\n");
    t.sync.reload().unwrap();
    assert!(!t.sync.auto_task_running());
}

#[test]
fn test_reload_without_data_dir() {
    let backend = Arc::new(DocumentBackend::in_memory().unwrap());
    let sync = DataSync::with_backend(
        backend,
        DataSyncConfig::default(),
        Arc::new(SubjectDirectory::new()),
    )
    .unwrap();
    assert!(matches!(sync.reload(), Err(Error::InvalidOperation(_))));
}
