mod common;

use common::{db_file, Harness, DB_PATH};
use core_fs::{
    ConflictResolutionStrategy, FileSystemSyncProcessor, OperationError, OperationErrorKind,
    SyncProgressStatus, SyncStatus, SyncStrategy,
};
use core_runtime::events::{CoreEvent, FileSyncEvent};
use core_sync::{ProcessingStatus, ProcessingUnit};
use std::time::Duration;

#[tokio::test]
async fn remote_changes_are_downloaded() {
    let h = Harness::new().await;
    h.seed("rev1", false, b"old").await;
    h.server.put(DB_PATH, b"new", "rev2");

    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::RemoteChanges
    );

    let synced = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();

    assert_eq!(synced.uid, DB_PATH);
    let row = h.row().await.unwrap();
    assert_eq!(row.revision.as_deref(), Some("rev2"));
    assert!(!row.is_locally_modified);
    assert_eq!(row.last_download_timestamp, Some(1_000));
    assert_eq!(h.local_content().await, b"new");
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::NoChanges
    );
}

#[tokio::test]
async fn local_changes_are_uploaded() {
    let h = Harness::new().await;
    h.seed("rev1", true, b"edited").await;
    h.server.put(DB_PATH, b"old", "rev1");

    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::LocalChanges
    );

    h.processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();

    let server_revision = h.server.revision(DB_PATH).unwrap();
    assert_ne!(server_revision, "rev1");
    assert_eq!(h.server.content(DB_PATH).unwrap(), b"edited");

    let row = h.row().await.unwrap();
    assert_eq!(row.revision, Some(server_revision));
    assert!(!row.is_locally_modified);
    assert!(row.is_uploaded);
}

#[tokio::test]
async fn conflict_needs_a_resolution() {
    let h = Harness::new().await;
    h.seed("rev1", true, b"local").await;
    h.server.put(DB_PATH, b"remote", "rev2");

    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::Conflict
    );

    let err = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, OperationErrorKind::Conflict);
    assert_eq!(h.server.downloads(), 0);
    assert_eq!(h.server.uploads(), 0);

    let conflict = h
        .processor
        .get_sync_conflict_for_file(&db_file())
        .await
        .unwrap();
    assert_eq!(conflict.local_file.uid, DB_PATH);
    assert_eq!(conflict.remote_file.uid, DB_PATH);

    h.processor
        .process(
            &db_file(),
            SyncStrategy::default(),
            Some(ConflictResolutionStrategy::ResolveWithRemoteFile),
        )
        .await
        .unwrap();

    let row = h.row().await.unwrap();
    assert!(!row.is_locally_modified);
    assert_eq!(row.revision.as_deref(), Some("rev2"));
    assert_eq!(h.local_content().await, b"remote");
    assert!(h
        .processor
        .get_sync_conflict_for_file(&db_file())
        .await
        .is_err());
}

#[tokio::test]
async fn resolving_with_local_file_settles_status() {
    let h = Harness::new().await;
    h.seed("rev1", true, b"local").await;
    h.server.put(DB_PATH, b"remote", "rev2");

    h.processor
        .process(
            &db_file(),
            SyncStrategy::default(),
            Some(ConflictResolutionStrategy::ResolveWithLocalFile),
        )
        .await
        .unwrap();

    assert_eq!(h.server.content(DB_PATH).unwrap(), b"local");
    assert_eq!(h.row().await.unwrap().revision, h.server.revision(DB_PATH));
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::NoChanges
    );

    // Nothing left to do: a second pass transfers nothing.
    h.processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();
    assert_eq!(h.server.uploads(), 1);
}

#[tokio::test]
async fn failed_download_leaves_cache_row_untouched() {
    let h = Harness::new().await;
    let seeded = h.seed("rev1", false, b"old").await;
    h.server.put(DB_PATH, b"new", "rev2");
    h.server
        .fail_transfers_with(Some(OperationError::network_io("connection reset")));

    let err = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap_err();
    assert!(err.is_network_error());

    assert_eq!(h.row().await.unwrap(), seeded);
    assert_eq!(h.local_content().await, b"old");
    assert!(!h
        .processor
        .local_path(&db_file())
        .with_extension("kdbx.download")
        .exists());
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::RemoteChanges
    );
}

#[tokio::test]
async fn failed_upload_keeps_local_changes() {
    let h = Harness::new().await;
    let seeded = h.seed("rev1", true, b"edited").await;
    h.server.put(DB_PATH, b"old", "rev1");
    h.server
        .fail_transfers_with(Some(OperationError::network_io("timeout")));

    let err = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, OperationErrorKind::NetworkIo);
    assert_eq!(h.row().await.unwrap(), seeded);
    assert_eq!(h.server.content(DB_PATH).unwrap(), b"old");
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::LocalChanges
    );

    h.server.fail_with(Some(OperationError::network_io("offline")));
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::LocalChangesNoNetwork
    );
}

#[tokio::test]
async fn second_claim_is_rejected() {
    let h = Harness::new().await;
    h.server.put(DB_PATH, b"new", "rev1");

    let guard = h
        .processor
        .status_map()
        .try_put(ProcessingUnit::new(
            ProcessingStatus::Downloading,
            DB_PATH,
            DB_PATH,
        ))
        .unwrap();

    let err = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, OperationErrorKind::FileIsAlreadyInProcessing);
    assert_eq!(h.processor.status_map().len(), 1);
    assert_eq!(
        h.processor.get_sync_progress_status(DB_PATH),
        SyncProgressStatus::Downloading
    );

    drop(guard);
    assert_eq!(
        h.processor.get_sync_progress_status(DB_PATH),
        SyncProgressStatus::Idle
    );
}

#[tokio::test]
async fn processing_unit_is_released_on_every_outcome() {
    let h = Harness::new().await;
    h.server.put(DB_PATH, b"new", "rev1");

    // Success
    h.processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();
    assert!(h.processor.status_map().is_empty());

    // Typed error
    h.server.put(DB_PATH, b"newer", "rev2");
    h.server.fail_with(Some(OperationError::auth("401")));
    assert!(h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .is_err());
    assert!(h.processor.status_map().is_empty());
    h.server.fail_with(None);

    // Cancellation
    h.server.delay_downloads(Duration::from_secs(30));
    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        h.processor
            .process(&db_file(), SyncStrategy::default(), None),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(h.processor.status_map().is_empty());

    // Panic
    h.server.panic_on_download();
    let processor = h.processor.clone();
    let crashed = tokio::spawn(async move {
        processor
            .process(&db_file(), SyncStrategy::default(), None)
            .await
    })
    .await;
    assert!(crashed.unwrap_err().is_panic());
    assert!(h.processor.status_map().is_empty());
}

#[tokio::test]
async fn auth_and_missing_files_surface_as_status() {
    let h = Harness::new().await;
    h.seed("rev1", false, b"old").await;

    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::FileNotFound
    );

    h.server.put(DB_PATH, b"old", "rev1");
    h.server.fail_with(Some(OperationError::auth("401")));
    assert_eq!(
        h.processor.get_sync_status(&db_file()).await,
        SyncStatus::AuthError
    );
    let err = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, OperationErrorKind::Auth);
}

#[tokio::test]
async fn last_local_file_strategy_uploads_unsynced_copy() {
    let h = Harness::new().await;
    h.server.put(DB_PATH, b"remote", "rev1");

    let local = h.processor.local_path(&db_file());
    tokio::fs::create_dir_all(local.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&local, b"local").await.unwrap();

    h.processor
        .process(&db_file(), SyncStrategy::LastLocalFile, None)
        .await
        .unwrap();

    assert_eq!(h.server.content(DB_PATH).unwrap(), b"local");
    assert_eq!(h.row().await.unwrap().revision, h.server.revision(DB_PATH));
}

#[tokio::test]
async fn locally_modified_files_are_listed() {
    let h = Harness::new().await;
    h.seed("rev1", true, b"edited").await;

    let files = h.processor.get_locally_modified_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].uid, DB_PATH);
    assert_eq!(files[0].fs_authority, common::authority());
}

#[tokio::test]
async fn sync_events_are_published() {
    let h = Harness::new().await;
    let mut events = h.events.subscribe();
    h.seed("rev1", true, b"local").await;
    h.server.put(DB_PATH, b"remote", "rev2");

    let _ = h
        .processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await;

    let mut received = Vec::new();
    while let Ok(CoreEvent::FileSync(event)) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(received[0], FileSyncEvent::Started { .. }));
    assert!(received
        .iter()
        .any(|e| matches!(e, FileSyncEvent::ConflictDetected { .. })));
    assert!(matches!(
        received.last(),
        Some(FileSyncEvent::Failed { kind, .. }) if kind == "Conflict"
    ));
}

#[tokio::test]
async fn completed_event_names_the_status_acted_on() {
    let h = Harness::new().await;
    let mut events = h.events.subscribe();
    h.seed("rev1", true, b"local").await;
    h.server.put(DB_PATH, b"old", "rev1");

    h.processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();

    let mut completed = Vec::new();
    while let Ok(CoreEvent::FileSync(event)) = events.try_recv() {
        if let FileSyncEvent::Completed {
            status, revision, ..
        } = event
        {
            completed.push((status, revision));
        }
    }

    assert_eq!(
        completed,
        vec![("LocalChanges".to_string(), h.server.revision(DB_PATH))]
    );

    h.server.put(DB_PATH, b"remote", "rev9");
    h.processor
        .process(&db_file(), SyncStrategy::default(), None)
        .await
        .unwrap();
    match events.try_recv() {
        Ok(CoreEvent::FileSync(FileSyncEvent::Started { .. })) => {}
        other => panic!("unexpected event: {:?}", other),
    }
    match events.try_recv() {
        Ok(CoreEvent::FileSync(FileSyncEvent::Completed {
            status, revision, ..
        })) => {
            assert_eq!(status, "RemoteChanges");
            assert_eq!(revision.as_deref(), Some("rev9"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
