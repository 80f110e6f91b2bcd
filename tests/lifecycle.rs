//! Client lifecycle E2E tests over in-memory transports.


use std::time::Duration;

use tower_lsp::lsp_types::{FileChangeType, FileEvent, Url};

use earthlyls_client::client::session::SessionState;
use earthlyls_client::error::ClientError;
use helper::{start_pair, wait_for_notification};

#[tokio::test]
async fn deactivate_before_activate_is_a_noop() {
    assert!(earthlyls_client::deactivate(None).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn start_then_stop_is_a_clean_shutdown() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    assert_eq!(session.state(), SessionState::Inactive);

    session.start().unwrap();
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);

    // stop() only guarantees the exit frame is flushed; wait for the scripted
    // server to have read and logged it before asserting counts.
    wait_for_notification(&log, "exit", Duration::from_secs(5))
        .await
        .expect("expected the exit notification");

    let log = log.lock().unwrap();
    assert_eq!(log.initialize, 1);
    assert_eq!(log.shutdown, 1);
    assert_eq!(log.notification_count("initialized"), 1);
    assert_eq!(log.notification_count("exit"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_carries_workspace_and_identity() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.start().unwrap();
    // initialized is only sent after the initialize response arrives
    wait_for_notification(&log, "initialized", Duration::from_secs(5))
        .await
        .expect("expected the initialized notification");

    let log = log.lock().unwrap();
    let params = log.initialize_params.as_ref().unwrap();
    assert_eq!(params["rootUri"], Url::from_file_path(workspace.path()).unwrap().as_str());
    assert_eq!(params["clientInfo"]["name"], "earthlyls");
    assert_eq!(log.initialize, 1);
    assert_eq!(log.notification_count("initialized"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn workspace_with_spaces_yields_a_valid_root_uri() {
    let temp = tempfile::tempdir().unwrap();
    let workspace = temp.path().join("my project");
    std::fs::create_dir(&workspace).unwrap();
    let (mut session, log) = start_pair(&workspace);
    session.start().unwrap();

    wait_for_notification(&log, "initialized", Duration::from_secs(5))
        .await
        .expect("expected the initialized notification");

    let log = log.lock().unwrap();
    let params = log.initialize_params.as_ref().unwrap();
    let root_uri = params["rootUri"].as_str().unwrap();
    assert_eq!(root_uri, Url::from_file_path(&workspace).unwrap().as_str());
    assert!(root_uri.ends_with("/my%20project"));
    assert_eq!(params["workspaceFolders"][0]["uri"], root_uri);
}

#[tokio::test(flavor = "multi_thread")]
async fn double_start_is_rejected() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.start().unwrap();

    let second = session.start();
    assert!(matches!(second, Err(ClientError::AlreadyStarted)));

    // The first client is untouched.
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();
    session.stop().await.unwrap();
    let log = log.lock().unwrap();
    assert_eq!(log.initialize, 1);
    assert_eq!(log.shutdown, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_twice_issues_a_single_stop_request() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.start().unwrap();
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();

    session.stop().await.unwrap();
    session.stop().await.unwrap();

    assert_eq!(log.lock().unwrap().shutdown, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn watched_file_events_reach_the_server() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.start().unwrap();
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();

    let uri = Url::from_file_path(workspace.path().join("Earthfile")).unwrap();
    session
        .handle()
        .did_change_watched_files(vec![FileEvent::new(uri.clone(), FileChangeType::CREATED)])
        .unwrap();

    let params =
        wait_for_notification(&log, "workspace/didChangeWatchedFiles", Duration::from_secs(5))
            .await
            .expect("expected a didChangeWatchedFiles notification");
    assert_eq!(params["changes"][0]["uri"], uri.as_str());
    assert_eq!(params["changes"][0]["type"], 1);

    session.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial_test::serial]
async fn workspace_watcher_forwards_earthfile_creation() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.start().unwrap();
    session.watch().unwrap();
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();

    // Let the watcher drain its pre-Running backlog before touching files.
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(workspace.path().join("README.md"), "not watched").unwrap();
    std::fs::write(workspace.path().join("Earthfile"), "VERSION 0.8\n").unwrap();

    let params =
        wait_for_notification(&log, "workspace/didChangeWatchedFiles", Duration::from_secs(10))
            .await
            .expect("expected the Earthfile creation to be forwarded");
    let changes = params["changes"].as_array().unwrap();
    assert!(!changes.is_empty());
    for change in changes {
        assert!(change["uri"].as_str().unwrap().ends_with("/Earthfile"));
    }

    session.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial_test::serial]
async fn earthfile_created_right_after_running_is_forwarded() {
    let workspace = tempfile::tempdir().unwrap();
    let (mut session, log) = start_pair(workspace.path());
    session.watch().unwrap();
    session.start().unwrap();
    let mut state = session.subscribe();
    state.wait_for(|s| *s == SessionState::Running).await.unwrap();

    // No settling delay: an event raised once Running is observed must not
    // fall into the stale-event discard.
    std::fs::write(workspace.path().join("Earthfile"), "VERSION 0.8\n").unwrap();

    wait_for_notification(&log, "workspace/didChangeWatchedFiles", Duration::from_secs(10))
        .await
        .expect("expected the Earthfile creation to be forwarded");

    session.stop().await.unwrap();
}
