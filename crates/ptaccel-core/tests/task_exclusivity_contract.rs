//! Contract Test: Heavy Task Exclusivity
//!
//! Constraints verified:
//! - At most one heavy task runs at a time; a second request is rejected
//! - A rejection leaves the running status untouched
//! - Status reads never wait on the running task
//! - Every finished task releases the slot and sends one notification
//! - A task whose future is dropped mid-run is not left `running`
//!
//! If this test fails, two speed tests can race on the hosts file.

mod common;

use common::*;
use ptaccel_core::traits::ConfigStore;
use ptaccel_core::{
    ConfigDocument, Error, HeavyTasks, MemoryConfigStore, NotificationDispatcher, TaskKind,
    TaskOrchestrator, TaskState,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    orchestrator: TaskOrchestrator,
    heavy: HeavyTasks,
    transport: Arc<RecordingTransport>,
    tester: Arc<MockSpeedTester>,
}

async fn fixture(tester: MockSpeedTester) -> Fixture {
    let store = MemoryConfigStore::new();
    let mut doc = ConfigDocument::new();
    doc.notify = notify_with_bark();
    store.save(&doc).await.unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let tester = Arc::new(tester);
    let orchestrator = TaskOrchestrator::new(
        Arc::new(store.clone()),
        NotificationDispatcher::new(transport.clone()),
    );
    let heavy = HeavyTasks::new(
        Arc::new(store.clone()),
        tester.clone(),
        Arc::new(MockHostsWriter::new()),
    );
    Fixture {
        orchestrator,
        heavy,
        transport,
        tester,
    }
}

#[tokio::test]
async fn second_request_is_rejected_while_running() {
    let f = fixture(MockSpeedTester::returning(ip("104.16.0.9")).with_delay(Duration::from_millis(300))).await;

    let orchestrator = f.orchestrator.clone();
    let heavy = f.heavy.clone();
    let first = tokio::spawn(async move { heavy.run(&orchestrator, TaskKind::SpeedTestAndHosts).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.orchestrator.is_busy());
    let before = f.orchestrator.status();
    assert_eq!(before.status, TaskState::Running);

    let err = f.heavy.run(&f.orchestrator, TaskKind::UpdateHosts).await.unwrap_err();
    assert!(matches!(err, Error::TaskAlreadyRunning(_)));
    assert_eq!(f.orchestrator.status(), before, "rejection must not touch the status");

    let finished = first.await.unwrap().unwrap();
    assert_eq!(finished.status, TaskState::Done);
    assert!(finished.message.starts_with("Cloudflare优选完成！IP: 104.16.0.9"));
    assert!(!f.orchestrator.is_busy());
    assert_eq!(f.tester.call_count(), 1);
    assert_eq!(f.transport.send_count(), 1, "exactly one notification per task");
}

#[tokio::test]
async fn status_read_does_not_block() {
    let f = fixture(MockSpeedTester::returning(ip("104.16.0.9")).with_delay(Duration::from_millis(500))).await;

    let orchestrator = f.orchestrator.clone();
    let heavy = f.heavy.clone();
    let running = tokio::spawn(async move { heavy.run(&orchestrator, TaskKind::SpeedTestAndHosts).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = tokio::time::timeout(Duration::from_millis(20), async { f.orchestrator.status() })
        .await
        .expect("status read returns immediately");
    assert_eq!(status.message, "正在运行Cloudflare优选脚本");

    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn slot_is_released_after_failure() {
    let f = fixture(MockSpeedTester::failing()).await;

    let status = f.heavy.run(&f.orchestrator, TaskKind::SpeedTestAndHosts).await.unwrap();
    assert_eq!(status.message, "定时任务失败: 优选失败: 未能提取到最优IP");

    let (title, content, _) = f.transport.sent().remove(0);
    assert_eq!(title, "🚀 IP优选与Hosts更新");
    assert!(content.starts_with("❌ 定时任务失败"));

    // the slot is free again
    let again = f.heavy.run(&f.orchestrator, TaskKind::UpdateHosts).await.unwrap();
    assert_eq!(again.message, "已完成hosts更新，添加了0条记录");
    assert_eq!(f.transport.send_count(), 2);
}

#[tokio::test]
async fn panicking_body_still_releases_slot() {
    let f = fixture(MockSpeedTester::failing()).await;

    let orchestrator = f.orchestrator.clone();
    let joined = tokio::spawn(async move {
        orchestrator
            .run_heavy_task(TaskKind::UpdateHosts, |_| async {
                let nothing: Vec<u8> = Vec::new();
                if nothing.is_empty() {
                    panic!("body exploded");
                }
                Ok(String::new())
            })
            .await
    })
    .await;

    assert!(joined.is_err());
    assert!(!f.orchestrator.is_busy());
    let status = f.orchestrator.status();
    assert_eq!(status.status, TaskState::Done);
    assert!(status.message.starts_with("更新hosts失败"));
}

#[tokio::test]
async fn dropped_task_future_resets_status() {
    let f = fixture(MockSpeedTester::failing()).await;

    let task = f
        .orchestrator
        .run_heavy_task(TaskKind::SpeedTestAndHosts, |progress| async move {
            progress.report("正在测速");
            std::future::pending::<()>().await;
            Ok(String::new())
        });
    let timed_out = tokio::time::timeout(Duration::from_millis(50), task).await;
    assert!(timed_out.is_err());

    assert!(!f.orchestrator.is_busy());
    let status = f.orchestrator.status();
    assert_eq!(status.status, TaskState::Done);
    assert_eq!(status.message, "定时任务失败: 任务异常终止");
    assert_eq!(f.transport.send_count(), 0);

    // the slot is usable again
    f.orchestrator
        .run_heavy_task(TaskKind::UpdateHosts, |_| async { Ok("已完成hosts更新".to_string()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn observers_see_the_final_status() {
    let f = fixture(MockSpeedTester::returning(ip("104.16.0.1"))).await;
    let mut rx = f.orchestrator.subscribe();

    f.heavy.run(&f.orchestrator, TaskKind::ClearAndUpdateHosts).await.unwrap();

    rx.changed().await.unwrap();
    let seen = rx.borrow_and_update().clone();
    assert_eq!(seen.status, TaskState::Done);
    assert!(seen.message.starts_with("已完成清空并更新hosts"));
}
