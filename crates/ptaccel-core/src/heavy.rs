//! Heavy task bodies
//!
//! Each body runs its steps strictly in order and stops at the first
//! failure. They are meant to be handed to
//! [`TaskOrchestrator::run_heavy_task`], which [`HeavyTasks::run`] does.

use std::sync::Arc;

use crate::error::Result;
use crate::task::{TaskKind, TaskOrchestrator, TaskProgress, TaskStatus};
use crate::tracker::TrackerRegistry;
use crate::traits::{ConfigStore, HostsWriter, SpeedTester};

/// The three heavy task bodies wired to their collaborators
#[derive(Clone)]
pub struct HeavyTasks {
    store: Arc<dyn ConfigStore>,
    trackers: TrackerRegistry,
    speed_tester: Arc<dyn SpeedTester>,
    hosts: Arc<dyn HostsWriter>,
}

impl HeavyTasks {
    /// Create the task bodies
    pub fn new(
        store: Arc<dyn ConfigStore>,
        speed_tester: Arc<dyn SpeedTester>,
        hosts: Arc<dyn HostsWriter>,
    ) -> Self {
        Self {
            trackers: TrackerRegistry::new(Arc::clone(&store))
                .with_speed_tester(Arc::clone(&speed_tester)),
            store,
            speed_tester,
            hosts,
        }
    }

    /// Run the body for `kind` under `orchestrator`
    pub async fn run(&self, orchestrator: &TaskOrchestrator, kind: TaskKind) -> Result<TaskStatus> {
        match kind {
            TaskKind::SpeedTestAndHosts => {
                orchestrator
                    .run_heavy_task(kind, |progress| self.speed_test_and_sync(progress))
                    .await
            }
            TaskKind::UpdateHosts => {
                orchestrator
                    .run_heavy_task(kind, |progress| self.update_hosts(progress))
                    .await
            }
            TaskKind::ClearAndUpdateHosts => {
                orchestrator
                    .run_heavy_task(kind, |progress| self.clear_and_update_hosts(progress))
                    .await
            }
        }
    }

    /// Select the best IP, move every tracker to it and rewrite hosts
    pub async fn speed_test_and_sync(&self, progress: TaskProgress) -> Result<String> {
        progress.report("正在运行Cloudflare优选脚本");
        let ip = self.speed_tester.select_best_ip().await?;

        progress.report("正在处理PT站点条目");
        let updated = self.trackers.bulk_set_ip(&ip.to_string()).await?;

        progress.report("正在更新系统hosts文件");
        let doc = self.store.load().await?;
        let entries = self.hosts.rewrite(&doc).await?;

        Ok(format!(
            "Cloudflare优选完成！IP: {}，已更新 {} 个Tracker和 {} 条hosts记录",
            ip, updated, entries
        ))
    }

    /// Rewrite hosts from the current document
    pub async fn update_hosts(&self, progress: TaskProgress) -> Result<String> {
        progress.report("正在生成最终hosts条目");
        let doc = self.store.load().await?;
        let entries = self.hosts.rewrite(&doc).await?;
        Ok(format!("已完成hosts更新，添加了{}条记录", entries))
    }

    /// Drop every managed section, then rewrite hosts
    pub async fn clear_and_update_hosts(&self, progress: TaskProgress) -> Result<String> {
        progress.report("正在清空hosts中的加速条目");
        self.hosts.clear_managed_sections().await?;

        progress.report("正在生成最终hosts条目");
        let doc = self.store.load().await?;
        let entries = self.hosts.rewrite(&doc).await?;
        Ok(format!("已完成清空并更新hosts，添加了{}条记录", entries))
    }
}
