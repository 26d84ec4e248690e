//! Command implementations
//!
//! [`App`] wires the plugin crates into the core engine once per invocation.
//! Commands that change trackers or hosts sources rewrite the hosts file
//! afterwards; a failed rewrite is logged and does not undo the change.
//! Heavy tasks run under the cross-process [`TaskLock`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use ptaccel_cloudflare::{CloudflareDetector, ScriptSpeedTester};
use ptaccel_core::config::{ClientKind, NotifyConfig, TorrentClientConfig};
use ptaccel_core::notify::Outcome;
use ptaccel_core::tracker::split_batch;
use ptaccel_core::{
    ClientRegistry, CloudflareReconciler, ConfigStore, FileConfigStore, HeavyTasks,
    HostsSourceRegistry, HostsWriter, ImportPipeline, NotificationDispatcher, NotifyUpdate,
    SettingsRegistry, TaskKind, TaskOrchestrator, TaskStatus, TrackerEntry, TrackerRegistry,
};
use ptaccel_hosts::{HostsFileWriter, SourceFetcher};
use ptaccel_notify::HttpNotifier;

use crate::lock::TaskLock;
use crate::{ClientCommand, Command, Config, NotifyCommand, WhitelistCommand};

/// Engine components for one invocation
pub struct App {
    store: Arc<dyn ConfigStore>,
    hosts: Arc<dyn HostsWriter>,
    clients: ClientRegistry,
    trackers: TrackerRegistry,
    sources: HostsSourceRegistry,
    settings: SettingsRegistry,
    reconciler: CloudflareReconciler,
    dispatcher: NotificationDispatcher,
    orchestrator: TaskOrchestrator,
    heavy: HeavyTasks,
    lock_path: PathBuf,
    json: bool,
}

impl App {
    /// Open the configuration store and construct every collaborator
    pub async fn build(config: &Config, json: bool) -> Result<Self> {
        let store: Arc<dyn ConfigStore> = Arc::new(
            FileConfigStore::open(&config.config_path)
                .await
                .with_context(|| format!("opening {}", config.config_path.display()))?,
        );

        let fetcher = SourceFetcher::new().with_cache_dir(config.hosts_cache_dir());
        let hosts: Arc<dyn HostsWriter> =
            Arc::new(HostsFileWriter::new(&config.hosts_path).with_fetcher(fetcher));
        let speed_tester = Arc::new(
            ScriptSpeedTester::new(&config.cfst_script)
                .with_state_file(config.best_ip_path())
                .await,
        );
        let classifier = Arc::new(CloudflareDetector::new());

        let clients = ClientRegistry::new();
        ptaccel_clients::register(&clients);

        let dispatcher = NotificationDispatcher::new(Arc::new(HttpNotifier::new()));
        let orchestrator = TaskOrchestrator::new(Arc::clone(&store), dispatcher.clone());

        Ok(Self {
            trackers: TrackerRegistry::new(Arc::clone(&store))
                .with_speed_tester(speed_tester.clone()),
            sources: HostsSourceRegistry::new(Arc::clone(&store)),
            settings: SettingsRegistry::new(Arc::clone(&store)),
            reconciler: CloudflareReconciler::new(Arc::clone(&store), classifier),
            heavy: HeavyTasks::new(Arc::clone(&store), speed_tester, Arc::clone(&hosts)),
            store,
            hosts,
            clients,
            dispatcher,
            orchestrator,
            lock_path: config.task_lock_path(),
            json,
        })
    }

    /// Run `command`
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::RunTask { scheduled } => {
                if scheduled && !self.store.load().await?.cloudflare.enable {
                    info!("Scheduled speed test is disabled, skipping");
                    self.emit(&TaskStatus::done("定时优选已关闭，跳过本次任务"), |s| s.message.clone());
                    return Ok(());
                }
                self.run_task(TaskKind::SpeedTestAndHosts).await
            }
            Command::UpdateHosts => self.run_task(TaskKind::UpdateHosts).await,
            Command::ClearAndUpdateHosts => self.run_task(TaskKind::ClearAndUpdateHosts).await,
            Command::Import => self.import().await,
            Command::AddTracker {
                domain,
                name,
                force_cloudflare,
            } => {
                let entry = TrackerEntry {
                    name: name.unwrap_or_default(),
                    ..TrackerEntry::new(domain, "")
                };
                let added = self.trackers.add_tracker(entry, force_cloudflare).await?;
                self.emit(&added, |t| format!("已添加 {} ({})", t.domain, t.ip));
                self.refresh_hosts().await;
                Ok(())
            }
            Command::DeleteTracker { domain } => {
                let removed = self.trackers.delete_tracker(&domain).await?;
                self.emit(&Count { count: removed }, |c| {
                    format!("已删除 {} 个Tracker", c.count)
                });
                self.refresh_hosts().await;
                Ok(())
            }
            Command::BatchAdd { domains, file } => {
                let mut domains = domains;
                if let Some(path) = file {
                    domains.extend(read_domain_file(&path).await?);
                }
                let report = self.trackers.batch_add(domains.as_slice()).await?;
                self.emit(&report, |r| r.message());
                if !report.added.is_empty() {
                    self.refresh_hosts().await;
                }
                Ok(())
            }
            Command::SetIp { ip } => {
                let updated = self.trackers.bulk_set_ip(&ip).await?;
                self.emit(&Count { count: updated }, |c| {
                    format!("已将 {} 个Tracker的IP更新为 {}", c.count, ip.trim())
                });
                self.refresh_hosts().await;
                Ok(())
            }
            Command::ClearTrackers => {
                self.trackers.clear_all().await?;
                self.emit(&Count { count: 0 }, |_| "已清空所有Tracker".to_string());
                self.refresh_hosts().await;
                Ok(())
            }
            Command::ListTrackers => {
                let trackers = self.trackers.list().await?;
                self.emit(&trackers, |list| {
                    list.iter()
                        .map(|t| {
                            format!(
                                "{}\t{}\t{}{}",
                                t.ip,
                                t.domain,
                                t.name,
                                if t.enable { "" } else { "\t(disabled)" }
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                Ok(())
            }
            Command::AddSource { url, name } => {
                let source = self
                    .sources
                    .add_source(name.as_deref().unwrap_or_default(), &url)
                    .await?;
                self.emit(&source, |s| format!("已添加hosts源 {} ({})", s.name, s.url));
                self.refresh_hosts().await;
                Ok(())
            }
            Command::DeleteSource { url } => {
                let removed = self.sources.delete_source(&url).await?;
                self.emit(&Count { count: removed }, |c| {
                    format!("已删除 {} 个hosts源", c.count)
                });
                self.refresh_hosts().await;
                Ok(())
            }
            Command::Whitelist { command } => {
                let whitelist = match command {
                    WhitelistCommand::Add { domain } => {
                        self.reconciler.add_to_whitelist(&domain).await?
                    }
                    WhitelistCommand::Remove { domain } => {
                        self.reconciler.remove_from_whitelist(&domain).await?
                    }
                    WhitelistCommand::List => self.reconciler.whitelist().await?,
                };
                self.emit(&whitelist, |set| {
                    set.iter().cloned().collect::<Vec<_>>().join("\n")
                });
                Ok(())
            }
            Command::ShowHosts => {
                let content = self.hosts.read_current_hosts().await?;
                self.emit(&content, |c| c.trim_end().to_string());
                Ok(())
            }
            Command::Client { command } => self.client(command).await,
            Command::Cloudflare { enable, cron } => {
                let settings = if enable.is_none() && cron.is_none() {
                    self.settings.cloudflare().await?
                } else {
                    self.settings.set_cloudflare(enable, cron.as_deref()).await?
                };
                self.emit(&settings, |s| {
                    format!(
                        "定时优选: {}\nCRON: {}",
                        if s.enable { "开启" } else { "关闭" },
                        s.cron
                    )
                });
                Ok(())
            }
            Command::Notify { command } => self.notify(command).await,
        }
    }

    async fn client(&self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Add {
                id,
                kind,
                host,
                port,
                name,
                username,
                password,
                https,
                path,
                disabled,
            } => {
                if !self.clients.has_client(kind.trim()) {
                    anyhow::bail!(
                        "不支持的客户端类型: {} (支持: {})",
                        kind,
                        self.supported_types().join(", ")
                    );
                }
                let client = TorrentClientConfig {
                    id,
                    name: name.unwrap_or_default(),
                    kind: kind.parse::<ClientKind>()?,
                    host,
                    port,
                    username,
                    password,
                    use_https: https,
                    path,
                    enable: !disabled,
                };
                let added = ClientView::from(&self.settings.add_client(client).await?);
                self.emit(&added, |c| {
                    format!("已添加客户端 {} ({} {})", c.name, c.kind, c.url)
                });
                Ok(())
            }
            ClientCommand::Delete { id } => {
                let removed = ClientView::from(&self.settings.delete_client(&id).await?);
                self.emit(&removed, |c| format!("已删除客户端 {}", c.name));
                Ok(())
            }
            ClientCommand::Enable { id } => self.set_client_enabled(&id, true).await,
            ClientCommand::Disable { id } => self.set_client_enabled(&id, false).await,
            ClientCommand::List => {
                let clients = self.settings.clients().await?;
                let listing = ClientListing {
                    clients: clients.iter().map(ClientView::from).collect(),
                    supported_types: self.supported_types(),
                };
                self.emit(&listing, |l| {
                    let mut lines: Vec<String> = l
                        .clients
                        .iter()
                        .map(|c| {
                            format!(
                                "{}\t{}\t{}\t{}{}",
                                c.id,
                                c.kind,
                                c.url,
                                c.name,
                                if c.enable { "" } else { "\t(disabled)" }
                            )
                        })
                        .collect();
                    lines.push(format!("支持的类型: {}", l.supported_types.join(", ")));
                    lines.join("\n")
                });
                Ok(())
            }
            ClientCommand::Test { id } => {
                let client = self.settings.client(&id).await?;
                client.validate()?;
                let source = self.clients.create_source(&client)?;
                let domains = source
                    .list_tracker_domains()
                    .await
                    .with_context(|| format!("连接客户端 {} 失败", client.display_name()))?;
                let result = ConnectionTest {
                    id: client.id.clone(),
                    trackers: domains.len(),
                };
                self.emit(&result, |r| {
                    format!("客户端 {} 连接成功，发现 {} 个Tracker", r.id, r.trackers)
                });
                Ok(())
            }
        }
    }
    async fn set_client_enabled(&self, id: &str, enable: bool) -> Result<()> {
        let client = ClientView::from(&self.settings.set_client_enabled(id, enable).await?);
        self.emit(&client, |c| {
            format!("客户端 {} 已{}", c.name, if c.enable { "启用" } else { "停用" })
        });
        Ok(())
    }

    /// Registered client types, sorted
    fn supported_types(&self) -> Vec<String> {
        let mut types = self.clients.list_clients();
        types.sort();
        types
    }

    async fn notify(&self, command: NotifyCommand) -> Result<()> {
        match command {
            NotifyCommand::Show => {
                let notify = self.settings.notify().await?;
                self.emit(&notify, notify_summary);
                Ok(())
            }
            NotifyCommand::Set {
                enable,
                hitokoto,
                skip_titles,
                clear_skip_titles,
            } => {
                let skip_titles = if clear_skip_titles {
                    Some(Vec::new())
                } else if skip_titles.is_empty() {
                    None
                } else {
                    Some(skip_titles)
                };
                let notify = self
                    .settings
                    .update_notify(NotifyUpdate {
                        enable,
                        hitokoto,
                        skip_titles,
                    })
                    .await?;
                self.emit(&notify, notify_summary);
                Ok(())
            }
            NotifyCommand::Save { file } => {
                let content = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                let notify: NotifyConfig = serde_json::from_str(&content)
                    .with_context(|| format!("parsing {}", file.display()))?;
                let saved = self.settings.save_notify(notify).await?;
                self.emit(&saved, notify_summary);
                Ok(())
            }
            NotifyCommand::Channel {
                name,
                family,
                fields,
                enable,
                hitokoto,
            } => {
                let channel = self
                    .settings
                    .put_channel(&name, family.as_deref(), &fields, enable, hitokoto)
                    .await?;
                let missing = channel.kind().missing_fields();
                self.emit(&channel, |c| {
                    if missing.is_empty() {
                        format!("已保存渠道 {} ({})", name, c.family)
                    } else {
                        format!("已保存渠道 {} ({})，缺少字段: {}", name, c.family, missing.join(", "))
                    }
                });
                Ok(())
            }
            NotifyCommand::RemoveChannel { name } => {
                if !self.settings.remove_channel(&name).await? {
                    anyhow::bail!("通知渠道不存在: {}", name);
                }
                self.emit(&Count { count: 1 }, |_| format!("已删除渠道 {}", name));
                Ok(())
            }
            NotifyCommand::Test { title, content } => {
                let doc = self.store.load().await?;
                let report = self
                    .dispatcher
                    .send_test(&doc.notify, title.as_deref(), content.as_deref(), None)
                    .await?;
                self.emit(&report, |r| {
                    if let Some(message) = &r.skipped {
                        return message.clone();
                    }
                    let mut lines = vec![format!("已发送 {} 个渠道", r.delivered.len())];
                    lines.extend(r.failed.iter().map(|(name, e)| format!("{}: 失败({})", name, e)));
                    lines.join("\n")
                });
                if report.skipped.is_none() && report.delivered.is_empty() {
                    anyhow::bail!("所有通知渠道发送失败");
                }
                Ok(())
            }
        }
    }

    /// Run a heavy task; a failure message fails the command
    async fn run_task(&self, kind: TaskKind) -> Result<()> {
        let _lock = TaskLock::acquire(&self.lock_path)?;
        let status = self.heavy.run(&self.orchestrator, kind).await?;
        self.emit(&status, |s| s.message.clone());
        if Outcome::classify(&status.message) == Outcome::Failure {
            anyhow::bail!("{}", status.message);
        }
        Ok(())
    }

    async fn import(&self) -> Result<()> {
        let doc = self.store.load().await?;
        let enabled = self.clients.create_enabled_sources(&doc);
        if enabled.is_empty() {
            anyhow::bail!("没有已启用的下载客户端，请先使用 ptaccel client add 添加");
        }

        let pipeline = ImportPipeline::new(
            Arc::clone(&self.store),
            self.reconciler.clone(),
            Arc::clone(&self.hosts),
        );
        let report = pipeline.import_enabled(&enabled).await?;
        for failure in report.failures() {
            warn!("{}", failure);
        }
        self.emit(&report, |r| format!("{}\n{}", r.message, r.client_summary()));
        Ok(())
    }

    /// Rewrite hosts from the saved document
    async fn refresh_hosts(&self) {
        let doc = match self.store.load().await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Hosts not refreshed: {}", e);
                return;
            }
        };
        match self.hosts.rewrite(&doc).await {
            Ok(entries) => info!("Hosts refreshed with {} entries", entries),
            Err(e) => warn!("Hosts not refreshed: {}", e),
        }
    }

    /// Print `value` as JSON, or as the text produced by `text`
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce(&T) -> String) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(out) => println!("{}", out),
                Err(e) => warn!("Failed to serialize output: {}", e),
            }
        } else {
            let out = text(value);
            if !out.is_empty() {
                println!("{}", out);
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Count {
    count: usize,
}

/// Client as printed; credentials are never shown
#[derive(Debug, Serialize)]
struct ClientView {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: ClientKind,
    url: String,
    enable: bool,
}

impl From<&TorrentClientConfig> for ClientView {
    fn from(client: &TorrentClientConfig) -> Self {
        Self {
            id: client.id.clone(),
            name: client.display_name().to_string(),
            kind: client.kind,
            url: client.base_url(),
            enable: client.enable,
        }
    }
}

#[derive(Debug, Serialize)]
struct ClientListing {
    clients: Vec<ClientView>,
    supported_types: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ConnectionTest {
    id: String,
    trackers: usize,
}

fn notify_summary(notify: &NotifyConfig) -> String {
    let on_off = |b: bool| if b { "开启" } else { "关闭" };
    let mut lines = vec![
        format!("通知: {}", on_off(notify.enable)),
        format!("一言: {}", on_off(notify.hitokoto)),
        format!("跳过标题: {}", notify.skip_titles.join(", ")),
    ];
    lines.extend(notify.channels.iter().map(|(name, channel)| {
        let kind = channel.kind();
        let state = if !kind.is_complete() {
            "不完整"
        } else if channel.enable == Some(true) {
            "启用"
        } else {
            "停用"
        };
        format!("{}\t{}\t{}", name, channel.family, state)
    }));
    lines.join("\n")
}

/// Domains listed in a file, blank lines dropped
async fn read_domain_file(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(split_batch(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn app_in(dir: &Path) -> App {
        let config = Config {
            config_path: dir.join("config.json"),
            hosts_path: dir.join("hosts"),
            cfst_script: dir.join("missing.sh"),
            log_level: "info".to_string(),
        };
        App::build(&config, true).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_tracker_rewrites_hosts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hosts"), "127.0.0.1\tlocalhost\n").unwrap();
        let app = app_in(dir.path()).await;

        app.execute(Command::AddTracker {
            domain: "https://tracker.example.org/announce".to_string(),
            name: None,
            force_cloudflare: true,
        })
        .await
        .unwrap();

        let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(hosts.starts_with("127.0.0.1\tlocalhost\n"));
        assert!(hosts.contains("104.16.91.215\ttracker.example.org"));

        let whitelist = app.reconciler.whitelist().await.unwrap();
        assert!(whitelist.contains("tracker.example.org"));
    }

    #[tokio::test]
    async fn test_batch_add_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("domains.txt");
        std::fs::write(&list, "a.example\n\nb.example\n").unwrap();
        let app = app_in(dir.path()).await;

        app.execute(Command::BatchAdd {
            domains: vec!["a.example".to_string()],
            file: Some(list),
        })
        .await
        .unwrap();

        let domains: Vec<_> = app
            .trackers
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.domain)
            .collect();
        assert_eq!(domains, vec!["a.example", "b.example"]);
    }

    #[tokio::test]
    async fn test_failed_speed_test_fails_command() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;

        let err = app
            .execute(Command::RunTask { scheduled: false })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("定时任务失败"));
        assert!(!dir.path().join("hosts").exists());
    }

    #[tokio::test]
    async fn test_scheduled_run_honours_disabled_setting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"cloudflare": {"enable": false, "cron": "0 0 * * *"}}"#,
        )
        .unwrap();
        let app = app_in(dir.path()).await;

        app.execute(Command::RunTask { scheduled: true }).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_without_clients_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;

        assert!(app.execute(Command::Import).await.is_err());
    }

    #[tokio::test]
    async fn test_import_reports_unusable_clients() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"torrent_clients": [
                {"id": "qb", "type": "qbittorrent", "host": "bad host", "port": 8080}
            ]}"#,
        )
        .unwrap();
        let app = app_in(dir.path()).await;

        app.execute(Command::Import).await.unwrap();
        assert!(app.trackers.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heavy_task_rejected_while_another_process_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;
        let _held = TaskLock::acquire(&app.lock_path).unwrap();

        let err = app.execute(Command::UpdateHosts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ptaccel_core::Error>(),
            Some(ptaccel_core::Error::TaskAlreadyRunning(_))
        ));
        assert!(!dir.path().join("hosts").exists());
    }

    #[tokio::test]
    async fn test_client_commands() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;
        let add = |kind: &str| Command::Client {
            command: ClientCommand::Add {
                id: "qb1".to_string(),
                kind: kind.to_string(),
                host: "192.168.1.10".to_string(),
                port: 8080,
                name: None,
                username: Some("admin".to_string()),
                password: Some("secret".to_string()),
                https: false,
                path: None,
                disabled: false,
            },
        };

        assert!(app.execute(add("deluge")).await.is_err());
        app.execute(add("qbittorrent")).await.unwrap();
        assert!(app.execute(add("qbittorrent")).await.is_err());
        app.execute(Command::Client {
            command: ClientCommand::Disable { id: "qb1".to_string() },
        })
        .await
        .unwrap();

        let clients = app.settings.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert!(!clients[0].enable);

        app.execute(Command::Client {
            command: ClientCommand::Delete { id: "qb1".to_string() },
        })
        .await
        .unwrap();
        assert!(app.settings.clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_test_title_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"notify": {"skip_titles": ["通知测试"], "channels": {
                "bark": {"type": "bark", "enable": true, "BARK_PUSH": "https://bark.invalid/key"}
            }}}"#,
        )
        .unwrap();
        let app = app_in(dir.path()).await;

        app.execute(Command::Notify {
            command: NotifyCommand::Test {
                title: None,
                content: None,
            },
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cloudflare_settings() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).await;

        assert!(app
            .execute(Command::Cloudflare {
                enable: None,
                cron: Some("not a cron".to_string()),
            })
            .await
            .is_err());
        app.execute(Command::Cloudflare {
            enable: Some(false),
            cron: Some("0 */6 * * *".to_string()),
        })
        .await
        .unwrap();

        let saved = app.settings.cloudflare().await.unwrap();
        assert!(!saved.enable);
        assert_eq!(saved.cron, "0 */6 * * *");
    }

    #[tokio::test]
    async fn test_missing_domain_file() {
        let err = read_domain_file(&PathBuf::from("/nonexistent/domains.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("domains.txt"));
    }
}
