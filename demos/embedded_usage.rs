//! Minimal embedding example for ptaccel-core
//!
//! Runs a speed-test task against in-process collaborators: no script, no
//! hosts file and no network. The application owns every component.

use ptaccel_core::config::ConfigDocument;
use ptaccel_core::traits::{ChannelPayload, HostsWriter, NotifyTransport, SpeedTester};
use ptaccel_core::{
    HeavyTasks, MemoryConfigStore, NotificationDispatcher, Result, TaskKind, TaskOrchestrator,
    TrackerRegistry,
};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;

/// Speed tester that "finds" a fixed IP after a short delay
struct FixedSpeedTester {
    ip: IpAddr,
}

#[async_trait::async_trait]
impl SpeedTester for FixedSpeedTester {
    async fn select_best_ip(&self) -> Result<IpAddr> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(self.ip)
    }

    fn best_known_ip(&self) -> Option<IpAddr> {
        None
    }
}

/// Hosts writer that keeps the rendered lines in memory
#[derive(Default)]
struct MemoryHosts {
    lines: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl HostsWriter for MemoryHosts {
    async fn rewrite(&self, doc: &ConfigDocument) -> Result<usize> {
        let lines: Vec<String> = doc
            .trackers()
            .iter()
            .filter(|t| t.enable)
            .map(|t| format!("{}\t{}", t.ip, t.domain))
            .collect();
        let count = lines.len();
        *self.lines.lock().unwrap() = lines;
        Ok(count)
    }

    async fn read_current_hosts(&self) -> Result<String> {
        Ok(self.lines.lock().unwrap().join("\n"))
    }

    async fn clear_managed_sections(&self) -> Result<()> {
        self.lines.lock().unwrap().clear();
        Ok(())
    }
}

/// Transport that prints instead of sending
struct StdoutTransport;

#[async_trait::async_trait]
impl NotifyTransport for StdoutTransport {
    async fn send(&self, title: &str, content: &str, payload: &ChannelPayload) -> Result<()> {
        println!("[Notify:{}] {}\n{}", payload.channel, title, content);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded ptaccel-core Example ===\n");

    let store = Arc::new(MemoryConfigStore::new());
    let hosts = Arc::new(MemoryHosts::default());
    let speed_tester = Arc::new(FixedSpeedTester {
        ip: IpAddr::from([104, 16, 7, 7]),
    });

    println!("1. Adding trackers...");
    let trackers = TrackerRegistry::new(store.clone());
    let report = trackers
        .batch_add(&["tracker.example.org", "https://announce.example.net/announce"])
        .await?;
    println!("   {}", report.message());

    let dispatcher = NotificationDispatcher::new(Arc::new(StdoutTransport));
    let orchestrator = TaskOrchestrator::new(store.clone(), dispatcher);
    let heavy = HeavyTasks::new(store.clone(), speed_tester, hosts.clone());

    // Status observer
    let mut stream = orchestrator.status_stream();
    let observer = tokio::spawn(async move {
        while let Some(status) = stream.next().await {
            println!("[Status] {:?}: {}", status.status, status.message);
        }
    });

    println!("2. Running the speed test task...");
    let task = {
        let orchestrator = orchestrator.clone();
        let heavy = heavy.clone();
        tokio::spawn(async move { heavy.run(&orchestrator, TaskKind::SpeedTestAndHosts).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("3. Requesting a second task while the first runs...");
    match heavy.run(&orchestrator, TaskKind::UpdateHosts).await {
        Err(e) => println!("   Rejected: {}", e),
        Ok(status) => println!("   Unexpectedly ran: {}", status.message),
    }

    let status = match task.await {
        Ok(result) => result?,
        Err(e) => {
            println!("Task panicked: {}", e);
            return Ok(());
        }
    };
    println!("\n4. Final status: {}", status.message);
    println!("   Hosts lines:\n{}", hosts.read_current_hosts().await?);

    drop(orchestrator);
    observer.abort();

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Every collaborator is supplied by the application");
    println!("- Only one heavy task runs at a time; extra requests are rejected");
    println!("- Status changes are observable as a stream");

    Ok(())
}
