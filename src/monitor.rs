//! Operator visibility: who is connected, recent operator log lines and a
//! host snapshot for `/server_status`.

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};
use sysinfo::{Disks, Networks, System};
use tracing::info;

pub const MAX_LOG_LINES: usize = 100;
pub const CLIENT_STALE_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
struct ClientInfo {
    last_seen: DateTime<Utc>,
    location: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientView {
    pub ip: String,
    pub last_seen: DateTime<Utc>,
    pub last_active: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub mount: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub timestamp: String,
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_available: u64,
    pub memory_percent: f64,
    pub disks: Vec<DiskInfo>,
    pub net_bytes_sent: u64,
    pub net_bytes_recv: u64,
    pub system: Option<String>,
    pub release: Option<String>,
    pub kernel: Option<String>,
    pub node: Option<String>,
    pub host_uptime_secs: u64,
    pub host_uptime: String,
    pub server_uptime_secs: u64,
}

#[derive(Clone)]
pub struct Monitor {
    clients: Arc<Mutex<HashMap<String, ClientInfo>>>,
    logs: Arc<Mutex<VecDeque<String>>>,
    sys: Arc<Mutex<System>>,
    started: Instant,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            logs: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
            sys: Arc::new(Mutex::new(System::new())),
            started: Instant::now(),
        }
    }

    /// Records a request from `ip` and forgets clients idle for 10 minutes.
    pub fn touch_client(&self, ip: &str, forwarded_for: Option<&str>) {
        self.touch_client_at(ip, forwarded_for, Utc::now());
    }

    pub fn touch_client_at(&self, ip: &str, forwarded_for: Option<&str>, now: DateTime<Utc>) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.insert(
            ip.to_string(),
            ClientInfo {
                last_seen: now,
                location: forwarded_for
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Local")
                    .to_string(),
            },
        );
        let cutoff = now - Duration::minutes(CLIENT_STALE_MINUTES);
        clients.retain(|_, c| c.last_seen >= cutoff);
    }

    /// Connected clients, most recent first.
    pub fn clients(&self) -> Vec<ClientView> {
        self.clients_at(Utc::now())
    }

    pub fn clients_at(&self, now: DateTime<Utc>) -> Vec<ClientView> {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = now - Duration::minutes(CLIENT_STALE_MINUTES);
        let mut out: Vec<ClientView> = clients
            .iter()
            .filter(|(_, c)| c.last_seen >= cutoff)
            .map(|(ip, c)| ClientView {
                ip: ip.clone(),
                last_seen: c.last_seen,
                last_active: ago(now - c.last_seen),
                location: c.location.clone(),
            })
            .collect();
        out.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.ip.cmp(&b.ip)));
        out
    }

    /// Appends a timestamped operator line, dropping the oldest beyond 100.
    pub fn log(&self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        );
        info!(target: "monitor", "{}", message.as_ref());
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        if logs.len() == MAX_LOG_LINES {
            logs.pop_front();
        }
        logs.push_back(line);
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn server_uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// CPU usage is measured between two calls; the first call reports 0.
    pub fn system_snapshot(&self) -> SystemSnapshot {
        let mut sys = self.sys.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_cpu();
        sys.refresh_memory();

        let memory_total = sys.total_memory();
        let memory_used = sys.used_memory();
        let memory_percent = if memory_total > 0 {
            memory_used as f64 / memory_total as f64 * 100.0
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space();
                DiskInfo {
                    mount: d.mount_point().to_string_lossy().to_string(),
                    total_bytes: total,
                    available_bytes: available,
                    used_percent: if total > 0 {
                        total.saturating_sub(available) as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let (mut sent, mut recv) = (0u64, 0u64);
        for (_name, data) in &Networks::new_with_refreshed_list() {
            sent += data.total_transmitted();
            recv += data.total_received();
        }

        let host_uptime_secs = System::uptime();
        SystemSnapshot {
            timestamp: Local::now().to_rfc3339(),
            cpu_percent: sys.global_cpu_info().cpu_usage(),
            cpu_count: sys.cpus().len(),
            memory_total,
            memory_used,
            memory_available: sys.available_memory(),
            memory_percent,
            disks,
            net_bytes_sent: sent,
            net_bytes_recv: recv,
            system: System::name(),
            release: System::os_version(),
            kernel: System::kernel_version(),
            node: System::host_name(),
            host_uptime_secs,
            host_uptime: format_uptime(host_uptime_secs),
            server_uptime_secs: self.server_uptime_secs(),
        }
    }
}

fn ago(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs < 60 {
        format!("{secs} seconds ago")
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else {
        format!("{} hours ago", secs / 3600)
    }
}

/// `1d 2h 3m 4s`
pub fn format_uptime(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    format!("{days}d {hours}h {}m {}s", rem / 60, rem % 60)
}
