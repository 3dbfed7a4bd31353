// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Scrape collector
//!
//! One call to [`ScrapeCollector::collect`] fetches health, servers, cameras
//! and alarms, each independently. A category whose session was rejected gets
//! exactly one login and one retry; any other failure drops that category
//! from the snapshot without aborting the scrape.
//!
//! The backend (and with it the session token) sits behind a single mutex, so
//! scrapes run strictly one after another and a re-login in one scrape can
//! never race a fetch in another.

use crate::client::VmsBackend;
use crate::error::Result;
use crate::models::{Alarm, Camera};
use crate::prometheus::{
    Exposition, MetricDescriptor, MetricFamily, ALARMS_TOTAL, CAMERAS_TOTAL,
    CAMERA_HAS_RECORDED_DATA, CAMERA_UP, SCRAPE_DURATION, SERVERS_TOTAL, SYSTEM_HEALTH, UP,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Label value used when a camera reports no IP address
pub const UNKNOWN_IP: &str = "unknown";
/// State bucket for cameras and alarms reporting an empty state
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// Overall VMS health as reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Warn,
    Bad,
    /// The health endpoint could not be read
    Unknown,
}

impl HealthStatus {
    /// Classify a health response body; a `WARN` marker outranks `GOOD`
    pub fn from_body(body: &str) -> Self {
        if body.contains("WARN") {
            Self::Warn
        } else if body.contains("GOOD") {
            Self::Good
        } else {
            Self::Bad
        }
    }

    /// Gauge value: 1.0 good, 0.5 warn, 0.0 otherwise
    pub fn gauge_value(self) -> f64 {
        match self {
            Self::Good => 1.0,
            Self::Warn => 0.5,
            Self::Bad | Self::Unknown => 0.0,
        }
    }
}

/// Result of one scrape; `None` marks a category that failed
#[derive(Debug, Clone)]
pub struct ScrapeSnapshot {
    pub health: HealthStatus,
    pub server_count: Option<usize>,
    pub cameras: Option<Vec<Camera>>,
    pub alarms: Option<Vec<Alarm>>,
    pub duration: Duration,
}

impl ScrapeSnapshot {
    /// Cameras and alarms are the primary signal; servers and health do not count
    pub fn success(&self) -> bool {
        self.cameras.is_some() && self.alarms.is_some()
    }

    /// Render this snapshot against the fixed descriptor set
    pub fn to_exposition(&self) -> Exposition {
        let mut exposition = Exposition::new();

        exposition.add(MetricFamily::gauge(&SYSTEM_HEALTH, self.health.gauge_value()));

        if let Some(count) = self.server_count {
            exposition.add(MetricFamily::gauge(&SERVERS_TOTAL, count as f64));
        }

        if let Some(ref cameras) = self.cameras {
            let mut up = MetricFamily::new(&CAMERA_UP);
            let mut recorded = MetricFamily::new(&CAMERA_HAS_RECORDED_DATA);
            for cam in cameras {
                let ip = if cam.ip_address.is_empty() {
                    UNKNOWN_IP
                } else {
                    cam.ip_address.as_str()
                };
                up.add_sample(
                    bool_gauge(cam.connection_state.eq_ignore_ascii_case("CONNECTED")),
                    &[cam.id.as_str(), cam.name.as_str(), cam.model.as_str(), ip],
                );
                recorded.add_sample(
                    bool_gauge(cam.recorded_data),
                    &[cam.id.as_str(), cam.name.as_str()],
                );
            }
            exposition.add(up);
            exposition.add(recorded);
            exposition.add(state_counts(
                &CAMERAS_TOTAL,
                cameras.iter().map(|c| c.connection_state.as_str()),
            ));
        }

        if let Some(ref alarms) = self.alarms {
            exposition.add(state_counts(
                &ALARMS_TOTAL,
                alarms.iter().map(|a| a.state.as_str()),
            ));
        }

        exposition.add(MetricFamily::gauge(&UP, bool_gauge(self.success())));
        exposition.add(MetricFamily::gauge(
            &SCRAPE_DURATION,
            self.duration.as_secs_f64(),
        ));

        exposition
    }
}

/// Serializes scrapes against one backend
pub struct ScrapeCollector<B: VmsBackend> {
    backend: Mutex<B>,
}

impl<B: VmsBackend> ScrapeCollector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Log in through the collector's lock
    pub fn authenticate(&self) -> Result<String> {
        self.lock_backend().authenticate().map(|session| {
            log::info!("Login successful");
            session
        })
    }

    /// Run `f` with exclusive access to the backend
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock_backend())
    }

    /// Fetch every category and build a fresh snapshot
    ///
    /// Blocks while another scrape is in progress, then performs its own.
    pub fn collect(&self) -> ScrapeSnapshot {
        let mut backend = self.lock_backend();
        let start = Instant::now();

        let health = match fetch_with_reauth(&mut *backend, "health", |b| b.fetch_health()) {
            Ok(body) => HealthStatus::from_body(&body),
            Err(e) => {
                log::warn!("Error scraping health: {}", e);
                HealthStatus::Unknown
            }
        };

        let server_count = fetch_with_reauth(&mut *backend, "servers", |b| b.fetch_servers())
            .map(|servers| servers.len())
            .map_err(|e| log::warn!("Error scraping servers: {}", e))
            .ok();

        let cameras = fetch_with_reauth(&mut *backend, "cameras", |b| b.fetch_cameras())
            .map_err(|e| log::error!("Error scraping cameras: {}", e))
            .ok();

        let alarms = fetch_with_reauth(&mut *backend, "alarms", |b| b.fetch_alarms())
            .map_err(|e| log::error!("Error scraping alarms: {}", e))
            .ok();

        let snapshot = ScrapeSnapshot {
            health,
            server_count,
            cameras,
            alarms,
            duration: start.elapsed(),
        };
        log::debug!(
            "Scrape finished in {:.3}s (success={})",
            snapshot.duration.as_secs_f64(),
            snapshot.success()
        );
        snapshot
    }

    /// Scrape and render in one step
    pub fn collect_exposition(&self) -> Exposition {
        self.collect().to_exposition()
    }

    fn lock_backend(&self) -> MutexGuard<'_, B> {
        // A panic inside a previous scrape must not wedge every later pull
        self.backend.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fetch once; on a rejected session log in once and, if that worked, fetch once more
fn fetch_with_reauth<B, T, F>(backend: &mut B, resource: &str, fetch: F) -> Result<T>
where
    B: VmsBackend + ?Sized,
    F: Fn(&B) -> Result<T>,
{
    match fetch(&*backend) {
        Err(err) if err.is_auth_expired() => {
            log::info!("Session rejected while fetching {}, logging in again", resource);
            if let Err(auth_err) = backend.authenticate() {
                log::warn!("Re-login failed: {}", auth_err);
                return Err(auth_err);
            }
            fetch(&*backend)
        }
        other => other,
    }
}

fn state_counts<'a>(
    descriptor: &'static MetricDescriptor,
    states: impl Iterator<Item = &'a str>,
) -> MetricFamily {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for state in states {
        let state = if state.is_empty() {
            UNKNOWN_STATE.to_string()
        } else {
            state.to_uppercase()
        };
        *counts.entry(state).or_insert(0) += 1;
    }

    let mut family = MetricFamily::new(descriptor);
    for (state, count) in &counts {
        family.add_sample(*count as f64, &[state.as_str()]);
    }
    family
}

fn bool_gauge(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExporterError;
    use crate::models::Server;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted backend; every scrape calls health first and alarms last
    #[derive(Default)]
    struct FakeVms {
        health: String,
        servers: usize,
        cameras: Vec<Camera>,
        alarms: Vec<Alarm>,
        login_succeeds: bool,
        login_attempts: usize,
        logins: usize,
        /// Rejected with 401 until the first successful login
        expired_until_login: HashSet<&'static str>,
        /// Rejected with 401 no matter what
        always_expired: HashSet<&'static str>,
        /// Fail with HTTP 500
        broken: HashSet<&'static str>,
        fetch_delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak_in_flight: Arc<AtomicUsize>,
        scrapes: Arc<AtomicUsize>,
    }

    impl FakeVms {
        fn healthy() -> Self {
            Self {
                health: "SYSTEM_HEALTH_GOOD".into(),
                servers: 2,
                cameras: vec![
                    camera("c1", "Lobby", "CONNECTED", "10.0.0.1", true),
                    camera("c2", "Dock", "Connected", "", false),
                    camera("c3", "Yard", "DISCONNECTED", "10.0.0.3", true),
                ],
                alarms: vec![alarm("a1", "active"), alarm("a2", "ACTIVE"), alarm("a3", "")],
                login_succeeds: true,
                ..Default::default()
            }
        }

        fn gate(&self, resource: &'static str) -> Result<()> {
            if self.broken.contains(resource) {
                return Err(ExporterError::fetch(resource, "HTTP 500: boom"));
            }
            if self.always_expired.contains(resource)
                || (self.logins == 0 && self.expired_until_login.contains(resource))
            {
                return Err(ExporterError::AuthExpired {
                    resource,
                    status: 401,
                });
            }
            Ok(())
        }
    }

    impl VmsBackend for FakeVms {
        fn authenticate(&mut self) -> Result<String> {
            self.login_attempts += 1;
            if !self.login_succeeds {
                return Err(ExporterError::Authentication("login failed (HTTP 403)".into()));
            }
            self.logins += 1;
            Ok(format!("session-{}", self.logins))
        }

        fn fetch_health(&self) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            self.scrapes.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.fetch_delay);
            self.gate("health")?;
            Ok(self.health.clone())
        }

        fn fetch_servers(&self) -> Result<Vec<Server>> {
            self.gate("servers")?;
            Ok(vec![Server::default(); self.servers])
        }

        fn fetch_cameras(&self) -> Result<Vec<Camera>> {
            self.gate("cameras")?;
            Ok(self.cameras.clone())
        }

        fn fetch_alarms(&self) -> Result<Vec<Alarm>> {
            std::thread::sleep(self.fetch_delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.gate("alarms")?;
            Ok(self.alarms.clone())
        }
    }

    fn camera(id: &str, name: &str, state: &str, ip: &str, recorded: bool) -> Camera {
        Camera {
            id: id.into(),
            name: name.into(),
            model: "H5A".into(),
            connection_state: state.into(),
            ip_address: ip.into(),
            recorded_data: recorded,
            ..Default::default()
        }
    }

    fn alarm(id: &str, state: &str) -> Alarm {
        Alarm {
            id: id.into(),
            state: state.into(),
            ..Default::default()
        }
    }

    fn value(exp: &Exposition, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        exp.family(name).and_then(|f| f.value_with(labels))
    }

    #[test]
    fn test_health_classification() {
        assert_eq!(HealthStatus::from_body("SYSTEM_HEALTH_GOOD"), HealthStatus::Good);
        assert_eq!(HealthStatus::from_body("WARN_LOW_DISK"), HealthStatus::Warn);
        assert_eq!(HealthStatus::from_body("GOOD but WARN"), HealthStatus::Warn);
        assert_eq!(HealthStatus::from_body("SYSTEM_HEALTH_BAD"), HealthStatus::Bad);
        assert_eq!(HealthStatus::Good.gauge_value(), 1.0);
        assert_eq!(HealthStatus::Warn.gauge_value(), 0.5);
        assert_eq!(HealthStatus::Bad.gauge_value(), 0.0);
        assert_eq!(HealthStatus::Unknown.gauge_value(), 0.0);
    }

    #[test]
    fn test_full_scrape() {
        let collector = ScrapeCollector::new(FakeVms::healthy());
        let snapshot = collector.collect();
        assert!(snapshot.success());
        let exp = snapshot.to_exposition();

        assert_eq!(value(&exp, "avigilon_system_health", &[]), Some(1.0));
        assert_eq!(value(&exp, "avigilon_servers_total", &[]), Some(2.0));
        assert_eq!(value(&exp, "avigilon_up", &[]), Some(1.0));
        assert!(value(&exp, "avigilon_scrape_duration_seconds", &[]).is_some());

        assert_eq!(value(&exp, "avigilon_camera_up", &[("id", "c1")]), Some(1.0));
        assert_eq!(value(&exp, "avigilon_camera_up", &[("id", "c2")]), Some(1.0));
        assert_eq!(value(&exp, "avigilon_camera_up", &[("id", "c3")]), Some(0.0));
        assert_eq!(
            value(&exp, "avigilon_camera_up", &[("id", "c2"), ("ip", "unknown")]),
            Some(1.0)
        );
        assert_eq!(
            value(&exp, "avigilon_camera_has_recorded_data", &[("id", "c2")]),
            Some(0.0)
        );

        assert_eq!(
            value(&exp, "avigilon_cameras_total", &[("state", "CONNECTED")]),
            Some(2.0)
        );
        assert_eq!(
            value(&exp, "avigilon_cameras_total", &[("state", "DISCONNECTED")]),
            Some(1.0)
        );
        assert_eq!(
            value(&exp, "avigilon_alarms_total", &[("state", "ACTIVE")]),
            Some(2.0)
        );
        assert_eq!(
            value(&exp, "avigilon_alarms_total", &[("state", "UNKNOWN")]),
            Some(1.0)
        );
    }

    #[test]
    fn test_warn_health() {
        let backend = FakeVms {
            health: "WARN_LOW_DISK".into(),
            ..FakeVms::healthy()
        };
        let exp = ScrapeCollector::new(backend).collect_exposition();
        assert_eq!(value(&exp, "avigilon_system_health", &[]), Some(0.5));
    }

    #[test]
    fn test_health_failure_is_zero_and_does_not_flip_up() {
        let mut backend = FakeVms::healthy();
        backend.broken.insert("health");
        backend.broken.insert("servers");
        let exp = ScrapeCollector::new(backend).collect_exposition();

        assert_eq!(value(&exp, "avigilon_system_health", &[]), Some(0.0));
        assert!(exp.family("avigilon_servers_total").is_none());
        assert_eq!(value(&exp, "avigilon_up", &[]), Some(1.0));
    }

    #[test]
    fn test_reauth_recovery_matches_valid_session() {
        let baseline = ScrapeCollector::new(FakeVms::healthy()).collect_exposition();

        let mut backend = FakeVms::healthy();
        backend.expired_until_login.insert("cameras");
        let collector = ScrapeCollector::new(backend);
        let recovered = collector.collect_exposition();

        for name in [
            "avigilon_camera_up",
            "avigilon_camera_has_recorded_data",
            "avigilon_cameras_total",
        ] {
            assert_eq!(
                baseline.family(name).unwrap().samples,
                recovered.family(name).unwrap().samples,
                "{} differs after recovery",
                name
            );
        }
        assert_eq!(value(&recovered, "avigilon_up", &[]), Some(1.0));
        collector.with_backend(|b| {
            assert_eq!(b.login_attempts, 1);
            assert_eq!(b.logins, 1);
        });
    }

    #[test]
    fn test_failed_reauth_drops_only_that_category() {
        let mut backend = FakeVms::healthy();
        backend.expired_until_login.insert("cameras");
        backend.login_succeeds = false;
        let collector = ScrapeCollector::new(backend);
        let exp = collector.collect_exposition();

        assert_eq!(value(&exp, "avigilon_up", &[]), Some(0.0));
        assert!(!exp.export().contains("avigilon_cameras_total"));
        assert!(!exp.export().contains("avigilon_camera_up"));
        assert_eq!(value(&exp, "avigilon_system_health", &[]), Some(1.0));
        assert_eq!(value(&exp, "avigilon_servers_total", &[]), Some(2.0));
        assert_eq!(
            value(&exp, "avigilon_alarms_total", &[("state", "ACTIVE")]),
            Some(2.0)
        );
        collector.with_backend(|b| assert_eq!(b.login_attempts, 1));
    }

    #[test]
    fn test_exactly_one_retry_per_category() {
        let mut backend = FakeVms::healthy();
        backend.always_expired.insert("alarms");
        let collector = ScrapeCollector::new(backend);
        let snapshot = collector.collect();

        assert!(snapshot.alarms.is_none());
        assert!(snapshot.cameras.is_some());
        assert!(!snapshot.success());
        collector.with_backend(|b| assert_eq!(b.login_attempts, 1));
    }

    #[test]
    fn test_non_auth_failure_does_not_login() {
        let mut backend = FakeVms::healthy();
        backend.broken.insert("cameras");
        let collector = ScrapeCollector::new(backend);
        let snapshot = collector.collect();

        assert!(snapshot.cameras.is_none());
        assert!(!snapshot.success());
        collector.with_backend(|b| assert_eq!(b.login_attempts, 0));
    }

    #[test]
    fn test_concurrent_collects_never_interleave() {
        let backend = FakeVms {
            fetch_delay: Duration::from_millis(20),
            ..FakeVms::healthy()
        };
        let peak = backend.peak_in_flight.clone();
        let scrapes = backend.scrapes.clone();
        let collector = ScrapeCollector::new(backend);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    assert!(collector.collect().success());
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(scrapes.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_state_counts_normalization() {
        let family = state_counts(&CAMERAS_TOTAL, ["connected", "", "Connected"].into_iter());
        assert_eq!(family.value_with(&[("state", "CONNECTED")]), Some(2.0));
        assert_eq!(family.value_with(&[("state", "UNKNOWN")]), Some(1.0));
        assert_eq!(family.samples.len(), 2);
    }
}
