// src/pipeline/throttle.rs

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{interval, sleep, Instant, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::config::GeocodeSettings;
use crate::geocode::{Geocode, GeocodeMiss, GeocodeRequest, Geocoder};

const PROGRESS_EVERY: usize = 100;

/// How lookups are spaced out.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Gap between consecutive request starts.
    pub delay: Duration,
    /// Requests allowed in flight at once; 1 is strictly sequential.
    pub concurrency: usize,
    /// Requests not started within this budget resolve to `Skipped`.
    pub deadline: Option<Duration>,
}

impl From<&GeocodeSettings> for Pacing {
    fn from(settings: &GeocodeSettings) -> Self {
        Self {
            delay: settings.delay,
            concurrency: settings.concurrency.max(1),
            deadline: settings.deadline,
        }
    }
}

impl Pacing {
    /// Rough wall time for `count` lookups, ignoring service latency.
    pub fn estimate(&self, count: usize) -> Duration {
        let gaps = u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX);
        self.delay.saturating_mul(gaps)
    }

    fn expired(&self, started: Instant) -> bool {
        self.deadline.is_some_and(|d| started.elapsed() >= d)
    }
}

fn log_progress(done: usize, total: usize) {
    if done % PROGRESS_EVERY == 0 {
        info!(
            "progress: {}/{} ({}%)",
            done + 1,
            total,
            done * 100 / total.max(1)
        );
    }
}

/// Look up every request, returning outcomes in request order.
pub async fn geocode_all(
    geocoder: Arc<dyn Geocoder>,
    requests: &[GeocodeRequest],
    pacing: &Pacing,
) -> Vec<Geocode> {
    if requests.is_empty() {
        return Vec::new();
    }
    info!(
        requests = requests.len(),
        concurrency = pacing.concurrency,
        delay_ms = pacing.delay.as_millis() as u64,
        "geocoding; expect roughly {} minute(s)",
        pacing.estimate(requests.len()).as_secs().div_ceil(60)
    );

    if pacing.concurrency <= 1 {
        sequential(geocoder.as_ref(), requests, pacing).await
    } else {
        pooled(geocoder, requests, pacing).await
    }
}

/// One request at a time with a fixed pause between them.
async fn sequential(
    geocoder: &dyn Geocoder,
    requests: &[GeocodeRequest],
    pacing: &Pacing,
) -> Vec<Geocode> {
    let started = Instant::now();
    let mut out = Vec::with_capacity(requests.len());

    for (i, request) in requests.iter().enumerate() {
        if pacing.expired(started) {
            warn!(remaining = requests.len() - i, "geocoding deadline reached");
            out.resize(requests.len(), Geocode::Miss(GeocodeMiss::Skipped));
            break;
        }
        log_progress(i, requests.len());
        out.push(geocoder.geocode(request).await);

        if i + 1 < requests.len() && !pacing.delay.is_zero() {
            sleep(pacing.delay).await;
        }
    }
    out
}

/// Up to `concurrency` requests in flight; starts are spaced by `delay` so the
/// average rate matches the sequential path. Each task reports its own index.
async fn pooled(
    geocoder: Arc<dyn Geocoder>,
    requests: &[GeocodeRequest],
    pacing: &Pacing,
) -> Vec<Geocode> {
    let started = Instant::now();
    let permits = Arc::new(Semaphore::new(pacing.concurrency));
    let mut ticker = (!pacing.delay.is_zero()).then(|| {
        let mut t = interval(pacing.delay);
        t.set_missed_tick_behavior(MissedTickBehavior::Delay);
        t
    });
    let mut tasks = JoinSet::new();
    let mut slots: Vec<Option<Geocode>> = vec![None; requests.len()];

    for (i, request) in requests.iter().enumerate() {
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }
        if pacing.expired(started) {
            warn!(remaining = requests.len() - i, "geocoding deadline reached");
            break;
        }
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        // waiting for a free slot can outlast the deadline
        if pacing.expired(started) {
            warn!(remaining = requests.len() - i, "geocoding deadline reached");
            break;
        }
        log_progress(i, requests.len());

        let geocoder = Arc::clone(&geocoder);
        let request = request.clone();
        tasks.spawn(async move {
            let _permit = permit;
            (i, geocoder.geocode(&request).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((i, outcome)) => slots[i] = Some(outcome),
            Err(e) => warn!(error = %e, "geocode task did not finish"),
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Geocode::Miss(GeocodeMiss::Skipped)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::Coordinate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers from the address text; `slow` addresses take longer so pooled
    /// completions arrive out of order.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<(usize, Instant)>>,
    }

    #[async_trait]
    impl Geocoder for Scripted {
        async fn geocode(&self, request: &GeocodeRequest) -> Geocode {
            self.calls
                .lock()
                .unwrap()
                .push((request.origin_row, Instant::now()));
            if request.address.starts_with("slow") {
                sleep(Duration::from_millis(500)).await;
            }
            if request.address.starts_with("miss") {
                return Geocode::Miss(GeocodeMiss::NoResults);
            }
            Geocode::Hit(Coordinate {
                lat: request.origin_row as f64,
                lng: -(request.origin_row as f64),
            })
        }
    }

    fn requests(addresses: &[&str]) -> Vec<GeocodeRequest> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, a)| GeocodeRequest::new(a, None, i * 10).unwrap())
            .collect()
    }

    fn pacing(delay_ms: u64, concurrency: usize, deadline_ms: Option<u64>) -> Pacing {
        Pacing {
            delay: Duration::from_millis(delay_ms),
            concurrency,
            deadline: deadline_ms.map(Duration::from_millis),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_spaces_requests_by_the_delay() {
        let fake = Arc::new(Scripted::default());
        let reqs = requests(&["a", "miss b", "c"]);
        let started = Instant::now();

        let out = geocode_all(fake.clone(), &reqs, &pacing(200, 1, None)).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].coordinate().map(|c| c.lat), Some(0.0));
        assert_eq!(out[1], Geocode::Miss(GeocodeMiss::NoResults));
        assert_eq!(out[2].coordinate().map(|c| c.lat), Some(20.0));

        let calls = fake.calls.lock().unwrap();
        let offsets: Vec<u128> = calls
            .iter()
            .map(|(_, at)| at.duration_since(started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 200, 400]);
        // no pause after the last request
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn pooled_results_follow_request_order() {
        let fake = Arc::new(Scripted::default());
        let reqs = requests(&["slow a", "b", "slow c", "d", "e"]);

        let out = geocode_all(fake.clone(), &reqs, &pacing(100, 3, None)).await;

        let lats: Vec<Option<f64>> = out.iter().map(|g| g.coordinate().map(|c| c.lat)).collect();
        assert_eq!(
            lats,
            vec![Some(0.0), Some(10.0), Some(20.0), Some(30.0), Some(40.0)]
        );
        // starts are still paced at the configured rate
        let calls = fake.calls.lock().unwrap();
        for pair in calls.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_skips_the_rest() {
        let fake = Arc::new(Scripted::default());
        let reqs = requests(&["a", "b", "c", "d", "e"]);

        let out = geocode_all(fake.clone(), &reqs, &pacing(100, 1, Some(250))).await;

        assert_eq!(out.len(), 5);
        assert!(out[..3].iter().all(Geocode::is_hit));
        assert!(out[3..]
            .iter()
            .all(|g| *g == Geocode::Miss(GeocodeMiss::Skipped)));
        assert_eq!(fake.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pooled_deadline_keeps_finished_work() {
        let fake = Arc::new(Scripted::default());
        let reqs = requests(&["a", "b", "c", "d"]);

        let out = geocode_all(fake.clone(), &reqs, &pacing(100, 2, Some(150))).await;

        assert!(out[0].is_hit() && out[1].is_hit());
        assert_eq!(out[2], Geocode::Miss(GeocodeMiss::Skipped));
        assert_eq!(out[3], Geocode::Miss(GeocodeMiss::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_pool_issues_nothing_after_the_deadline() {
        let fake = Arc::new(Scripted::default());
        let reqs = requests(&["slow a", "slow b", "slow c", "slow d"]);
        let started = Instant::now();

        let out = geocode_all(fake.clone(), &reqs, &pacing(10, 2, Some(100))).await;

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for (_, at) in calls.iter() {
            assert!(at.duration_since(started) < Duration::from_millis(100));
        }
        assert!(out[0].is_hit() && out[1].is_hit());
        assert!(out[2..]
            .iter()
            .all(|g| *g == Geocode::Miss(GeocodeMiss::Skipped)));
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let fake = Arc::new(Scripted::default());
        assert!(geocode_all(fake, &[], &pacing(200, 1, None)).await.is_empty());
    }

    #[test]
    fn estimate_counts_gaps_between_requests() {
        assert_eq!(pacing(200, 1, None).estimate(0), Duration::ZERO);
        assert_eq!(pacing(200, 1, None).estimate(1), Duration::ZERO);
        assert_eq!(pacing(200, 1, None).estimate(301), Duration::from_secs(60));
        // an absurd delay saturates instead of overflowing
        assert_eq!(pacing(u64::MAX, 1, None).estimate(usize::MAX), Duration::MAX);
    }
}
