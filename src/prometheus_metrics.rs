//! Prometheus export of resolver metrics
//!
//! Counters advance by the difference between the last observed
//! [`MetricsSnapshot`] and the current one; [`CacheStats`] and
//! [`RegistryStats`] feed plain gauges. The resolver's hot path only
//! touches atomics.

use crate::cache::CacheStats;
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::registry::RegistryStats;
use crate::resolver::ServletResolver;
use parking_lot::Mutex;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Prometheus series mirroring the resolver counters
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    last: Arc<Mutex<MetricsSnapshot>>,

    /// Resolutions by outcome (matched, default)
    pub resolutions: IntCounterVec,

    /// Cache events by kind (hit, miss, flush, rejected_put)
    pub cache_events: IntCounterVec,

    pub cache_entries: IntGauge,
    pub cache_capacity: IntGauge,

    pub collector_runs: IntCounter,
    pub candidates_probed: IntCounter,
    pub opting_declined: IntCounter,

    /// Error handling invocations by kind (handled, recursive)
    pub error_handlings: IntCounterVec,

    /// Registry events by kind (bind, rejected, unbind, teardown_failure)
    pub registry_events: IntCounterVec,

    /// Registrations by state (bound, pending)
    pub registrations: IntGaugeVec,
}

impl PrometheusMetrics {
    /// Create metrics on a fresh registry
    pub fn new() -> std::result::Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics with custom registry
    pub fn with_registry(registry: Registry) -> std::result::Result<Self, prometheus::Error> {
        let resolutions = IntCounterVec::new(
            Opts::new(
                "servlet_resolver_resolutions_total",
                "Request resolutions by outcome",
            ),
            &["outcome"], // outcome: matched, default
        )?;
        registry.register(Box::new(resolutions.clone()))?;

        let cache_events = IntCounterVec::new(
            Opts::new(
                "servlet_resolver_cache_events_total",
                "Resolution cache events by kind",
            ),
            &["event"], // event: hit, miss, flush, rejected_put
        )?;
        registry.register(Box::new(cache_events.clone()))?;

        let cache_entries = IntGauge::new(
            "servlet_resolver_cache_entries",
            "Current number of cached resolutions",
        )?;
        registry.register(Box::new(cache_entries.clone()))?;

        let cache_capacity = IntGauge::new(
            "servlet_resolver_cache_capacity",
            "Maximum number of cached resolutions (0 when disabled)",
        )?;
        registry.register(Box::new(cache_capacity.clone()))?;

        let collector_runs = IntCounter::new(
            "servlet_resolver_collector_runs_total",
            "Number of candidate collections (cache misses and uncached lookups)",
        )?;
        registry.register(Box::new(collector_runs.clone()))?;

        let candidates_probed = IntCounter::new(
            "servlet_resolver_candidates_total",
            "Number of candidate paths produced by the collector",
        )?;
        registry.register(Box::new(candidates_probed.clone()))?;

        let opting_declined = IntCounter::new(
            "servlet_resolver_opting_declined_total",
            "Number of times an opting handler declined a request",
        )?;
        registry.register(Box::new(opting_declined.clone()))?;

        let error_handlings = IntCounterVec::new(
            Opts::new(
                "servlet_resolver_error_handlings_total",
                "Error handling invocations by kind",
            ),
            &["kind"], // kind: handled, recursive
        )?;
        registry.register(Box::new(error_handlings.clone()))?;

        let registry_events = IntCounterVec::new(
            Opts::new(
                "servlet_resolver_registry_events_total",
                "Handler registry events by kind",
            ),
            &["event"], // event: bind, rejected, unbind, teardown_failure
        )?;
        registry.register(Box::new(registry_events.clone()))?;

        let registrations = IntGaugeVec::new(
            Opts::new(
                "servlet_resolver_registrations",
                "Handler registrations by state",
            ),
            &["state"], // state: bound, pending
        )?;
        registry.register(Box::new(registrations.clone()))?;

        Ok(Self {
            registry,
            last: Arc::new(Mutex::new(MetricsSnapshot::default())),
            resolutions,
            cache_events,
            cache_entries,
            cache_capacity,
            collector_runs,
            candidates_probed,
            opting_declined,
            error_handlings,
            registry_events,
            registrations,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bring every series up to the resolver's current numbers
    pub fn observe(&self, resolver: &ServletResolver) {
        self.update(
            &resolver.metrics(),
            &resolver.cache_stats(),
            &resolver.registry_stats(),
        );
    }

    /// Advance the counters to `snapshot` and set the gauges.
    ///
    /// Counters never move backwards; a snapshot below the last one
    /// observed adds nothing.
    pub fn update(&self, snapshot: &MetricsSnapshot, cache: &CacheStats, registry: &RegistryStats) {
        let mut last = self.last.lock();
        let advance = |counter: IntCounter, now: u64, before: u64| {
            counter.inc_by(now.saturating_sub(before));
        };

        let matched = snapshot.resolutions.saturating_sub(snapshot.default_fallbacks);
        let matched_before = last.resolutions.saturating_sub(last.default_fallbacks);
        advance(self.resolutions.with_label_values(&["matched"]), matched, matched_before);
        advance(
            self.resolutions.with_label_values(&["default"]),
            snapshot.default_fallbacks,
            last.default_fallbacks,
        );

        for (event, now, before) in [
            ("hit", snapshot.cache_hits, last.cache_hits),
            ("miss", snapshot.cache_misses, last.cache_misses),
            ("flush", snapshot.cache_flushes, last.cache_flushes),
            ("rejected_put", snapshot.cache_rejected_puts, last.cache_rejected_puts),
        ] {
            advance(self.cache_events.with_label_values(&[event]), now, before);
        }

        advance(self.collector_runs.clone(), snapshot.collector_runs, last.collector_runs);
        advance(
            self.candidates_probed.clone(),
            snapshot.candidates_probed,
            last.candidates_probed,
        );
        advance(self.opting_declined.clone(), snapshot.opting_declined, last.opting_declined);

        for (kind, now, before) in [
            ("handled", snapshot.error_handlings, last.error_handlings),
            ("recursive", snapshot.recursive_errors, last.recursive_errors),
        ] {
            advance(self.error_handlings.with_label_values(&[kind]), now, before);
        }

        for (event, now, before) in [
            ("bind", snapshot.binds, last.binds),
            ("rejected", snapshot.bind_rejections, last.bind_rejections),
            ("unbind", snapshot.unbinds, last.unbinds),
            ("teardown_failure", snapshot.teardown_failures, last.teardown_failures),
        ] {
            advance(self.registry_events.with_label_values(&[event]), now, before);
        }
        *last = snapshot.clone();
        drop(last);

        self.cache_entries.set(to_i64(cache.entries as u64));
        self.cache_capacity.set(to_i64(cache.capacity as u64));
        self.registrations
            .with_label_values(&["bound"])
            .set(to_i64(registry.bound as u64));
        self.registrations
            .with_label_values(&["pending"])
            .set(to_i64(registry.pending as u64));
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
