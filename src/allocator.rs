// Allocator core (C6)
//
// State machine + greedy allocation loop + event emission for one
// receiving participant. `update()` is the sole critical section; it is
// serialized through `inner`'s mutex exactly as spec.md §5 requires.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::allocation::{PreferredLayer, SingleSourceAllocation, SUSPENDED};
use crate::config::AllocatorConfig;
use crate::constraints::VideoConstraints;
use crate::effective_constraints::{derive_effective_constraints, OnStagePolicy};
use crate::endpoint::{EndpointSupplier, EndpointTransceiverStats, TrustBwePolicy};
use crate::layer::{EndpointId, LayerDesc, MediaSourceDesc, SourceName};
use crate::predictor::PredictorClient;
use crate::prioritizer::prioritize;
use crate::settings::AllocationSettings;
use crate::stats::build_stats_document;

/// A budget large enough that subtracting any plausible layer bitrate
/// from it cannot overflow, used when BWE is not trusted (spec.md §4.4).
const UNBOUNDED_BUDGET: i64 = i64::MAX / 2;

/// One source's outcome for this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleAllocation {
    pub endpoint_id: EndpointId,
    pub source_name: SourceName,
    pub target_layer: Option<LayerDesc>,
    pub ideal_layer: Option<LayerDesc>,
}

/// Immutable per-cycle allocation result.
#[derive(Debug, Clone)]
pub struct BandwidthAllocation {
    pub allocations: Vec<SingleAllocation>,
    pub oversending: bool,
    pub target_bps: i64,
    pub ideal_bps: i64,
    pub suspended_source_names: Vec<SourceName>,
}

impl BandwidthAllocation {
    pub fn empty() -> Self {
        Self {
            allocations: Vec::new(),
            oversending: false,
            target_bps: 0,
            ideal_bps: 0,
            suspended_source_names: Vec::new(),
        }
    }

    pub fn target_bps(&self) -> i64 {
        self.target_bps
    }

    pub fn ideal_bps(&self) -> i64 {
        self.ideal_bps
    }

    fn identity_set(&self) -> HashSet<(SourceName, i64)> {
        self.allocations
            .iter()
            .map(|a| (a.source_name.clone(), a.target_layer.as_ref().map(|l| l.index as i64).unwrap_or(SUSPENDED)))
            .collect()
    }
}

/// Two allocations are equal iff the sets of `(source_name,
/// target_layer.index)` match and `oversending`/suspended match
/// (spec.md §3).
impl PartialEq for BandwidthAllocation {
    fn eq(&self, other: &Self) -> bool {
        self.oversending == other.oversending
            && self.suspended_source_names.iter().collect::<HashSet<_>>()
                == other.suspended_source_names.iter().collect::<HashSet<_>>()
            && self.identity_set() == other.identity_set()
    }
}

/// Event contract with downstream consumers. Handlers run synchronously
/// inside the cycle's critical section (spec.md §5) and must not block.
pub trait EventHandler: Send + Sync {
    fn source_list_changed(&self, _sources: &[MediaSourceDesc]) {}
    fn allocation_changed(&self, _allocation: &BandwidthAllocation) {}
    fn effective_video_constraints_changed(
        &self,
        _old: &HashMap<SourceName, VideoConstraints>,
        _new: &HashMap<SourceName, VideoConstraints>,
    ) {
    }
}

struct Inner {
    bwe_bps: i64,
    allocation_settings: AllocationSettings,
    effective_constraints: HashMap<SourceName, VideoConstraints>,
    last_update_time: Instant,
    subscribers: Vec<Arc<dyn EventHandler>>,
}

/// Published, cheaply-cloneable view for read-only getters, which may be
/// one cycle stale per spec.md §5.
#[derive(Clone)]
struct Published {
    allocation: Arc<BandwidthAllocation>,
    effective_constraints: Arc<HashMap<SourceName, VideoConstraints>>,
    bwe_bps: i64,
    trust_bwe: bool,
    allocation_settings: Arc<AllocationSettings>,
}

pub struct Allocator {
    config: AllocatorConfig,
    receiver_endpoint_id: EndpointId,
    endpoint_supplier: Arc<dyn EndpointSupplier>,
    trust_bwe: Arc<dyn TrustBwePolicy>,
    predictor: Arc<dyn PredictorClient>,
    inner: Mutex<Inner>,
    published: RwLock<Published>,
    expired: AtomicBool,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Allocator {
    pub fn new(
        config: AllocatorConfig,
        receiver_endpoint_id: EndpointId,
        initial_settings: AllocationSettings,
        endpoint_supplier: Arc<dyn EndpointSupplier>,
        trust_bwe: Arc<dyn TrustBwePolicy>,
        predictor: Arc<dyn PredictorClient>,
    ) -> Arc<Self> {
        let published = Published {
            allocation: Arc::new(BandwidthAllocation::empty()),
            effective_constraints: Arc::new(HashMap::new()),
            bwe_bps: -1,
            trust_bwe: true,
            allocation_settings: Arc::new(initial_settings.clone()),
        };

        Arc::new(Self {
            config,
            receiver_endpoint_id,
            endpoint_supplier,
            trust_bwe,
            predictor,
            inner: Mutex::new(Inner {
                bwe_bps: -1,
                allocation_settings: initial_settings,
                effective_constraints: HashMap::new(),
                last_update_time: Instant::now(),
                subscribers: Vec::new(),
            }),
            published: RwLock::new(published),
            expired: AtomicBool::new(false),
            scheduler_handle: Mutex::new(None),
        })
    }

    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.inner.lock().await.subscribers.push(handler);
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Cancels the scheduled timer and marks the allocator terminal.
    /// Idempotent; future `update()` calls become no-ops.
    pub async fn expire(&self) {
        self.expired.store(true, Ordering::Release);
        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub(crate) async fn set_scheduler_handle(&self, handle: JoinHandle<()>) {
        *self.scheduler_handle.lock().await = Some(handle);
    }

    pub async fn last_update_time(&self) -> Instant {
        self.inner.lock().await.last_update_time
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// If the change vs the current BWE exceeds the configured threshold
    /// fraction, stores the new value and triggers a cycle; otherwise
    /// ignores it (spec.md §4.4).
    pub async fn bandwidth_changed(self: &Arc<Self>, new_bps: i64) {
        let new_bps = if new_bps < -1 { -1 } else { new_bps };

        let changed = {
            let mut inner = self.inner.lock().await;
            let previous = inner.bwe_bps;
            let changed = bwe_changed(previous, new_bps, self.config.bwe_change_threshold_fraction);
            if changed {
                inner.bwe_bps = new_bps;
            }
            changed
        };

        if changed {
            self.update().await;
        }
    }

    /// Replaces the allocation settings and triggers a cycle.
    pub async fn update_settings(self: &Arc<Self>, settings: AllocationSettings) {
        {
            let mut inner = self.inner.lock().await;
            inner.allocation_settings = settings;
        }
        self.update().await;
    }

    /// Runs one allocation cycle. No-op if expired.
    pub async fn update(self: &Arc<Self>) {
        if self.is_expired() {
            return;
        }

        let mut inner = self.inner.lock().await;
        if self.is_expired() {
            return;
        }

        inner.last_update_time = Instant::now();

        let endpoints = self.endpoint_supplier.endpoints();
        let peer_stats: HashMap<EndpointId, EndpointTransceiverStats> =
            endpoints.iter().map(|endpoint| (endpoint.id(), endpoint.transceiver_stats())).collect();
        let sources: Vec<MediaSourceDesc> =
            endpoints.iter().flat_map(|endpoint| endpoint.media_sources()).collect();

        let selected = inner.allocation_settings.selected_in_priority_order();
        let sorted = prioritize(&sources, &selected);

        let old_effective = inner.effective_constraints.clone();
        let on_stage_policy = OnStagePolicy {
            on_stage_max_height_px: self.config.on_stage_max_height_px,
            thumbnail_max_height_px: self.config.thumbnail_max_height_px,
        };
        let new_effective = derive_effective_constraints(&sorted, &inner.allocation_settings, on_stage_policy);
        inner.effective_constraints = new_effective.clone();

        for subscriber in &inner.subscribers {
            subscriber.source_list_changed(&sorted);
        }

        let preferred = PreferredLayer {
            height: self.config.on_stage_preferred_height_px,
            frame_rate: self.config.on_stage_preferred_framerate,
        };

        let mut ssas: Vec<SingleSourceAllocation> = sorted
            .iter()
            .map(|source| {
                let constraints = new_effective
                    .get(&source.source_name)
                    .copied()
                    .unwrap_or_else(VideoConstraints::disabled);
                let on_stage = inner.allocation_settings.is_on_stage(&source.source_name);
                SingleSourceAllocation::new(source, constraints, on_stage, preferred)
            })
            .collect();

        let budget = if self.trust_bwe.trust_bwe() { inner.bwe_bps.max(-1) } else { UNBOUNDED_BUDGET };
        let budget = if budget < 0 { UNBOUNDED_BUDGET } else { budget };

        let mut oversending = false;

        if self.config.predictor_url.is_some() {
            let sources_by_name: HashMap<&str, &MediaSourceDesc> =
                sorted.iter().map(|s| (s.source_name.as_str(), s)).collect();
            let stats_doc = build_stats_document(
                &self.receiver_endpoint_id,
                &ssas,
                &sources_by_name,
                &peer_stats,
                budget,
                unix_millis_now(),
            );

            match self.predictor.predict(stats_doc).await {
                Some(response) if response.use_rl => {
                    let mut remaining = budget;
                    for (i, ssa) in ssas.iter_mut().enumerate() {
                        let hint = response.target_for(&ssa.owner_endpoint_id);
                        let stage_view = i == 0 && ssa.on_stage;
                        let consumed = ssa.rl_apply(hint, remaining, stage_view);
                        remaining -= consumed;
                        if remaining < 0 {
                            oversending = true;
                        }
                    }
                }
                _ => {
                    oversending = run_greedy_fallback(&mut ssas, budget);
                }
            }
        } else {
            oversending = run_greedy_fallback(&mut ssas, budget);
        }

        let target_bps: i64 = ssas.iter().map(|s| s.target_bitrate() as i64).sum();
        let ideal_bps: i64 = ssas.iter().map(|s| s.ideal_bitrate() as i64).sum();
        if !oversending {
            oversending = target_bps > budget;
        }

        let suspended_source_names: Vec<SourceName> =
            ssas.iter().filter(|s| s.is_suspended()).map(|s| s.source_name.clone()).collect();

        let sources_by_name: HashMap<&str, &MediaSourceDesc> =
            sorted.iter().map(|s| (s.source_name.as_str(), s)).collect();

        let allocations: Vec<SingleAllocation> = ssas
            .iter()
            .map(|ssa| {
                let source = sources_by_name.get(ssa.source_name.as_str()).copied();
                let layer_at = |index: i64| -> Option<LayerDesc> {
                    if index < 0 {
                        return None;
                    }
                    source.and_then(|s| s.layers.iter().find(|l| l.index as i64 == index).copied())
                };
                SingleAllocation {
                    endpoint_id: ssa.owner_endpoint_id.clone(),
                    source_name: ssa.source_name.clone(),
                    target_layer: layer_at(ssa.target_index()),
                    ideal_layer: layer_at(ssa.ideal_index()),
                }
            })
            .collect();

        let new_allocation = BandwidthAllocation {
            allocations,
            oversending,
            target_bps,
            ideal_bps,
            suspended_source_names,
        };

        let previous_allocation = self.published.read().await.allocation.clone();
        let allocation_changed = *previous_allocation != new_allocation;
        let constraints_changed = old_effective != new_effective;

        if allocation_changed {
            for subscriber in &inner.subscribers {
                subscriber.allocation_changed(&new_allocation);
            }
        }
        if constraints_changed {
            for subscriber in &inner.subscribers {
                subscriber.effective_video_constraints_changed(&old_effective, &new_effective);
            }
        }

        let mut published = self.published.write().await;
        published.allocation = Arc::new(new_allocation);
        published.effective_constraints = Arc::new(new_effective);
        published.bwe_bps = inner.bwe_bps;
        published.trust_bwe = self.trust_bwe.trust_bwe();
        published.allocation_settings = Arc::new(inner.allocation_settings.clone());
    }

    pub async fn get_allocation(&self) -> Arc<BandwidthAllocation> {
        self.published.read().await.allocation.clone()
    }

    pub async fn is_forwarding(&self, endpoint_id: &EndpointId) -> bool {
        self.published
            .read()
            .await
            .allocation
            .allocations
            .iter()
            .any(|a| &a.endpoint_id == endpoint_id && a.target_layer.is_some())
    }

    pub async fn has_non_zero_effective_constraints(&self, source: &SourceName) -> bool {
        self.published
            .read()
            .await
            .effective_constraints
            .get(source)
            .map(|c| !c.is_disabled())
            .unwrap_or(false)
    }

    pub async fn get_debug_state(&self) -> serde_json::Value {
        let published = self.published.read().await;
        json!({
            "trustBwe": published.trust_bwe,
            "bweBps": published.bwe_bps,
            "allocation": {
                "oversending": published.allocation.oversending,
                "targetBps": published.allocation.target_bps,
                "idealBps": published.allocation.ideal_bps,
                "suspended": published.allocation.suspended_source_names,
            },
            "allocationSettings": &*published.allocation_settings,
            "effectiveConstraints": &*published.effective_constraints,
        })
    }
}

/// `|n - p| > p * threshold` with either sentinel forcing a change,
/// per spec.md §4.4.
fn bwe_changed(previous: i64, new: i64, threshold_fraction: f64) -> bool {
    if previous == -1 || new == -1 {
        return true;
    }
    let diff = (new - previous).unsigned_abs() as f64;
    diff > previous as f64 * threshold_fraction
}

/// Wall-clock timestamp, in milliseconds since the Unix epoch, stamped
/// onto the C7 stats document sent to the predictor.
fn unix_millis_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Runs greedy improvement passes to a fixpoint (spec.md §4.4 step 9).
/// Returns whether the budget was exceeded.
///
/// `remaining` tracks the *true* leftover budget — `budget` minus the sum
/// of every source's current `target_bitrate()` — across the whole
/// fixpoint, not just within one pass. A fresh pass therefore starts from
/// what earlier passes actually committed rather than the full budget
/// again, otherwise a lower-priority source would see higher-priority
/// sources' already-spent bitrate as still available and overcommit.
fn run_greedy_fallback(ssas: &mut [SingleSourceAllocation], budget: i64) -> bool {
    let mut oversending = false;
    let mut previous_remaining = i64::MIN;

    loop {
        let committed: i64 = ssas.iter().map(|s| s.target_bitrate() as i64).sum();
        let mut remaining = budget - committed;

        for (i, ssa) in ssas.iter_mut().enumerate() {
            if ssa.constraints.is_disabled() {
                continue;
            }
            // Give this source back its own current spend before calling
            // `improve`, so it sees the bitrate truly available to it
            // (unclaimed leftover plus whatever it already holds), since
            // a layer's bitrate replaces its prior choice rather than
            // adding to it.
            let before = ssa.target_bitrate() as i64;
            remaining += before;
            let stage_view = i == 0 && ssa.on_stage;
            ssa.improve(remaining, stage_view);
            remaining -= ssa.target_bitrate() as i64;
            if remaining < 0 {
                oversending = true;
            }
            if i == 0 && ssa.on_stage && !ssa.has_reached_preferred() {
                break;
            }
        }

        if remaining == previous_remaining {
            break;
        }
        previous_remaining = remaining;
    }

    oversending
}
