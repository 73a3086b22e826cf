//! In-memory twin graph used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use twinpulse::patch::{PatchDocument, PatchOp};
use twinpulse::twin::Twin;
use twinpulse::{Connect, TwinError, TwinGraph};

#[derive(Default)]
struct State {
    twins: BTreeMap<String, Map<String, Value>>,
    patches: Vec<(String, PatchDocument)>,
    queries: Vec<String>,
    failing_patches: HashSet<String>,
    failing_queries: bool,
}

/// Twin graph held in memory. Clones share state.
///
/// Queries return matches in descending dtId order so callers cannot rely
/// on store order.
#[derive(Clone, Default)]
pub struct FakeGraph {
    state: Arc<Mutex<State>>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, twin: Value) {
        let Value::Object(mut props) = twin else {
            panic!("twin must be a JSON object");
        };
        let id = props
            .remove("$dtId")
            .and_then(|v| v.as_str().map(str::to_string))
            .expect("twin needs a $dtId");
        self.state.lock().unwrap().twins.insert(id, props);
    }

    pub fn add_asset(&self, dt_id: &str) {
        self.insert(json!({ "$dtId": dt_id }));
    }

    pub fn add_sensor(&self, dt_id: &str, device_id: &str, sensor_type: &str, observes: &str) {
        self.insert(json!({
            "$dtId": dt_id,
            "deviceId": device_id,
            "type": sensor_type,
            "observes": observes,
        }));
    }

    pub fn set(&self, dt_id: &str, property: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        let twin = state.twins.get_mut(dt_id).expect("unknown twin");
        twin.insert(property.to_string(), value);
    }

    pub fn property(&self, dt_id: &str, property: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.twins.get(dt_id)?.get(property).cloned()
    }

    pub fn number(&self, dt_id: &str, property: &str) -> Option<f64> {
        self.property(dt_id, property)?.as_f64()
    }

    pub fn fail_patches_for(&self, dt_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_patches
            .insert(dt_id.to_string());
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().failing_queries = fail;
    }

    /// Patches accepted so far, in order.
    pub fn patches(&self) -> Vec<(String, PatchDocument)> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn patches_for(&self, dt_id: &str) -> Vec<PatchDocument> {
        self.patches()
            .into_iter()
            .filter(|(id, _)| id == dt_id)
            .map(|(_, p)| p)
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().unwrap().queries.len()
    }
}

/// Quoted literal following `marker` in a query string.
fn literal_after(query: &str, marker: &str) -> Option<String> {
    let start = query.find(marker)? + marker.len();
    let rest = query[start..].strip_prefix('\'')?;
    rest.find('\'').map(|end| rest[..end].to_string())
}

#[async_trait]
impl TwinGraph for FakeGraph {
    async fn query(&self, query: &str) -> Result<Vec<Twin>, TwinError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        if state.failing_queries {
            return Err(TwinError::Store("503 Service Unavailable".to_string()));
        }

        let filter: Option<(&str, String)> = literal_after(query, "T.deviceId = ")
            .map(|v| ("deviceId", v))
            .or_else(|| literal_after(query, "T.observes = ").map(|v| ("observes", v)))
            .or_else(|| literal_after(query, "T.$dtId = ").map(|v| ("$dtId", v)));

        let twins = state
            .twins
            .iter()
            .rev()
            .filter(|(id, props)| match &filter {
                Some(("$dtId", value)) => *id == value,
                Some((property, value)) => {
                    props.get(*property).and_then(Value::as_str) == Some(value.as_str())
                }
                None => true,
            })
            .map(|(id, props)| {
                let mut value = props.clone();
                value.insert("$dtId".to_string(), Value::String(id.clone()));
                Twin::try_from(Value::Object(value)).expect("valid twin")
            })
            .collect();
        Ok(twins)
    }

    async fn patch(&self, dt_id: &str, patch: &PatchDocument) -> Result<(), TwinError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_patches.contains(dt_id) {
            return Err(TwinError::Store(format!("429 Too Many Requests for {dt_id}")));
        }
        let Some(twin) = state.twins.get_mut(dt_id) else {
            return Err(TwinError::Store(format!("404 {dt_id}")));
        };
        for op in patch.ops() {
            let property = op.path().trim_start_matches('/').to_string();
            match op {
                PatchOp::Add { value, .. } => {
                    twin.insert(property, value.clone());
                }
                PatchOp::Replace { value, .. } => {
                    if !twin.contains_key(&property) {
                        return Err(TwinError::Store(format!("replace of missing {property}")));
                    }
                    twin.insert(property, value.clone());
                }
                PatchOp::Remove { .. } => {
                    twin.remove(&property);
                }
            }
        }
        state.patches.push((dt_id.to_string(), patch.clone()));
        Ok(())
    }
}

/// Connector handing out clones of one [`FakeGraph`].
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub graph: FakeGraph,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    /// Successful connects allowed; 0 means unlimited.
    limit: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(graph: FakeGraph) -> Self {
        FakeConnector {
            graph,
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn allow_connects(&self, limit: usize) {
        self.limit.store(limit, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connect for FakeConnector {
    type Client = FakeGraph;

    async fn connect(&self) -> Result<FakeGraph, TwinError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self.limit.load(Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) || (limit > 0 && attempt > limit) {
            return Err(TwinError::Auth("token expired".to_string()));
        }
        Ok(self.graph.clone())
    }
}

pub fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}
