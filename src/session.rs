//! Client session: the catalog in use, the student-id → state map, and the data source settings.
//!
//! Every mutation is applied to the in-memory map and persisted to the local store first;
//! only then is it mirrored to the remote endpoint, whose outcome never rolls anything back.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::errors::AppError;
use crate::filter::{filter_measures, filter_students};
use crate::gateway::{MirrorHandle, RemoteGateway, ScriptBridge};
use crate::models::{
    state_for, Action, Catalog, ClassGroup, MeasureDefinition, MeasureRef, SharedState, Student,
    StudentState,
};
use crate::parser::parse_catalog_str;
use crate::report::{ReportDocument, ReportOptions};
use crate::store::{self, keys, KeyValueStore};
use crate::transitions;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type IdSource = Box<dyn Fn() -> String + Send + Sync>;

/// Message shown when there is nothing to load from.
pub const NO_SOURCE_MESSAGE: &str = "Configure an endpoint or paste a JSON payload";

pub struct Tracker {
    store: Arc<dyn KeyValueStore>,
    settings: ClientConfig,
    gateway: RemoteGateway,
    bridge: Option<Arc<dyn ScriptBridge>>,
    catalog: Catalog,
    shared: SharedState,
    last_error: Option<String>,
    using_pasted: bool,
    clock: Clock,
    ids: IdSource,
}

impl Tracker {
    /// Open a session over `store`. Persisted settings override the given defaults.
    pub async fn open(store: Arc<dyn KeyValueStore>, defaults: ClientConfig) -> Self {
        let mut settings = defaults;
        if let Some(endpoint) = store::load_setting(store.as_ref(), keys::ENDPOINT).await {
            settings.endpoint = Some(endpoint);
        }
        if let Some(api_key) = store::load_setting(store.as_ref(), keys::API_KEY).await {
            settings.api_key = Some(api_key);
        }
        if let Some(inline) = store::load_setting(store.as_ref(), keys::INLINE_JSON).await {
            settings.inline_json = Some(inline);
        }
        let shared = store::load_shared_state(store.as_ref()).await;

        Self {
            gateway: RemoteGateway::from_config(&settings),
            store,
            settings,
            bridge: None,
            catalog: Catalog::default(),
            shared,
            last_error: None,
            using_pasted: false,
            clock: Box::new(Utc::now),
            ids: Box::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_id_source(mut self, ids: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Replace the JSONP bridge used by the gateway.
    pub fn with_bridge(mut self, bridge: Arc<dyn ScriptBridge>) -> Self {
        self.gateway = self.gateway.with_bridge(bridge.clone());
        self.bridge = Some(bridge);
        self
    }

    fn rebuild_gateway(&mut self) {
        let gateway = RemoteGateway::from_config(&self.settings);
        self.gateway = match &self.bridge {
            Some(bridge) => gateway.with_bridge(bridge.clone()),
            None => gateway,
        };
    }

    pub fn settings(&self) -> &ClientConfig {
        &self.settings
    }

    pub async fn set_endpoint(&mut self, endpoint: Option<String>) -> Result<(), AppError> {
        let endpoint = endpoint.filter(|e| !e.trim().is_empty());
        self.store
            .set(keys::ENDPOINT, endpoint.as_deref().unwrap_or(""))
            .await?;
        self.settings.endpoint = endpoint;
        self.rebuild_gateway();
        Ok(())
    }

    pub async fn set_api_key(&mut self, api_key: Option<String>) -> Result<(), AppError> {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        self.store
            .set(keys::API_KEY, api_key.as_deref().unwrap_or(""))
            .await?;
        self.settings.api_key = api_key;
        self.rebuild_gateway();
        Ok(())
    }

    pub async fn set_inline_json(&mut self, inline: Option<String>) -> Result<(), AppError> {
        let inline = inline.filter(|j| !j.trim().is_empty());
        self.store
            .set(keys::INLINE_JSON, inline.as_deref().unwrap_or(""))
            .await?;
        self.settings.inline_json = inline;
        Ok(())
    }

    /// Load the catalog: endpoint (fetch, then JSONP), then the pasted JSON.
    ///
    /// Never fails; the outcome is reflected in [`Tracker::last_error`]. When nothing usable
    /// is found the catalog is cleared rather than left stale.
    pub async fn load(&mut self) {
        self.using_pasted = false;

        if !self.gateway.is_configured() && self.settings.inline_json.is_none() {
            self.fail_load(NO_SOURCE_MESSAGE.to_string());
            return;
        }

        if self.gateway.is_configured() {
            match self.gateway.load_catalog().await {
                Ok(catalog) => {
                    info!(
                        classes = catalog.classes.len(),
                        measures = catalog.measures.len(),
                        "Catalog loaded from endpoint"
                    );
                    self.catalog = catalog;
                    let shared = self.gateway.load_shared_state().await;
                    if !shared.is_empty() {
                        self.shared = shared;
                        self.persist().await;
                    }
                    self.last_error = None;
                    return;
                }
                Err(e) => {
                    warn!("Endpoint load failed: {}", e);
                    self.last_error = Some(e.message());
                }
            }
        }

        match self.settings.inline_json.as_deref().map(parse_catalog_str) {
            Some(Ok(catalog)) => {
                info!("Catalog loaded from pasted JSON");
                self.catalog = catalog;
                self.using_pasted = true;
                self.last_error = None;
            }
            Some(Err(e)) => self.fail_load(AppError::from(e).message()),
            None => {
                let message = self
                    .last_error
                    .take()
                    .unwrap_or_else(|| NO_SOURCE_MESSAGE.to_string());
                self.fail_load(message);
            }
        }
    }

    fn fail_load(&mut self, message: String) {
        self.catalog = Catalog::default();
        self.last_error = Some(message);
    }

    /// Most recent load failure, if the last load did not succeed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the catalog in use came from the pasted JSON.
    pub fn is_using_pasted(&self) -> bool {
        self.using_pasted
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn classes(&self) -> &[ClassGroup] {
        &self.catalog.classes
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared
    }

    pub fn student_state(&self, student_id: &str) -> Cow<'_, StudentState> {
        state_for(&self.shared, student_id)
    }

    pub fn search_measures(&self, query: &str) -> Vec<&MeasureDefinition> {
        filter_measures(&self.catalog.measures, query)
    }

    /// Roster of a class filtered by student name.
    pub fn search_students(&self, class_id: &str, query: &str) -> Vec<&Student> {
        self.catalog
            .class(class_id)
            .map(|c| filter_students(&c.students, query))
            .unwrap_or_default()
    }

    pub async fn activate(&mut self, student_id: &str, measure: MeasureRef<'_>) -> MirrorHandle {
        self.dispatch(Action::Activate {
            student_id: student_id.to_string(),
            measure_id: measure.id.to_string(),
            measure_name: measure.name.to_string(),
        })
        .await
    }

    pub async fn toggle(&mut self, student_id: &str, measure_id: &str) -> MirrorHandle {
        self.dispatch(Action::Toggle {
            student_id: student_id.to_string(),
            measure_id: measure_id.to_string(),
        })
        .await
    }

    pub async fn remove(&mut self, student_id: &str, measure_id: &str) -> MirrorHandle {
        self.dispatch(Action::Remove {
            student_id: student_id.to_string(),
            measure_id: measure_id.to_string(),
        })
        .await
    }

    pub async fn comment(&mut self, student_id: &str, measure_id: &str, text: &str) -> MirrorHandle {
        self.dispatch(Action::Comment {
            student_id: student_id.to_string(),
            measure_id: measure_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Apply locally, persist, then mirror.
    async fn dispatch(&mut self, action: Action) -> MirrorHandle {
        let next = {
            let current = state_for(&self.shared, action.student_id());
            match transitions::apply(&current, &action, || (self.clock)(), || (self.ids)()) {
                Cow::Borrowed(_) => None,
                Cow::Owned(next) => Some(next),
            }
        };
        if let Some(next) = next {
            self.shared.insert(action.student_id().to_string(), next);
            self.persist().await;
        }
        self.gateway.mirror(&action)
    }

    async fn persist(&self) {
        if let Err(e) = store::save_shared_state(self.store.as_ref(), &self.shared).await {
            warn!("Could not persist state snapshot: {}", e);
        }
    }

    /// Report of one student, rendered with the class that lists them.
    pub fn student_report(
        &self,
        student_id: &str,
        opts: &ReportOptions<'_>,
    ) -> Option<ReportDocument> {
        let (class, student) = self.catalog.class_of(student_id)?;
        Some(ReportDocument::for_student(
            &class.name,
            &student.name,
            &self.student_state(student_id),
            opts,
        ))
    }

    pub fn class_report(&self, class_id: &str, opts: &ReportOptions<'_>) -> Option<ReportDocument> {
        let class = self.catalog.class(class_id)?;
        Some(ReportDocument::for_class(
            &class.name,
            &class.students,
            &self.shared,
            opts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MirrorOutcome;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    const CATALOG: &str = r#"{
        "measures": [{ "id": "M1", "name": "Medida 1" }],
        "classes": [{ "id": "1A", "name": "1ºA", "students": [{ "id": "A1", "name": "Ana" }] }]
    }"#;

    fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let tick = AtomicU32::new(0);
        move || {
            let n = tick.fetch_add(1, Ordering::SeqCst);
            Utc.with_ymd_and_hms(2025, 1, 1, 8, n, 0).unwrap()
        }
    }

    async fn pasted_tracker(store: Arc<MemoryStore>) -> Tracker {
        let defaults = ClientConfig {
            inline_json: Some(CATALOG.to_string()),
            ..ClientConfig::default()
        };
        let mut tracker = Tracker::open(store, defaults)
            .await
            .with_clock(ticking_clock())
            .with_id_source(|| "c-1".to_string());
        tracker.load().await;
        tracker
    }

    #[tokio::test]
    async fn test_no_source_reports_error() {
        let mut tracker = Tracker::open(Arc::new(MemoryStore::new()), ClientConfig::default()).await;
        tracker.load().await;
        assert_eq!(tracker.last_error(), Some(NO_SOURCE_MESSAGE));
        assert!(tracker.catalog().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_reported() {
        let mut tracker = Tracker::open(Arc::new(MemoryStore::new()), ClientConfig::default()).await;
        tracker
            .set_endpoint(Some("not a url".to_string()))
            .await
            .unwrap();
        tracker.load().await;

        let error = tracker.last_error().unwrap();
        assert_ne!(error, NO_SOURCE_MESSAGE);
        assert!(error.starts_with("invalid endpoint URL"));
        assert!(tracker.catalog().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_falls_back_to_paste() {
        let defaults = ClientConfig {
            endpoint: Some("::bad::".to_string()),
            inline_json: Some(CATALOG.to_string()),
            ..ClientConfig::default()
        };
        let mut tracker = Tracker::open(Arc::new(MemoryStore::new()), defaults).await;
        tracker.load().await;

        assert_eq!(tracker.last_error(), None);
        assert!(tracker.is_using_pasted());
    }

    #[tokio::test]
    async fn test_invalid_paste_clears_catalog() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = pasted_tracker(store).await;
        assert!(tracker.is_using_pasted());
        assert_eq!(tracker.classes().len(), 1);

        tracker
            .set_inline_json(Some(r#"{"classes": []}"#.to_string()))
            .await
            .unwrap();
        tracker.load().await;
        assert!(tracker.last_error().is_some());
        assert!(tracker.catalog().is_empty());
        assert!(!tracker.is_using_pasted());
    }

    #[tokio::test]
    async fn test_activate_toggle_comment_scenario() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = pasted_tracker(store.clone()).await;
        assert_eq!(tracker.last_error(), None);

        let m1 = tracker.catalog().measures[0].clone();
        let handle = tracker.activate("A1", MeasureRef::from(&m1)).await;
        // no endpoint configured: nothing is mirrored
        assert_eq!(handle.outcome().await, MirrorOutcome::Skipped);
        tracker.toggle("A1", "M1").await;
        assert!(!tracker.student_state("A1").measures[0].active);
        tracker.toggle("A1", "M1").await;
        tracker.comment("A1", "M1", "progreso").await;

        let state = tracker.student_state("A1");
        assert_eq!(state.measures.len(), 1);
        let m = &state.measures[0];
        assert!(m.active);
        assert!(m.ended_at.is_none());
        assert_eq!(m.comments.len(), 1);
        assert_eq!(m.comments[0].text, "progreso");
        assert_eq!(m.comments[0].id, "c-1");

        // the snapshot survives a new session over the same store
        let reopened = Tracker::open(store, ClientConfig::default()).await;
        assert_eq!(reopened.student_state("A1").measures[0].comments.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_actions_leave_state_absent() {
        let mut tracker = pasted_tracker(Arc::new(MemoryStore::new())).await;
        tracker.toggle("A1", "M1").await;
        tracker.remove("A1", "M1").await;
        tracker.comment("A1", "M1", "hola").await;
        assert!(tracker.shared_state().is_empty());
    }

    #[tokio::test]
    async fn test_settings_persist() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = Tracker::open(store.clone(), ClientConfig::default()).await;
        tracker
            .set_endpoint(Some("http://127.0.0.1:9/exec".to_string()))
            .await
            .unwrap();
        tracker.set_api_key(Some("k-1".to_string())).await.unwrap();

        let reopened = Tracker::open(store, ClientConfig::default()).await;
        assert_eq!(
            reopened.settings().endpoint.as_deref(),
            Some("http://127.0.0.1:9/exec")
        );
        assert_eq!(reopened.settings().api_key.as_deref(), Some("k-1"));
    }

    #[tokio::test]
    async fn test_reports_use_catalog_names() {
        let mut tracker = pasted_tracker(Arc::new(MemoryStore::new())).await;
        tracker
            .activate(
                "A1",
                MeasureRef {
                    id: "M1",
                    name: "Medida 1",
                },
            )
            .await;
        let fmt = crate::report::default_format_date;
        let opts = ReportOptions {
            format_date: &fmt,
            generated_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        };

        let doc = tracker.student_report("A1", &opts).unwrap();
        assert_eq!(doc.filename, "informe-Ana.html");
        assert!(doc.html.contains("Class: 1ºA"));
        assert!(doc.html.contains("Medida 1"));

        let doc = tracker.class_report("1A", &opts).unwrap();
        assert_eq!(doc.filename, "informe-clase-1ºA.html");
        assert!(tracker.class_report("9Z", &opts).is_none());
        assert!(tracker.student_report("Z9", &opts).is_none());
        assert_eq!(tracker.search_students("1A", "an").len(), 1);
    }
}
