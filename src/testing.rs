//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a `ProviderService` implementation without
//! spinning up a gRPC server; [`StubConfigApi`] stands in for the Dynatrace
//! configuration API so handlers can be exercised without a network.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_dynatrace::testing::{ProviderTester, StubConfigApi};
//! use hemmer_provider_dynatrace::DynatraceProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create_zone() {
//!     let stub = Arc::new(StubConfigApi::new());
//!     let tester = ProviderTester::new(DynatraceProvider::with_api(stub));
//!
//!     let state = tester.create("dynatrace_management_zones", json!({
//!         "name": "zone-a"
//!     })).await.unwrap();
//!
//!     assert_eq!(state["name"], "zone-a");
//! }
//! ```

use crate::client::ConfigApi;
use crate::error::{ApiError, ProviderError};
use crate::models::{AlertingProfile, EntityShortRepresentation, ManagementZone};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A test harness for provider implementations.
///
/// This wraps a `ProviderService` implementation and provides
/// simplified methods for testing without a gRPC server.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Ok(())` if validation passes (no error diagnostics).
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Ok(())` if configuration succeeds.
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;

        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;

        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;

        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;

        self.read(resource_type, updated_state).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Stub API adapter
// =========================================================================

/// An in-memory stand-in for the Dynatrace configuration API.
///
/// Records every call by method name, assigns sequential identifiers on
/// create, and can be switched into a failing mode where every call returns
/// an HTTP 502 with a stub body. Lookups of unknown identifiers return 404,
/// so not-found handling is testable too.
pub struct StubConfigApi {
    zones: Mutex<HashMap<String, ManagementZone>>,
    profiles: Mutex<HashMap<String, AlertingProfile>>,
    calls: Mutex<Vec<&'static str>>,
    failing: AtomicBool,
    next_id: AtomicUsize,
}

impl StubConfigApi {
    /// Create an empty stub.
    pub fn new() -> Self {
        Self {
            zones: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Seed a management zone under the given identifier.
    pub fn put_zone(&self, id: &str, mut zone: ManagementZone) {
        zone.id = Some(id.to_string());
        self.zones.lock().unwrap().insert(id.to_string(), zone);
    }

    /// Seed an alerting profile under the given identifier.
    pub fn put_profile(&self, id: &str, mut profile: AlertingProfile) {
        profile.id = Some(id.to_string());
        self.profiles.lock().unwrap().insert(id.to_string(), profile);
    }

    /// The currently stored zone, if any.
    pub fn zone(&self, id: &str) -> Option<ManagementZone> {
        self.zones.lock().unwrap().get(id).cloned()
    }

    /// The currently stored profile, if any.
    pub fn profile(&self, id: &str) -> Option<AlertingProfile> {
        self.profiles.lock().unwrap().get(id).cloned()
    }

    /// The recorded call names, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every subsequent call fail with an HTTP 502.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Make subsequent calls succeed again.
    pub fn succeed_all(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn record(&self, call: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            Err(ApiError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                url: format!("stub://{}", call),
                body: "stub failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn not_found(&self, call: &str, id: &str) -> ApiError {
        ApiError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            url: format!("stub://{}/{}", call, id),
            body: format!(r#"{{"error":{{"code":404,"message":"{} not found"}}}}"#, id),
        }
    }

    fn assign_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for StubConfigApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigApi for StubConfigApi {
    async fn get_management_zone(&self, id: &str) -> Result<ManagementZone, ApiError> {
        self.record("get_management_zone")?;
        self.zones
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| self.not_found("managementZones", id))
    }

    async fn create_management_zone(
        &self,
        zone: &ManagementZone,
    ) -> Result<EntityShortRepresentation, ApiError> {
        self.record("create_management_zone")?;
        let id = self.assign_id("mz");
        let mut stored = zone.clone();
        stored.id = Some(id.clone());
        self.zones.lock().unwrap().insert(id.clone(), stored);
        Ok(EntityShortRepresentation {
            id,
            name: Some(zone.name.clone()),
            description: None,
        })
    }

    async fn update_management_zone(
        &self,
        id: &str,
        zone: &ManagementZone,
    ) -> Result<(), ApiError> {
        self.record("update_management_zone")?;
        let mut stored = zone.clone();
        stored.id = Some(id.to_string());
        self.zones.lock().unwrap().insert(id.to_string(), stored);
        Ok(())
    }

    async fn delete_management_zone(&self, id: &str) -> Result<(), ApiError> {
        self.record("delete_management_zone")?;
        self.zones
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| self.not_found("managementZones", id))
    }

    async fn get_alerting_profile(&self, id: &str) -> Result<AlertingProfile, ApiError> {
        self.record("get_alerting_profile")?;
        self.profiles
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| self.not_found("alertingProfiles", id))
    }

    async fn create_alerting_profile(
        &self,
        profile: &AlertingProfile,
    ) -> Result<EntityShortRepresentation, ApiError> {
        self.record("create_alerting_profile")?;
        let id = self.assign_id("ap");
        let mut stored = profile.clone();
        stored.id = Some(id.clone());
        self.profiles.lock().unwrap().insert(id.clone(), stored);
        Ok(EntityShortRepresentation {
            id,
            name: Some(profile.display_name.clone()),
            description: None,
        })
    }

    async fn update_alerting_profile(
        &self,
        id: &str,
        profile: &AlertingProfile,
    ) -> Result<(), ApiError> {
        self.record("update_alerting_profile")?;
        let mut stored = profile.clone();
        stored.id = Some(id.to_string());
        self.profiles.lock().unwrap().insert(id.to_string(), stored);
        Ok(())
    }

    async fn delete_alerting_profile(&self, id: &str) -> Result<(), ApiError> {
        self.record("delete_alerting_profile")?;
        self.profiles
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| self.not_found("alertingProfiles", id))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DynatraceProvider;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stub_records_calls_in_order() {
        let stub = StubConfigApi::new();
        let zone = ManagementZone {
            id: None,
            name: "zone-a".to_string(),
            rules: vec![],
        };
        let created = stub.create_management_zone(&zone).await.unwrap();
        stub.get_management_zone(&created.id).await.unwrap();
        assert_eq!(
            stub.calls(),
            vec!["create_management_zone", "get_management_zone"]
        );
    }

    #[tokio::test]
    async fn test_stub_failure_mode() {
        let stub = StubConfigApi::new();
        stub.fail_all();
        let err = stub.get_management_zone("mz-1").await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!err.is_not_found());

        stub.succeed_all();
        let err = stub.get_management_zone("mz-1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_tester_resource_types() {
        let stub = Arc::new(StubConfigApi::new());
        let tester = ProviderTester::new(DynatraceProvider::with_api(stub));
        let types = tester.resource_types();
        assert!(types.contains(&"dynatrace_management_zones".to_string()));
        assert!(types.contains(&"dynatrace_alerting_profiles".to_string()));
    }

    #[tokio::test]
    async fn test_tester_validate_resource_config() {
        let stub = Arc::new(StubConfigApi::new());
        let tester = ProviderTester::new(DynatraceProvider::with_api(stub));

        tester
            .validate_resource_config("dynatrace_management_zones", json!({"name": "zone-a"}))
            .await
            .unwrap();

        let err = tester
            .validate_resource_config("dynatrace_management_zones", json!({"name": 7}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(_)));
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid type for attribute 'name'")];
        assert_error_contains(&diagnostics, "Invalid type");
        assert_error_contains(&diagnostics, "name");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
