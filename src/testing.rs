//! Testing utilities for reconcilers.
//!
//! [`FakeFacade`] is an in-memory [`ServiceFacade`] that stores created
//! resources, can be scripted to fail or to report a sequence of statuses, and
//! records every call it receives. Together with the paused tokio clock it
//! lets a full lifecycle run without a remote API or real waiting.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_engine::testing::{FakeCall, FakeFacade};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_create_retries_throttling() {
//!     let facade = Arc::new(FakeFacade::new("vpc"));
//!     facade.fail_next(FakeCall::Create, RemoteError::new("RequestLimitExceeded", "slow down"));
//!
//!     let reconciler = Reconciler::new(vpc_definition(), Arc::clone(&facade), executor());
//!     let id = reconciler.create(&declared).await.unwrap();
//!
//!     assert_eq!(facade.call_count(FakeCall::Create), 2);
//! }
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::{ApiStruct, ApiValue};
use crate::error::{EngineError, RemoteError};
use crate::facade::{CallContext, ServiceFacade};
use crate::identifier::CompositeId;
use crate::reconciler::Reconciler;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::types::AttrMap;

/// The facade methods, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    /// [`ServiceFacade::create`]
    Create,
    /// [`ServiceFacade::describe`]
    Describe,
    /// [`ServiceFacade::update`]
    Update,
    /// [`ServiceFacade::delete`]
    Delete,
    /// [`ServiceFacade::poll_status`]
    PollStatus,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    resources: BTreeMap<String, ApiStruct>,
    deleting: BTreeMap<String, usize>,
    deletion_delay: usize,
    failures: HashMap<FakeCall, VecDeque<RemoteError>>,
    calls: HashMap<FakeCall, usize>,
    statuses: VecDeque<String>,
    last_status: Option<String>,
    created: Vec<ApiStruct>,
    updates: Vec<ApiStruct>,
    log_ids: Vec<String>,
}

/// An in-memory service facade.
///
/// Resources are keyed by the last component of their identity, the id the
/// fake assigns on create (`<prefix>-1`, `<prefix>-2`, ...).
#[derive(Debug)]
pub struct FakeFacade {
    prefix: String,
    computed: Vec<(String, ApiValue)>,
    state: Mutex<FakeState>,
}

impl FakeFacade {
    /// Create a fake that assigns ids starting with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            computed: Vec::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Add a field the fake sets on every created resource, the way a remote
    /// API fills in computed values.
    pub fn with_computed(mut self, name: impl Into<String>, value: ApiValue) -> Self {
        self.computed.push((name.into(), value));
        self
    }

    /// Seed an existing resource.
    pub fn insert(&self, id: impl Into<String>, resource: ApiStruct) {
        self.state().resources.insert(id.into(), resource);
    }

    /// Whether a resource with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        let state = self.state();
        state.resources.contains_key(id)
    }

    /// Make the next call to `call` fail with `error`. Queued failures are
    /// used in order, one per call.
    pub fn fail_next(&self, call: FakeCall, error: RemoteError) {
        self.state()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Statuses returned by successive `poll_status` calls. The last one is
    /// repeated once the script runs out.
    pub fn script_statuses<S: Into<String>>(&self, statuses: impl IntoIterator<Item = S>) {
        let mut state = self.state();
        state.statuses = statuses.into_iter().map(Into::into).collect();
        state.last_status = None;
    }

    /// Keep deleted resources describable for `describes` more describe calls.
    pub fn delay_deletion(&self, describes: usize) {
        self.state().deletion_delay = describes;
    }

    /// How many times `call` was made, including failed calls.
    pub fn call_count(&self, call: FakeCall) -> usize {
        self.state().calls.get(&call).copied().unwrap_or(0)
    }

    /// Parameters received by successful creates.
    pub fn created_params(&self) -> Vec<ApiStruct> {
        self.state().created.clone()
    }

    /// Changes received by successful updates.
    pub fn updates(&self) -> Vec<ApiStruct> {
        self.state().updates.clone()
    }

    /// Log ids of every call, in order.
    pub fn log_ids(&self) -> Vec<String> {
        self.state().log_ids.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call and return the scripted failure for it, if any.
    fn begin(&self, call: FakeCall, ctx: &CallContext) -> Result<MutexGuard<'_, FakeState>, RemoteError> {
        let mut state = self.state();
        *state.calls.entry(call).or_default() += 1;
        state.log_ids.push(ctx.log_id.clone());
        let failure = state.failures.get_mut(&call).and_then(VecDeque::pop_front);
        match failure {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

fn resource_key(identity: &[String]) -> Result<&str, RemoteError> {
    identity
        .last()
        .map(String::as_str)
        .ok_or_else(|| RemoteError::new("InvalidParameter", "empty identity"))
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::new("ResourceNotFound", format!("resource {} does not exist", id))
}

#[async_trait]
impl ServiceFacade for FakeFacade {
    async fn create(&self, ctx: &CallContext, params: ApiStruct) -> Result<Vec<String>, RemoteError> {
        let mut state = self.begin(FakeCall::Create, ctx)?;
        state.next_id += 1;
        let id = format!("{}-{}", self.prefix, state.next_id);

        let mut resource = params.clone();
        for (name, value) in &self.computed {
            resource.insert(name.clone(), value.clone());
        }
        state.resources.insert(id.clone(), resource);
        state.created.push(params);
        Ok(vec![id])
    }

    async fn describe(
        &self,
        ctx: &CallContext,
        identity: &[String],
    ) -> Result<Option<ApiStruct>, RemoteError> {
        let mut state = self.begin(FakeCall::Describe, ctx)?;
        let key = resource_key(identity)?;

        let gone = match state.deleting.get_mut(key) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            },
            None => false,
        };
        if gone {
            state.deleting.remove(key);
            state.resources.remove(key);
        }
        Ok(state.resources.get(key).cloned())
    }

    async fn update(
        &self,
        ctx: &CallContext,
        identity: &[String],
        changes: ApiStruct,
    ) -> Result<(), RemoteError> {
        let mut state = self.begin(FakeCall::Update, ctx)?;
        let key = resource_key(identity)?;

        let resource = state.resources.get_mut(key).ok_or_else(|| not_found(key))?;
        for (name, value) in changes.present() {
            resource.insert(name, value.clone());
        }
        state.updates.push(changes);
        Ok(())
    }

    async fn delete(&self, ctx: &CallContext, identity: &[String]) -> Result<(), RemoteError> {
        let mut state = self.begin(FakeCall::Delete, ctx)?;
        let key = resource_key(identity)?;

        if !state.resources.contains_key(key) || state.deleting.contains_key(key) {
            return Err(not_found(key));
        }
        if state.deletion_delay > 0 {
            let delay = state.deletion_delay;
            state.deleting.insert(key.to_string(), delay);
        } else {
            state.resources.remove(key);
        }
        Ok(())
    }

    async fn poll_status(&self, ctx: &CallContext, identity: &[String]) -> Result<String, RemoteError> {
        let mut state = self.begin(FakeCall::PollStatus, ctx)?;
        resource_key(identity)?;

        let status = match state.statuses.pop_front() {
            Some(status) => status,
            None => state
                .last_status
                .clone()
                .ok_or_else(|| RemoteError::new("FailedOperation", "no status scripted"))?,
        };
        state.last_status = Some(status.clone());
        Ok(status)
    }
}

// =========================================================================
// Lifecycle Helpers
// =========================================================================

/// Run create → read. Returns the identifier and the state after read.
pub async fn lifecycle_create<F: ServiceFacade>(
    reconciler: &Reconciler<F>,
    declared: &AttrMap,
) -> Result<(CompositeId, AttrMap), EngineError> {
    let id = reconciler.create(declared).await?;
    let state = reconciler
        .read(&id)
        .await?
        .ok_or_else(|| vanished(reconciler, &id))?;
    Ok((id, state))
}

/// Run create → read → update → read → delete → read.
///
/// Returns the state read after the update. Fails if the resource is still
/// readable after delete.
pub async fn lifecycle_crud<F: ServiceFacade>(
    reconciler: &Reconciler<F>,
    initial: &AttrMap,
    updated: &AttrMap,
) -> Result<AttrMap, EngineError> {
    let (id, created) = lifecycle_create(reconciler, initial).await?;

    reconciler.update(&id, &created, updated).await?;
    let state = reconciler
        .read(&id)
        .await?
        .ok_or_else(|| vanished(reconciler, &id))?;

    reconciler.delete(&id).await?;
    if reconciler.read(&id).await?.is_some() {
        return Err(EngineError::Configuration(format!(
            "{} '{}' still exists after delete",
            reconciler.definition().type_name,
            id
        )));
    }
    Ok(state)
}

fn vanished<F: ServiceFacade>(reconciler: &Reconciler<F>, id: &CompositeId) -> EngineError {
    EngineError::NotFound(RemoteError::new(
        "ResourceNotFound",
        format!(
            "{} '{}' disappeared during the lifecycle",
            reconciler.definition().type_name,
            id
        ),
    ))
}

// =========================================================================
// Assertion Helpers
// =========================================================================

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

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
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
    use crate::config::EngineConfig;
    use crate::reconciler::{IdentityLayout, ResourceDefinition};
    use crate::retry::{OperationKind, RetryExecutor};
    use crate::schema::{Attribute, Block, Shape};
    use crate::types::AttrValue;
    use std::sync::Arc;

    fn ctx() -> CallContext {
        CallContext::new("log-1", "tencentcloud_vpc", OperationKind::Create)
    }

    fn vpc_reconciler(facade: Arc<FakeFacade>) -> Reconciler<FakeFacade> {
        let block = Block::new()
            .with_attribute("vpc_name", Attribute::required_string())
            .with_attribute("cidr_block", Attribute::required_string().with_force_new())
            .with_attribute("dns_servers", Attribute::optional(Shape::set(Shape::string())))
            .with_attribute("vpc_id", Attribute::computed_string());
        let definition = ResourceDefinition::new("tencentcloud_vpc", block)
            .with_identity(IdentityLayout::new().with_remote_attribute("vpc_id"));
        Reconciler::new(definition, facade, RetryExecutor::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_fake_assigns_sequential_ids() {
        let fake = FakeFacade::new("vpc");
        assert_eq!(fake.create(&ctx(), ApiStruct::new()).await.unwrap(), vec!["vpc-1"]);
        assert_eq!(fake.create(&ctx(), ApiStruct::new()).await.unwrap(), vec!["vpc-2"]);
        assert!(fake.contains("vpc-2"));
        assert_eq!(fake.call_count(FakeCall::Create), 2);
        assert_eq!(fake.log_ids(), vec!["log-1", "log-1"]);
    }

    #[tokio::test]
    async fn test_fake_scripted_failures_are_used_once() {
        let fake = FakeFacade::new("vpc");
        fake.fail_next(FakeCall::Delete, RemoteError::new("InternalError", "boom"));

        let identity = vec!["vpc-9".to_string()];
        let err = fake.delete(&ctx(), &identity).await.unwrap_err();
        assert_eq!(err.code, "InternalError");

        let err = fake.delete(&ctx(), &identity).await.unwrap_err();
        assert_eq!(err.code, "ResourceNotFound");
        assert_eq!(fake.call_count(FakeCall::Delete), 2);
    }

    #[tokio::test]
    async fn test_fake_statuses_repeat_last() {
        let fake = FakeFacade::new("vpc");
        let identity = vec!["vpc-1".to_string()];
        assert!(fake.poll_status(&ctx(), &identity).await.is_err());

        fake.script_statuses(["PENDING", "AVAILABLE"]);
        assert_eq!(fake.poll_status(&ctx(), &identity).await.unwrap(), "PENDING");
        assert_eq!(fake.poll_status(&ctx(), &identity).await.unwrap(), "AVAILABLE");
        assert_eq!(fake.poll_status(&ctx(), &identity).await.unwrap(), "AVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_crud() {
        let facade = Arc::new(FakeFacade::new("vpc"));
        let reconciler = vpc_reconciler(Arc::clone(&facade));

        let initial: AttrMap = [
            ("vpc_name".to_string(), AttrValue::string("main")),
            ("cidr_block".to_string(), AttrValue::string("10.0.0.0/16")),
            (
                "dns_servers".to_string(),
                AttrValue::set(["119.29.29.29".into(), "8.8.8.8".into()]),
            ),
        ]
        .into_iter()
        .collect();
        let mut updated = initial.clone();
        updated.insert("vpc_name".to_string(), AttrValue::string("main-2"));

        let state = lifecycle_crud(&reconciler, &initial, &updated).await.unwrap();

        assert_eq!(state["vpc_name"], AttrValue::string("main-2"));
        assert_eq!(state["vpc_id"], AttrValue::string("vpc-1"));
        assert_eq!(
            state["dns_servers"],
            AttrValue::set(["8.8.8.8".into(), "119.29.29.29".into()])
        );
        assert!(!facade.contains("vpc-1"));
        assert_eq!(facade.updates().len(), 1);

        let log_ids = facade.log_ids();
        assert_ne!(log_ids.first(), log_ids.last());
    }
}
