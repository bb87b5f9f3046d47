//! Resource reconciliation.
//!
//! A [`Reconciler`] drives one resource type through its lifecycle using a
//! [`ServiceFacade`] for the remote calls:
//!
//! - **Create**: expand the declared tree, create, wait, return the composite id.
//! - **Read**: describe by composite id and flatten; `None` once the resource
//!   is gone.
//! - **Update**: send only the changed attributes, then wait.
//! - **Delete**: delete (already gone counts as deleted), then wait.
//! - **Import**: validate an id supplied by the user and read it.
//!
//! Each operation is one sequential flow. Reconcilers for different resources
//! can run concurrently; they share only the executor's rate limiter.
//!
//! # Example
//!
//! ```ignore
//! let definition = ResourceDefinition::new("tencentcloud_subnet", subnet_block())
//!     .with_identity(IdentityLayout::new().with_remote_attribute("subnet_id"))
//!     .with_action(OperationKind::Create, "CreateSubnet")
//!     .with_create_wait(StateWaiter::new("DescribeSubnets", ["AVAILABLE"]).with_pending(["PENDING"]));
//!
//! let reconciler = Reconciler::new(definition, Arc::new(facade), RetryExecutor::new(config));
//! let id = reconciler.create(&declared).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use crate::error::{EngineError, RemoteError};
use crate::facade::{CallContext, ServiceFacade, STATUS_DELETED, STATUS_DELETING};
use crate::identifier::CompositeId;
use crate::logging::{new_log_id, operation_span};
use crate::marshal::{expand, flatten};
use crate::retry::{ErrorClass, OperationKind, RetryExecutor};
use crate::schema::{Attribute, Block, Diagnostic, ScalarKind, Shape};
use crate::types::{AttrMap, AttrValue};
use crate::validation::validate;
use crate::waiter::{StateWaiter, WaitReport};

/// Which attributes make up a resource's composite identifier.
///
/// The identifier is the values of the config attributes, in order, followed
/// by the fragment the remote API returns from create, in order. On read the
/// components are written back into the same attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityLayout {
    config_attributes: Vec<String>,
    remote_attributes: Vec<String>,
}

impl IdentityLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component taken from the declared configuration.
    pub fn with_config_attribute(mut self, name: impl Into<String>) -> Self {
        self.config_attributes.push(name.into());
        self
    }

    /// Add a component returned by the remote create call.
    pub fn with_remote_attribute(mut self, name: impl Into<String>) -> Self {
        self.remote_attributes.push(name.into());
        self
    }

    /// Total number of components.
    pub fn len(&self) -> usize {
        self.config_attributes.len() + self.remote_attributes.len()
    }

    /// Whether the layout has no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute names of all components, in identifier order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.config_attributes
            .iter()
            .chain(&self.remote_attributes)
            .map(String::as_str)
    }
}

/// Everything the engine needs to know about one resource type.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    /// The resource type name (e.g. `tencentcloud_subnet`).
    pub type_name: String,
    /// The attribute block.
    pub block: Block,
    /// The composite identifier layout.
    pub identity: IdentityLayout,
    actions: HashMap<OperationKind, String>,
    create_wait: Option<StateWaiter>,
    update_wait: Option<StateWaiter>,
    delete_wait: Option<StateWaiter>,
}

impl ResourceDefinition {
    /// Create a definition whose identifier is one remote `id` component.
    pub fn new(type_name: impl Into<String>, block: Block) -> Self {
        Self {
            type_name: type_name.into(),
            block,
            identity: IdentityLayout::new().with_remote_attribute("id"),
            actions: HashMap::new(),
            create_wait: None,
            update_wait: None,
            delete_wait: None,
        }
    }

    /// Set the identifier layout.
    pub fn with_identity(mut self, identity: IdentityLayout) -> Self {
        self.identity = identity;
        self
    }

    /// Name the remote API action used for `kind`, for rate limiting and logs.
    pub fn with_action(mut self, kind: OperationKind, action: impl Into<String>) -> Self {
        self.actions.insert(kind, action.into());
        self
    }

    /// Wait for this status change after create.
    pub fn with_create_wait(mut self, waiter: StateWaiter) -> Self {
        self.create_wait = Some(waiter);
        self
    }

    /// Wait for this status change after update.
    pub fn with_update_wait(mut self, waiter: StateWaiter) -> Self {
        self.update_wait = Some(waiter);
        self
    }

    /// Wait for this status change after delete. Statuses are
    /// [`STATUS_DELETED`] once the resource can no longer be described and
    /// [`STATUS_DELETING`] before.
    pub fn with_delete_wait(mut self, waiter: StateWaiter) -> Self {
        self.delete_wait = Some(waiter);
        self
    }

    /// The action name for `kind`, defaulting to `<type_name>.<kind>`.
    pub fn action(&self, kind: OperationKind) -> String {
        self.actions
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| format!("{}.{}", self.type_name, kind))
    }
}

/// Drives create, read, update, delete and import for one resource type.
#[derive(Debug)]
pub struct Reconciler<F> {
    definition: ResourceDefinition,
    facade: Arc<F>,
    executor: RetryExecutor,
}

impl<F: ServiceFacade> Reconciler<F> {
    /// Create a reconciler.
    pub fn new(definition: ResourceDefinition, facade: Arc<F>, executor: RetryExecutor) -> Self {
        Self {
            definition,
            facade,
            executor,
        }
    }

    /// The resource definition.
    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    /// The service facade.
    pub fn facade(&self) -> &Arc<F> {
        &self.facade
    }

    /// Check a declared tree against the resource's block without any remote
    /// call.
    pub fn validate(&self, declared: &AttrMap) -> Vec<Diagnostic> {
        validate(&self.definition.block, declared)
    }

    /// Create the resource declared by `declared` and return its identifier.
    ///
    /// If the remote create succeeds but the wait that follows fails, the
    /// error is [`EngineError::PartiallyApplied`] carrying the new identifier.
    pub async fn create(&self, declared: &AttrMap) -> Result<CompositeId, EngineError> {
        let ctx = self.context(OperationKind::Create);
        let span = operation_span(&ctx.resource_type, ctx.operation, &ctx.log_id);
        timed(self.create_in(&ctx, declared)).instrument(span).await
    }

    /// Read the resource. `Ok(None)` means it no longer exists.
    pub async fn read(&self, id: &CompositeId) -> Result<Option<AttrMap>, EngineError> {
        let ctx = self.context(OperationKind::Read);
        let span = operation_span(&ctx.resource_type, ctx.operation, &ctx.log_id);
        timed(self.read_in(&ctx, id)).instrument(span).await
    }

    /// Apply the difference between `prior` and `declared`.
    ///
    /// Returns the names of the changed attributes. Changing a `force_new`
    /// attribute fails with [`EngineError::ImmutableAttribute`] before any
    /// remote call.
    pub async fn update(
        &self,
        id: &CompositeId,
        prior: &AttrMap,
        declared: &AttrMap,
    ) -> Result<Vec<String>, EngineError> {
        let ctx = self.context(OperationKind::Update);
        let span = operation_span(&ctx.resource_type, ctx.operation, &ctx.log_id);
        timed(self.update_in(&ctx, id, prior, declared))
            .instrument(span)
            .await
    }

    /// Delete the resource. Deleting a resource that is already gone succeeds.
    pub async fn delete(&self, id: &CompositeId) -> Result<(), EngineError> {
        let ctx = self.context(OperationKind::Delete);
        let span = operation_span(&ctx.resource_type, ctx.operation, &ctx.log_id);
        timed(self.delete_in(&ctx, id)).instrument(span).await
    }

    /// Import an existing resource by its identifier.
    pub async fn import(&self, id: &str) -> Result<(CompositeId, AttrMap), EngineError> {
        let ctx = self.context(OperationKind::Read);
        let span = tracing::info_span!(
            "import",
            resource_type = %ctx.resource_type,
            log_id = %ctx.log_id,
        );
        timed(self.import_in(&ctx, id)).instrument(span).await
    }

    fn context(&self, operation: OperationKind) -> CallContext {
        CallContext::new(new_log_id(), self.definition.type_name.clone(), operation)
    }

    async fn create_in(&self, ctx: &CallContext, declared: &AttrMap) -> Result<CompositeId, EngineError> {
        let def = &self.definition;
        let mut components = self.config_components(declared)?;
        let params = expand(declared, &def.block)?;

        let action = def.action(OperationKind::Create);
        let fragment = self
            .executor
            .invoke(OperationKind::Create, &action, || {
                self.facade.create(ctx, params.clone())
            })
            .await?;

        let returned = fragment.len();
        components.extend(fragment);
        let id = CompositeId::from_components(&components);

        if returned != def.identity.remote_attributes.len() {
            let source = EngineError::Identifier {
                id: id.to_string(),
                reason: format!(
                    "create returned {} identity components, expected {}",
                    returned,
                    def.identity.remote_attributes.len()
                ),
            };
            return Err(partially_applied(&id, source));
        }
        info!(id = %id, "Resource created");

        if let Some(waiter) = &def.create_wait {
            self.wait_status(ctx, waiter, &components)
                .await
                .map_err(|source| partially_applied(&id, source))?;
        }
        Ok(id)
    }

    async fn read_in(&self, ctx: &CallContext, id: &CompositeId) -> Result<Option<AttrMap>, EngineError> {
        let def = &self.definition;
        let components = id.components(def.identity.len())?;

        let action = def.action(OperationKind::Read);
        let described = match self
            .executor
            .invoke(OperationKind::Read, &action, || {
                self.facade.describe(ctx, &components)
            })
            .await
        {
            Ok(described) => described,
            Err(EngineError::NotFound(e)) => {
                debug!(code = %e.code, message = %e.message, "Describe reported not found");
                None
            }
            Err(e) => return Err(e),
        };

        let Some(graph) = described else {
            info!(id = %id, "Resource no longer exists");
            return Ok(None);
        };

        let mut tree = flatten(&graph, &def.block)?;
        for (name, component) in def.identity.attributes().zip(components) {
            let Some(attr) = def.block.attribute(name) else {
                continue;
            };
            tree.insert(name.to_string(), identity_value(name, attr, component)?);
        }
        Ok(Some(tree))
    }

    async fn update_in(
        &self,
        ctx: &CallContext,
        id: &CompositeId,
        prior: &AttrMap,
        declared: &AttrMap,
    ) -> Result<Vec<String>, EngineError> {
        let def = &self.definition;
        let components = id.components(def.identity.len())?;

        let changed: Vec<String> = def
            .block
            .attributes
            .iter()
            .filter(|(_, attr)| !attr.flags.is_read_only())
            .filter(|(name, _)| prior.get(name) != declared.get(name))
            .map(|(name, _)| name.clone())
            .collect();

        if changed.is_empty() {
            debug!("No changes to apply");
            return Ok(changed);
        }
        if let Some(name) = changed
            .iter()
            .find(|name| def.block.attribute(name).is_some_and(|attr| attr.force_new))
        {
            return Err(EngineError::ImmutableAttribute(name.clone()));
        }

        let changed_block = Block {
            attributes: def
                .block
                .attributes
                .iter()
                .filter(|(name, _)| changed.contains(name))
                .cloned()
                .collect(),
            description: None,
        };
        let changes = expand(declared, &changed_block)?;

        let action = def.action(OperationKind::Update);
        let applied = self
            .executor
            .invoke_idempotent(OperationKind::Update, &action, || {
                self.facade.update(ctx, &components, changes.clone())
            })
            .await?;

        if applied.is_some() {
            if let Some(waiter) = &def.update_wait {
                self.wait_status(ctx, waiter, &components)
                    .await
                    .map_err(|source| partially_applied(id, source))?;
            }
        }
        info!(id = %id, changed = ?changed, "Resource updated");
        Ok(changed)
    }

    async fn delete_in(&self, ctx: &CallContext, id: &CompositeId) -> Result<(), EngineError> {
        let def = &self.definition;
        let components = id.components(def.identity.len())?;

        let action = def.action(OperationKind::Delete);
        let deleted = self
            .executor
            .invoke_idempotent(OperationKind::Delete, &action, || {
                self.facade.delete(ctx, &components)
            })
            .await?;

        if deleted.is_none() {
            return Ok(());
        }
        if let Some(waiter) = &def.delete_wait {
            waiter
                .wait(&self.executor, || self.deletion_status(ctx, &components))
                .await?;
        }
        info!(id = %id, "Resource deleted");
        Ok(())
    }

    async fn import_in(&self, ctx: &CallContext, id: &str) -> Result<(CompositeId, AttrMap), EngineError> {
        let id = CompositeId::from_persisted(id);
        id.components(self.definition.identity.len())?;

        match self.read_in(ctx, &id).await? {
            Some(tree) => Ok((id, tree)),
            None => Err(EngineError::NotFound(RemoteError::new(
                "ResourceNotFound",
                format!("{} '{}' does not exist", self.definition.type_name, id),
            ))),
        }
    }

    fn config_components(&self, declared: &AttrMap) -> Result<Vec<String>, EngineError> {
        self.definition
            .identity
            .config_attributes
            .iter()
            .map(|name| match declared.get(name) {
                Some(AttrValue::String(s)) => Ok(s.clone()),
                Some(AttrValue::Int(n)) => Ok(n.to_string()),
                Some(other) => Err(EngineError::type_mismatch(name, "string", other.type_name())),
                None => Err(EngineError::MalformedShape { path: name.clone() }),
            })
            .collect()
    }

    async fn wait_status(
        &self,
        ctx: &CallContext,
        waiter: &StateWaiter,
        components: &[String],
    ) -> Result<WaitReport, EngineError> {
        waiter
            .wait(&self.executor, || self.facade.poll_status(ctx, components))
            .await
    }

    async fn deletion_status(&self, ctx: &CallContext, components: &[String]) -> Result<String, RemoteError> {
        match self.facade.describe(ctx, components).await {
            Ok(Some(_)) => Ok(STATUS_DELETING.to_string()),
            Ok(None) => Ok(STATUS_DELETED.to_string()),
            Err(e) if self.executor.classify(OperationKind::Read, &e) == ErrorClass::NotFound => {
                Ok(STATUS_DELETED.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

/// Convert an identifier component back to the attribute's declared shape.
fn identity_value(name: &str, attr: &Attribute, component: String) -> Result<AttrValue, EngineError> {
    match attr.shape {
        Shape::Scalar(ScalarKind::Int64 | ScalarKind::UInt64) => match component.parse::<i64>() {
            Ok(n) => Ok(AttrValue::Int(n)),
            Err(_) => Err(EngineError::Identifier {
                id: component,
                reason: format!("component for '{}' is not an integer", name),
            }),
        },
        _ => Ok(AttrValue::String(component)),
    }
}

fn partially_applied(id: &CompositeId, source: EngineError) -> EngineError {
    EngineError::PartiallyApplied {
        id: id.to_string(),
        source: Box::new(source),
    }
}

async fn timed<T>(operation: impl Future<Output = Result<T, EngineError>>) -> Result<T, EngineError> {
    let start = Instant::now();
    let result = operation.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(elapsed_ms, "Operation finished"),
        Err(e) => warn!(elapsed_ms, error = %e, "Operation failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiValue;
    use crate::config::EngineConfig;
    use crate::testing::{FakeCall, FakeFacade};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn subnet_block() -> Block {
        Block::new()
            .with_attribute("vpc_id", Attribute::required_string().with_force_new())
            .with_attribute("subnet_name", Attribute::required_string())
            .with_attribute("cidr_block", Attribute::required_string().with_force_new())
            .with_attribute("is_multicast", Attribute::optional_bool())
            .with_attribute("tags", Attribute::optional(Shape::map(Shape::string())))
            .with_attribute("subnet_id", Attribute::computed_string())
            .with_attribute("create_time", Attribute::computed_string())
    }

    fn definition() -> ResourceDefinition {
        ResourceDefinition::new("tencentcloud_subnet", subnet_block())
            .with_identity(
                IdentityLayout::new()
                    .with_config_attribute("vpc_id")
                    .with_remote_attribute("subnet_id"),
            )
            .with_action(OperationKind::Create, "CreateSubnet")
            .with_action(OperationKind::Read, "DescribeSubnets")
            .with_action(OperationKind::Update, "ModifySubnetAttribute")
            .with_action(OperationKind::Delete, "DeleteSubnet")
    }

    fn reconciler(definition: ResourceDefinition) -> (Reconciler<FakeFacade>, Arc<FakeFacade>) {
        let facade = Arc::new(FakeFacade::new("subnet").with_computed(
            "CreateTime",
            ApiValue::String("2024-01-01 00:00:00".to_string()),
        ));
        let executor = RetryExecutor::new(EngineConfig::default());
        (
            Reconciler::new(definition, Arc::clone(&facade), executor),
            facade,
        )
    }

    fn declared() -> AttrMap {
        AttrMap::from([
            ("vpc_id".to_string(), AttrValue::string("vpc-1")),
            ("subnet_name".to_string(), AttrValue::string("web")),
            ("cidr_block".to_string(), AttrValue::string("10.0.1.0/24")),
            ("is_multicast".to_string(), AttrValue::Bool(false)),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_read() {
        let (reconciler, facade) = reconciler(definition());

        let id = assert_ok!(reconciler.create(&declared()).await);
        assert_eq!(id.as_str(), "vpc-1#subnet-1");

        let sent = facade.created_params();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].get("IsMulticast"),
            crate::api::Field::Present(&ApiValue::Bool(false))
        );
        assert!(sent[0].get("Tags").is_absent());
        assert!(sent[0].get("SubnetId").is_absent());

        let tree = assert_ok!(reconciler.read(&id).await).unwrap();
        assert_eq!(tree["subnet_name"], AttrValue::string("web"));
        assert_eq!(tree["is_multicast"], AttrValue::Bool(false));
        assert_eq!(tree["vpc_id"], AttrValue::string("vpc-1"));
        assert_eq!(tree["subnet_id"], AttrValue::string("subnet-1"));
        assert_eq!(tree["create_time"], AttrValue::string("2024-01-01 00:00:00"));
        assert!(!tree.contains_key("tags"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_missing_required_before_remote_call() {
        let (reconciler, facade) = reconciler(definition());
        let mut tree = declared();
        tree.remove("subnet_name");

        let err = assert_err!(reconciler.create(&tree).await);
        assert!(matches!(err, EngineError::MalformedShape { ref path } if path == "subnet_name"));
        assert_eq!(facade.call_count(FakeCall::Create), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_transient_errors() {
        let (reconciler, facade) = reconciler(definition());
        facade.fail_next(
            FakeCall::Create,
            RemoteError::new("RequestLimitExceeded", "slow down"),
        );

        assert_ok!(reconciler.create(&declared()).await);
        assert_eq!(facade.call_count(FakeCall::Create), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_surfaces_fatal_error_verbatim() {
        let (reconciler, facade) = reconciler(definition());
        facade.fail_next(
            FakeCall::Create,
            RemoteError::new("InvalidParameterValue.SubnetConflict", "cidr overlaps subnet-9")
                .with_request_id("req-42"),
        );

        let err = assert_err!(reconciler.create(&declared()).await);
        let remote = err.remote_error().unwrap();
        assert_eq!(remote.code, "InvalidParameterValue.SubnetConflict");
        assert_eq!(remote.message, "cidr overlaps subnet-9");
        assert_eq!(remote.request_id.as_deref(), Some("req-42"));
        assert_eq!(facade.call_count(FakeCall::Create), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_target_status() {
        let definition = definition().with_create_wait(
            StateWaiter::new("DescribeSubnets", ["AVAILABLE"]).with_pending(["PENDING"]),
        );
        let (reconciler, facade) = reconciler(definition);
        facade.script_statuses(["PENDING", "PENDING", "AVAILABLE"]);

        assert_ok!(reconciler.create(&declared()).await);
        assert_eq!(facade.call_count(FakeCall::PollStatus), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wait_reports_partial_create() {
        let definition = definition().with_create_wait(
            StateWaiter::new("DescribeSubnets", ["AVAILABLE"])
                .with_pending(["PENDING"])
                .with_timeout(Duration::from_millis(2500)),
        );
        let (reconciler, facade) = reconciler(definition);
        facade.script_statuses(["PENDING"]);

        let err = assert_err!(reconciler.create(&declared()).await);
        assert_eq!(err.partial_id(), Some("vpc-1#subnet-1"));
        match err {
            EngineError::PartiallyApplied { source, .. } => {
                assert!(matches!(
                    *source,
                    EngineError::DeadlineExceeded { ref last_status, .. }
                        if last_status.as_deref() == Some("PENDING")
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(facade.contains("subnet-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_resource_is_none() {
        let (reconciler, facade) = reconciler(definition());
        let id = CompositeId::from_persisted("vpc-1#subnet-404");

        assert_eq!(assert_ok!(reconciler.read(&id).await), None);

        facade.fail_next(
            FakeCall::Describe,
            RemoteError::new("ResourceNotFound", "no such subnet"),
        );
        assert_eq!(assert_ok!(reconciler.read(&id).await), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_rejects_corrupt_identifier() {
        let (reconciler, facade) = reconciler(definition());
        let id = CompositeId::from_persisted("subnet-1");

        let err = assert_err!(reconciler.read(&id).await);
        assert!(matches!(err, EngineError::Identifier { .. }));
        assert_eq!(facade.call_count(FakeCall::Describe), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sends_only_changed_attributes() {
        let (reconciler, facade) = reconciler(definition());
        let id = assert_ok!(reconciler.create(&declared()).await);

        let mut next = declared();
        next.insert("subnet_name".to_string(), AttrValue::string("web-2"));
        next.insert(
            "tags".to_string(),
            AttrValue::map([("env", AttrValue::string("prod"))]),
        );

        let changed = assert_ok!(reconciler.update(&id, &declared(), &next).await);
        assert_eq!(changed, vec!["subnet_name", "tags"]);

        let updates = facade.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].present_len(), 2);
        assert!(updates[0].get("VpcId").is_absent());
        assert!(updates[0].get("IsMulticast").is_absent());

        let tree = assert_ok!(reconciler.read(&id).await).unwrap();
        assert_eq!(tree["subnet_name"], AttrValue::string("web-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_rejects_force_new_change() {
        let (reconciler, facade) = reconciler(definition());
        let id = assert_ok!(reconciler.create(&declared()).await);

        let mut next = declared();
        next.insert("cidr_block".to_string(), AttrValue::string("10.0.2.0/24"));
        next.insert("subnet_name".to_string(), AttrValue::string("web-2"));

        let err = assert_err!(reconciler.update(&id, &declared(), &next).await);
        assert!(matches!(err, EngineError::ImmutableAttribute(ref name) if name == "cidr_block"));
        assert_eq!(facade.call_count(FakeCall::Update), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_without_changes_makes_no_call() {
        let (reconciler, facade) = reconciler(definition());
        let id = assert_ok!(reconciler.create(&declared()).await);

        let changed = assert_ok!(reconciler.update(&id, &declared(), &declared()).await);
        assert!(changed.is_empty());
        assert_eq!(facade.call_count(FakeCall::Update), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let (reconciler, facade) = reconciler(definition());
        let id = assert_ok!(reconciler.create(&declared()).await);

        assert_ok!(reconciler.delete(&id).await);
        assert!(!facade.contains("subnet-1"));

        assert_ok!(reconciler.delete(&id).await);
        assert_eq!(facade.call_count(FakeCall::Delete), 2);
        assert_eq!(assert_ok!(reconciler.read(&id).await), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_gone() {
        let definition = definition().with_delete_wait(StateWaiter::new(
            "DescribeSubnets",
            [STATUS_DELETED],
        ));
        let (reconciler, facade) = reconciler(definition);
        let id = assert_ok!(reconciler.create(&declared()).await);
        facade.delay_deletion(2);

        assert_ok!(reconciler.delete(&id).await);
        assert!(!facade.contains("subnet-1"));
        assert_eq!(facade.call_count(FakeCall::Describe), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_import() {
        let (reconciler, facade) = reconciler(definition());
        facade.insert(
            "subnet-7",
            crate::api::ApiStruct::new()
                .with("VpcId", ApiValue::String("vpc-1".to_string()))
                .with("SubnetName", ApiValue::String("db".to_string()))
                .with("CidrBlock", ApiValue::String("10.0.7.0/24".to_string())),
        );

        let (id, tree) = assert_ok!(reconciler.import("vpc-1#subnet-7").await);
        assert_eq!(id.as_str(), "vpc-1#subnet-7");
        assert_eq!(tree["subnet_name"], AttrValue::string("db"));
        assert_eq!(tree["subnet_id"], AttrValue::string("subnet-7"));

        let err = assert_err!(reconciler.import("vpc-1#subnet-8").await);
        assert!(err.is_not_found());

        let err = assert_err!(reconciler.import("subnet-7").await);
        assert!(matches!(err, EngineError::Identifier { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_create_fragment_reports_partial_create() {
        let definition = ResourceDefinition::new(
            "tencentcloud_subnet",
            subnet_block().with_attribute("route_table_id", Attribute::computed_string()),
        )
        .with_identity(
            IdentityLayout::new()
                .with_config_attribute("vpc_id")
                .with_remote_attribute("subnet_id")
                .with_remote_attribute("route_table_id"),
        );
        let (reconciler, facade) = reconciler(definition);

        let err = assert_err!(reconciler.create(&declared()).await);
        assert_eq!(err.partial_id(), Some("vpc-1#subnet-1"));
        match err {
            EngineError::PartiallyApplied { source, .. } => {
                assert!(matches!(*source, EngineError::Identifier { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(facade.contains("subnet-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_integer_identity_reads_back_as_declared() {
        let block = Block::new()
            .with_attribute("zone_id", Attribute::required_int64().with_force_new())
            .with_attribute("subnet_name", Attribute::required_string())
            .with_attribute("subnet_id", Attribute::computed_string());
        let definition = ResourceDefinition::new("tencentcloud_subnet", block).with_identity(
            IdentityLayout::new()
                .with_config_attribute("zone_id")
                .with_remote_attribute("subnet_id"),
        );
        let (reconciler, facade) = reconciler(definition);
        let declared = AttrMap::from([
            ("zone_id".to_string(), AttrValue::Int(5)),
            ("subnet_name".to_string(), AttrValue::string("web")),
        ]);

        let id = assert_ok!(reconciler.create(&declared).await);
        assert_eq!(id.as_str(), "5#subnet-1");

        let state = assert_ok!(reconciler.read(&id).await).unwrap();
        assert_eq!(state["zone_id"], AttrValue::Int(5));

        let changed = assert_ok!(reconciler.update(&id, &state, &declared).await);
        assert!(changed.is_empty());
        assert_eq!(facade.call_count(FakeCall::Update), 0);

        let err = assert_err!(reconciler.read(&CompositeId::from_persisted("zone-a#subnet-1")).await);
        assert!(matches!(err, EngineError::Identifier { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeclared_identity_attribute_not_written() {
        let block = Block::new().with_attribute("vpc_name", Attribute::required_string());
        let (reconciler, _) = reconciler(ResourceDefinition::new("tencentcloud_vpc", block));
        let declared = AttrMap::from([("vpc_name".to_string(), AttrValue::string("main"))]);

        let id = assert_ok!(reconciler.create(&declared).await);
        assert_eq!(id.as_str(), "subnet-1");

        let state = assert_ok!(reconciler.read(&id).await).unwrap();
        assert!(!state.contains_key("id"));
        assert!(reconciler.validate(&state).is_empty());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let (reconciler, _) = reconciler(definition());
        let mut tree = declared();
        tree.remove("subnet_name");
        tree.insert("is_multicast".to_string(), AttrValue::string("yes"));

        let diagnostics = reconciler.validate(&tree);
        assert_eq!(diagnostics.len(), 2);
        crate::testing::assert_error_contains(&diagnostics, "subnet_name");
        crate::testing::assert_error_contains(&diagnostics, "is_multicast");
    }

    #[test]
    fn test_default_action_names() {
        let def = ResourceDefinition::new("tencentcloud_vpc", Block::new())
            .with_action(OperationKind::Create, "CreateVpc");
        assert_eq!(def.action(OperationKind::Create), "CreateVpc");
        assert_eq!(def.action(OperationKind::Delete), "tencentcloud_vpc.delete");
        assert_eq!(def.identity.attributes().collect::<Vec<_>>(), vec!["id"]);
    }
}
