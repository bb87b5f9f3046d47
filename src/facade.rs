//! The boundary to per-resource remote API wrappers.
//!
//! A provider implements [`ServiceFacade`] once per resource type as a thin
//! layer over its SDK client. The engine never talks to the remote API any
//! other way; every facade call is rate limited, classified and retried by the
//! [`RetryExecutor`](crate::retry::RetryExecutor).

use async_trait::async_trait;

use crate::api::ApiStruct;
use crate::error::RemoteError;
use crate::retry::OperationKind;

/// Status reported by [`Reconciler`](crate::reconciler::Reconciler) delete
/// waits once the resource can no longer be described.
pub const STATUS_DELETED: &str = "deleted";

/// Status reported by delete waits while the resource can still be described.
pub const STATUS_DELETING: &str = "deleting";

/// Context passed to every facade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Unique id of the reconciliation flow, for correlating remote logs.
    pub log_id: String,
    /// The resource type being reconciled.
    pub resource_type: String,
    /// The operation the call belongs to.
    pub operation: OperationKind,
}

impl CallContext {
    /// Create a context for one operation on `resource_type`.
    pub fn new(log_id: impl Into<String>, resource_type: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            log_id: log_id.into(),
            resource_type: resource_type.into(),
            operation,
        }
    }
}

/// Remote calls for one resource type.
///
/// `identity` is the decoded composite identifier: the components taken from
/// the declared configuration followed by the fragment returned by
/// [`ServiceFacade::create`].
///
/// # Example
///
/// ```ignore
/// struct SubnetFacade {
///     client: VpcClient,
/// }
///
/// #[async_trait]
/// impl ServiceFacade for SubnetFacade {
///     async fn create(&self, ctx: &CallContext, params: ApiStruct) -> Result<Vec<String>, RemoteError> {
///         let response = self.client.create_subnet(params.to_json()).await?;
///         Ok(vec![response.subnet_id])
///     }
///
///     // describe, delete ...
/// }
/// ```
#[async_trait]
pub trait ServiceFacade: Send + Sync {
    /// Create the resource. Returns the identity fragment assigned by the
    /// remote API (e.g. the new resource id).
    async fn create(&self, ctx: &CallContext, params: ApiStruct) -> Result<Vec<String>, RemoteError>;

    /// Describe the resource. `Ok(None)` means it does not exist.
    async fn describe(
        &self,
        ctx: &CallContext,
        identity: &[String],
    ) -> Result<Option<ApiStruct>, RemoteError>;

    /// Apply changed attributes to the resource. Only changed fields are
    /// present in `changes`.
    ///
    /// The default implementation rejects the call; resource types whose
    /// attributes are all `force_new` never reach it.
    async fn update(
        &self,
        ctx: &CallContext,
        identity: &[String],
        changes: ApiStruct,
    ) -> Result<(), RemoteError> {
        let _ = (identity, changes);
        Err(RemoteError::new(
            "UnsupportedOperation",
            format!("{} does not support in-place updates", ctx.resource_type),
        ))
    }

    /// Delete the resource.
    async fn delete(&self, ctx: &CallContext, identity: &[String]) -> Result<(), RemoteError>;

    /// Fetch the status of the resource's latest asynchronous operation.
    ///
    /// Only called for resource types configured with a waiter.
    async fn poll_status(&self, ctx: &CallContext, identity: &[String]) -> Result<String, RemoteError> {
        let _ = identity;
        Err(RemoteError::new(
            "UnsupportedOperation",
            format!("{} does not report operation status", ctx.resource_type),
        ))
    }
}
