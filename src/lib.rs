//! Hemmer Provider Engine
//!
//! The resource reconciliation engine shared by Hemmer provider resources.
//! A provider describes each resource type once, with a [`Block`] of
//! attributes and a [`ServiceFacade`] of thin remote calls, and the engine
//! does the rest.
//!
//! # Overview
//!
//! - **Attribute marshalling**: [`expand`] a declared attribute tree into the
//!   remote API's request struct and [`flatten`] responses back, keeping
//!   "absent" and "zero" apart.
//! - **Composite identifiers**: [`CompositeId`] joins the components that
//!   name a remote resource into the one string persisted between operations.
//! - **Retries**: [`RetryExecutor`] rate limits every remote call, classifies
//!   failures with a pluggable [`ErrorClassifier`], and retries transient ones
//!   within a read or write time budget.
//! - **State-change waiting**: [`StateWaiter`] polls an asynchronous operation
//!   until it reaches a target status.
//! - **Reconciliation**: [`Reconciler`] sequences the above into create, read,
//!   update, delete and import.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_engine::{
//!     init_logging, EngineConfig, IdentityLayout, OperationKind, Reconciler,
//!     ResourceDefinition, RetryExecutor, StateWaiter,
//!     schema::{Attribute, Block},
//! };
//!
//! let block = Block::new()
//!     .with_attribute("vpc_id", Attribute::required_string().with_force_new())
//!     .with_attribute("subnet_name", Attribute::required_string())
//!     .with_attribute("cidr_block", Attribute::required_string().with_force_new())
//!     .with_attribute("subnet_id", Attribute::computed_string());
//!
//! let definition = ResourceDefinition::new("tencentcloud_subnet", block)
//!     .with_identity(
//!         IdentityLayout::new()
//!             .with_config_attribute("vpc_id")
//!             .with_remote_attribute("subnet_id"),
//!     )
//!     .with_action(OperationKind::Create, "CreateSubnet")
//!     .with_create_wait(StateWaiter::new("DescribeSubnets", ["AVAILABLE"]));
//!
//! init_logging();
//! let executor = RetryExecutor::new(EngineConfig::default());
//! let reconciler = Reconciler::new(definition, Arc::new(SubnetFacade::new(client)), executor);
//!
//! let id = reconciler.create(&declared).await?;
//! let state = reconciler.read(&id).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod facade;
pub mod identifier;
pub mod limiter;
pub mod logging;
pub mod marshal;
pub mod reconciler;
pub mod retry;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;
pub mod waiter;

// Re-export main types at crate root
pub use api::{ApiStruct, ApiValue, Field};
pub use config::{EngineConfig, RateLimitConfig};
pub use error::{EngineError, RemoteError};
pub use facade::{CallContext, ServiceFacade, STATUS_DELETED, STATUS_DELETING};
pub use identifier::{CompositeId, FIELD_SEPARATOR};
pub use limiter::RateLimiter;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use marshal::{expand, flatten};
pub use reconciler::{IdentityLayout, Reconciler, ResourceDefinition};
pub use retry::{DefaultClassifier, ErrorClass, ErrorClassifier, OperationKind, Outcome, RetryExecutor};
pub use schema::{Attribute, Block, Diagnostic, Shape};
pub use types::{AttrMap, AttrSet, AttrValue};
pub use validation::{is_valid, validate, validate_result};
pub use waiter::{PollState, StateWaiter, WaitReport};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
