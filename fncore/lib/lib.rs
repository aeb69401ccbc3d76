//! `fncore` is the control plane and execution sandbox of a multi-language
//! FaaS platform.
//!
//! # Overview
//!
//! Given a function definition (runtime, source code, handler name, resource
//! limits, dependency list), fncore provisions an isolated, network-addressable
//! execution unit in a Kubernetes cluster, invokes it with timeout and resource
//! enforcement, tracks per-invocation outcomes, autoscales under load, and
//! tears the unit down cleanly.
//!
//! # Architecture
//!
//! - **Orchestrator**: Deployment/Service/HPA/ConfigMap lifecycle per function
//! - **Gateway**: invocation forwarding with secret injection and full
//!   failure-mode classification
//! - **Coordinator**: retryable deploy/undeploy jobs, admission control and a
//!   circuit breaker in front of invocations
//! - **Scheduler**: reconciliation of scheduled triggers into periodic jobs
//! - **Store**: SQLite persistence of function, invocation and trigger records
//!
//! The execution agent that runs inside each function pod lives in the
//! sibling `fnagent` crate; fncore consumes its wire contract.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fncore::{
//!     config::FncoreConfig,
//!     coordinator::{NoSecrets, TaskCoordinator},
//!     gateway::InvocationGateway,
//!     orchestrator::{cluster_client, KubernetesOrchestrator},
//!     store::db,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FncoreConfig::default();
//!     let pool = db::get_or_create_db_pool(config.get_db_path(), &db::MIGRATOR).await?;
//!
//!     let (client, in_cluster) = cluster_client().await?;
//!     let orchestrator =
//!         KubernetesOrchestrator::new(client, config.get_namespace().clone(), config.registry());
//!     let gateway = InvocationGateway::new(&config, in_cluster);
//!
//!     let _coordinator = TaskCoordinator::new(
//!         pool,
//!         Arc::new(orchestrator),
//!         Arc::new(gateway),
//!         Arc::new(NoSecrets),
//!         &config,
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use error::*;
