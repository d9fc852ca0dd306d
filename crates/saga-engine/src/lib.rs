//! A dependency-aware saga coordinator.
//!
//! A saga is a graph of requests against remote services. Each request has a
//! transaction, a compensating action that undoes it and an optional fallback.
//! Requests run concurrently once every parent committed. If a request fails
//! for good, every committed request is compensated in reverse completion
//! order, children before parents.
//!
//! ```no_run
//! use saga_engine::{EngineConfig, JsonFormat, RestConfig, SagaEngine, TransportRegistry};
//!
//! # async fn run(text: &str) -> anyhow::Result<()> {
//! let registry = TransportRegistry::rest(&RestConfig::default())?;
//! let definition = JsonFormat::new(registry).from_json(text)?;
//! let result = SagaEngine::new(EngineConfig::default())
//! 	.run_definition(definition)
//! 	.await?;
//! println!("{}", serde_json::to_string(&result.outcome)?);
//! # Ok(())
//! # }
//! ```

mod compensation;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod graph;
mod ledger;
pub mod operation;
pub mod request;
pub mod result;
mod serdes;
pub mod state;
pub mod telemetry;
pub mod transport;

pub(crate) use serdes::serde_dur_option;

pub use config::{Config, EngineConfig, LogConfig, RestConfig};
pub use definition::{JsonFormat, SagaDefinition};
pub use engine::SagaEngine;
pub use error::{ConfigError, DefinitionError, TransportError};
pub use graph::SagaGraph;
pub use operation::{Operation, OperationKind, Params, SagaResponse};
pub use request::SagaRequest;
pub use result::{SagaOutcome, SagaResult, aggregate};
pub use state::NodeState;
pub use transport::{Transport, TransportRegistry};
