//! Saga requests: the nodes of a saga graph.

use crate::operation::{Operation, OperationKind};

/// One request of a saga: a transaction with its compensation, an optional
/// fallback, and the ids of the requests it depends on.
#[derive(Debug, Clone)]
pub struct SagaRequest {
	id: String,
	service_name: String,
	kind: OperationKind,
	transaction: Operation,
	compensation: Operation,
	fallback: Option<Operation>,
	parents: Vec<String>,
}

impl SagaRequest {
	pub fn new(
		id: impl Into<String>,
		service_name: impl Into<String>,
		kind: OperationKind,
		transaction: Operation,
	) -> Self {
		Self {
			id: id.into(),
			service_name: service_name.into(),
			kind,
			transaction,
			compensation: Operation::nop(),
			fallback: None,
			parents: Vec::new(),
		}
	}

	pub fn with_compensation(mut self, compensation: Operation) -> Self {
		self.compensation = compensation;
		self
	}

	pub fn with_fallback(mut self, fallback: Operation) -> Self {
		self.fallback = Some(fallback);
		self
	}

	pub fn with_parents<I, S>(mut self, parents: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.parents = parents.into_iter().map(Into::into).collect();
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn service_name(&self) -> &str {
		&self.service_name
	}

	pub fn kind(&self) -> OperationKind {
		self.kind
	}

	pub fn transaction(&self) -> &Operation {
		&self.transaction
	}

	/// The compensating operation; a no-op when none was defined.
	pub fn compensation(&self) -> &Operation {
		&self.compensation
	}

	pub fn fallback(&self) -> Option<&Operation> {
		self.fallback.as_ref()
	}

	/// Ids this request depends on, in declaration order.
	pub fn parents(&self) -> &[String] {
		&self.parents
	}

	pub fn is_root(&self) -> bool {
		self.parents.is_empty()
	}
}
