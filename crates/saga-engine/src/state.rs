//! Per-node execution state and the attempt state machines.
//!
//! The engine drives each node through a [`TransactionMachine`] and, when the
//! run has to be undone, through a [`CompensationMachine`]. Both are plain
//! values with no I/O so the exhaustion boundaries can be tested on their own.

use serde::{Deserialize, Serialize};

/// Lifecycle of one node within one saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
	/// Not started. Stays here if the run never reached the node.
	Pending,
	Running,
	Committed,
	FallbackCommitted,
	Failed,
	Compensating,
	Compensated,
	CompensationFailed,
}

impl NodeState {
	/// The node's forward action took effect and must be undone on abort.
	pub fn is_committed(&self) -> bool {
		matches!(self, Self::Committed | Self::FallbackCommitted)
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			Self::Committed
				| Self::FallbackCommitted
				| Self::Failed
				| Self::Compensated
				| Self::CompensationFailed
		)
	}
}

/// Which operation of a request an attempt used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationRole {
	Transaction,
	Fallback,
	Compensation,
}

/// Position of a node's forward state machine.
///
/// Counters are zero based: `Attempting(0)` is the first try, `Attempting(n)`
/// is the n-th retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
	Attempting(u32),
	Fallback(u32),
	Committed,
	FallbackCommitted,
	Failed,
}

/// `Attempting(n) -> {Attempting(n+1), Fallback, Committed}`, then
/// `Fallback(n) -> {Fallback(n+1), FallbackCommitted, Failed}`.
#[derive(Debug, Clone)]
pub struct TransactionMachine {
	phase: TransactionPhase,
	retries: u32,
	fallback_retries: Option<u32>,
}

impl TransactionMachine {
	/// `fallback_retries` is `None` when the request has no fallback.
	pub fn new(retries: u32, fallback_retries: Option<u32>) -> Self {
		Self {
			phase: TransactionPhase::Attempting(0),
			retries,
			fallback_retries,
		}
	}

	pub fn phase(&self) -> TransactionPhase {
		self.phase
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self.phase,
			TransactionPhase::Committed | TransactionPhase::FallbackCommitted | TransactionPhase::Failed
		)
	}

	pub fn on_success(&mut self) -> TransactionPhase {
		self.phase = match self.phase {
			TransactionPhase::Attempting(_) => TransactionPhase::Committed,
			TransactionPhase::Fallback(_) => TransactionPhase::FallbackCommitted,
			terminal => terminal,
		};
		self.phase
	}

	pub fn on_failure(&mut self) -> TransactionPhase {
		self.phase = match self.phase {
			TransactionPhase::Attempting(n) if n < self.retries => TransactionPhase::Attempting(n + 1),
			TransactionPhase::Attempting(_) => match self.fallback_retries {
				Some(_) => TransactionPhase::Fallback(0),
				None => TransactionPhase::Failed,
			},
			TransactionPhase::Fallback(n) if n < self.fallback_retries.unwrap_or(0) => {
				TransactionPhase::Fallback(n + 1)
			},
			TransactionPhase::Fallback(_) => TransactionPhase::Failed,
			terminal => terminal,
		};
		self.phase
	}

	/// The node state this machine has settled in, if any.
	pub fn outcome(&self) -> Option<NodeState> {
		match self.phase {
			TransactionPhase::Committed => Some(NodeState::Committed),
			TransactionPhase::FallbackCommitted => Some(NodeState::FallbackCommitted),
			TransactionPhase::Failed => Some(NodeState::Failed),
			_ => None,
		}
	}
}

/// Position of a node's compensation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationPhase {
	Idle,
	Attempting(u32),
	Compensated,
	Failed,
}

/// `Idle -> Attempting(n) -> {Attempting(n+1), Compensated, Failed}`.
///
/// Both end states are final: once compensated (or out of budget) the machine
/// refuses to start again.
#[derive(Debug, Clone)]
pub struct CompensationMachine {
	phase: CompensationPhase,
	retries: u32,
}

impl CompensationMachine {
	pub fn new(retries: u32) -> Self {
		Self {
			phase: CompensationPhase::Idle,
			retries,
		}
	}

	pub fn phase(&self) -> CompensationPhase {
		self.phase
	}

	/// Enter the first attempt. Returns false if the machine already ran.
	#[must_use]
	pub fn begin(&mut self) -> bool {
		if self.phase != CompensationPhase::Idle {
			return false;
		}
		self.phase = CompensationPhase::Attempting(0);
		true
	}

	pub fn on_success(&mut self) -> CompensationPhase {
		if let CompensationPhase::Attempting(_) = self.phase {
			self.phase = CompensationPhase::Compensated;
		}
		self.phase
	}

	pub fn on_failure(&mut self) -> CompensationPhase {
		self.phase = match self.phase {
			CompensationPhase::Attempting(n) if n < self.retries => CompensationPhase::Attempting(n + 1),
			CompensationPhase::Attempting(_) => CompensationPhase::Failed,
			other => other,
		};
		self.phase
	}

	pub fn outcome(&self) -> Option<NodeState> {
		match self.phase {
			CompensationPhase::Compensated => Some(NodeState::Compensated),
			CompensationPhase::Failed => Some(NodeState::CompensationFailed),
			_ => None,
		}
	}
}
