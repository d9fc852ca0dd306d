// Saga graph
//
// The dependency structure of a saga. Built once from the interpreted
// requests and validated before anything runs:
// - request ids are unique
// - every parent id resolves to a request
// - the parent relation is acyclic

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::DefinitionError;
use crate::request::SagaRequest;

/// A validated, acyclic graph of saga requests.
#[derive(Debug, Clone)]
pub struct SagaGraph {
	requests: IndexMap<String, SagaRequest>,
	children: HashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
	InProgress,
	Done,
}

impl SagaGraph {
	/// Build and validate a graph. Requests keep their declaration order.
	pub fn new(requests: Vec<SagaRequest>) -> Result<Self, DefinitionError> {
		let mut by_id = IndexMap::with_capacity(requests.len());
		for request in requests {
			if by_id.contains_key(request.id()) {
				return Err(DefinitionError::DuplicateId(request.id().to_string()));
			}
			by_id.insert(request.id().to_string(), request);
		}

		let mut children: HashMap<String, Vec<String>> = HashMap::new();
		for request in by_id.values() {
			for parent in request.parents() {
				if !by_id.contains_key(parent) {
					return Err(DefinitionError::unknown_parent(request.id(), parent));
				}
				let siblings = children.entry(parent.clone()).or_default();
				if !siblings.iter().any(|c| c == request.id()) {
					siblings.push(request.id().to_string());
				}
			}
		}

		let graph = Self {
			requests: by_id,
			children,
		};
		if let Some(cycle) = graph.find_cycle() {
			return Err(DefinitionError::Cycle(cycle));
		}

		debug!(requests = graph.len(), "saga graph validated");
		Ok(graph)
	}

	pub fn len(&self) -> usize {
		self.requests.len()
	}

	pub fn is_empty(&self) -> bool {
		self.requests.is_empty()
	}

	pub fn get(&self, id: &str) -> Option<&SagaRequest> {
		self.requests.get(id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.requests.contains_key(id)
	}

	/// All requests in declaration order.
	pub fn requests(&self) -> impl Iterator<Item = &SagaRequest> {
		self.requests.values()
	}

	/// Requests without parents; eligible to start immediately.
	pub fn roots(&self) -> Vec<&SagaRequest> {
		self.requests.values().filter(|r| r.is_root()).collect()
	}

	/// Direct dependents of `id`.
	pub fn children(&self, id: &str) -> &[String] {
		self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Direct dependencies of `id`.
	pub fn parents(&self, id: &str) -> &[String] {
		self.requests.get(id).map(|r| r.parents()).unwrap_or(&[])
	}

	/// `request` is not in `visited` and every one of its parents is.
	pub fn is_ready(&self, request: &SagaRequest, visited: &HashSet<String>) -> bool {
		!visited.contains(request.id()) && request.parents().iter().all(|p| visited.contains(p))
	}

	/// The requests not yet in `visited` whose every parent is in `visited`.
	pub fn ready_after(&self, visited: &HashSet<String>) -> Vec<&SagaRequest> {
		self
			.requests
			.values()
			.filter(|r| self.is_ready(r, visited))
			.collect()
	}

	/// Children of `id` that are ready given `visited`. Only looks at the
	/// direct dependents of `id`, so it is cheap to call after every commit.
	pub fn ready_children(&self, id: &str, visited: &HashSet<String>) -> Vec<&SagaRequest> {
		self
			.children(id)
			.iter()
			.filter_map(|child| self.requests.get(child))
			.filter(|r| self.is_ready(r, visited))
			.collect()
	}

	/// Topological layers: each layer depends only on earlier layers.
	pub fn layers(&self) -> Vec<Vec<&str>> {
		let mut visited = HashSet::with_capacity(self.len());
		let mut layers = Vec::new();
		loop {
			let layer: Vec<&str> = self.ready_after(&visited).into_iter().map(|r| r.id()).collect();
			if layer.is_empty() {
				break;
			}
			visited.extend(layer.iter().map(|id| id.to_string()));
			layers.push(layer);
		}
		layers
	}

	/// Every request reachable from `id` through child edges.
	pub fn descendants(&self, id: &str) -> HashSet<&str> {
		let mut seen = HashSet::new();
		let mut queue: VecDeque<&str> = self.children(id).iter().map(String::as_str).collect();
		while let Some(next) = queue.pop_front() {
			if seen.insert(next) {
				queue.extend(self.children(next).iter().map(String::as_str));
			}
		}
		seen
	}

	/// Depth-first search with an explicit stack; returns the first cycle found.
	///
	/// Each stack entry holds a request and the index of the next child to
	/// visit, so arbitrarily deep chains do not grow the thread stack.
	fn find_cycle(&self) -> Option<Vec<String>> {
		let mut state: HashMap<&str, Visit> = HashMap::with_capacity(self.len());
		let mut stack: Vec<(&str, usize)> = Vec::new();

		for root in self.requests.keys() {
			if state.contains_key(root.as_str()) {
				continue;
			}
			state.insert(root.as_str(), Visit::InProgress);
			stack.push((root.as_str(), 0));

			while let Some(&(id, next)) = stack.last() {
				let Some(child) = self.children(id).get(next) else {
					state.insert(id, Visit::Done);
					stack.pop();
					continue;
				};
				if let Some(top) = stack.last_mut() {
					top.1 += 1;
				}

				match state.get(child.as_str()) {
					Some(Visit::Done) => {},
					Some(Visit::InProgress) => {
						let start = stack
							.iter()
							.position(|(s, _)| *s == child.as_str())
							.unwrap_or(0);
						let mut cycle: Vec<String> = stack[start..].iter().map(|(s, _)| s.to_string()).collect();
						cycle.push(child.clone());
						return Some(cycle);
					},
					None => {
						state.insert(child.as_str(), Visit::InProgress);
						stack.push((child.as_str(), 0));
					},
				}
			}
		}
		None
	}
}
