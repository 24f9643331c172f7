//! The evaluation plan: registration queue and single-pass executor

use super::Kernel;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::shape::Shape;
use crate::tensor::{NodeId, StaticArray};
use std::collections::HashMap;

/// Registration token for a node's future materialized result
///
/// Handles are cheap copies carrying only the node identity; the data
/// lives in the plan until [`EvalHandle::data`] hands it out.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EvalHandle {
    id: NodeId,
}

impl EvalHandle {
    pub(crate) fn new(id: NodeId) -> Self {
        Self { id }
    }

    /// Identity of the node this handle refers to
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's materialized result
    ///
    /// Fails with [`Error::NotEvaluated`] if the plan has not evaluated the
    /// node yet; the engine never auto-runs on access. After a successful
    /// run this is idempotent: repeated calls return equal data sharing one
    /// buffer.
    pub fn data<T: Element, R: Runtime>(
        &self,
        plan: &EvalPlan<T, R>,
    ) -> Result<StaticArray<T, R>> {
        plan.node_data(self.id)
    }
}

/// Work recorded for a Registered node
pub(crate) enum PlanStep<T: Element, R: Runtime> {
    /// Already-materialized leaf; evaluation hands its storage back
    Leaf(StaticArray<T, R>),
    /// Snapshot of a dynamic batch, flattened into one allocation at run time
    Gather {
        shape: Shape,
        values: Vec<T>,
        device: R::Device,
    },
    /// Operator application over previously registered operands
    Compute {
        operands: Vec<NodeId>,
        kernel: Kernel<T, R>,
    },
}

enum NodeState<T: Element, R: Runtime> {
    Registered(PlanStep<T, R>),
    Evaluated(StaticArray<T, R>),
    /// Transient placeholder while a step runs
    InFlight,
}

struct PlanNode<T: Element, R: Runtime> {
    id: NodeId,
    state: NodeState<T, R>,
}

/// Explicit evaluation plan: an ordered queue of registered nodes
///
/// Registration appends nodes in post-order (operands before dependents),
/// so the queue order is a topological order of the dependency DAG and a
/// single forward sweep in [`EvalPlan::eval`] satisfies every
/// happens-before edge. Node identity makes registration idempotent:
/// registering a node that is already Registered or Evaluated returns the
/// existing handle without duplicating work.
///
/// The plan is a plain inspectable structure; it holds no global error
/// state, and a failed run leaves every already-Evaluated node intact.
pub struct EvalPlan<T: Element, R: Runtime> {
    nodes: Vec<PlanNode<T, R>>,
    slots: HashMap<NodeId, usize>,
}

impl<T: Element, R: Runtime> EvalPlan<T, R> {
    /// Create an empty plan
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Total number of nodes the plan has ever registered
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes still awaiting evaluation
    pub fn pending(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.state, NodeState::Registered(_)))
            .count()
    }

    /// Whether the node behind `handle` has been evaluated
    pub fn is_evaluated(&self, handle: EvalHandle) -> bool {
        self.slots
            .get(&handle.id())
            .map(|&slot| matches!(self.nodes[slot].state, NodeState::Evaluated(_)))
            .unwrap_or(false)
    }

    /// Register an already-materialized leaf container
    pub(crate) fn register_leaf(&mut self, array: &StaticArray<T, R>) -> EvalHandle {
        self.register(array.id(), || PlanStep::Leaf(array.clone()))
    }

    /// Register a gather of snapshot values into one fresh batch container
    pub(crate) fn register_gather(
        &mut self,
        id: NodeId,
        shape: Shape,
        values: Vec<T>,
        device: R::Device,
    ) -> EvalHandle {
        self.register(id, || PlanStep::Gather {
            shape,
            values,
            device,
        })
    }

    /// Register an operator application over already-registered operands
    pub(crate) fn register_compute(
        &mut self,
        id: NodeId,
        operands: Vec<NodeId>,
        kernel: Kernel<T, R>,
    ) -> EvalHandle {
        self.register(id, || PlanStep::Compute { operands, kernel })
    }

    fn register(
        &mut self,
        id: NodeId,
        step: impl FnOnce() -> PlanStep<T, R>,
    ) -> EvalHandle {
        if !self.slots.contains_key(&id) {
            self.slots.insert(id, self.nodes.len());
            self.nodes.push(PlanNode {
                id,
                state: NodeState::Registered(step()),
            });
        }
        EvalHandle::new(id)
    }

    /// Run the plan
    ///
    /// Walks all Registered nodes in dependency order and transitions each
    /// to Evaluated exactly once, allocating fresh storage for results
    /// (leaves hand back their existing storage). Nodes already Evaluated
    /// by a previous run are skipped. On error the sweep aborts; the
    /// offending node stays Registered and nodes evaluated so far keep
    /// their results, so the plan can be run again.
    pub fn eval(&mut self) -> Result<()> {
        for slot in 0..self.nodes.len() {
            let step = match std::mem::replace(&mut self.nodes[slot].state, NodeState::InFlight)
            {
                NodeState::Registered(step) => step,
                other => {
                    self.nodes[slot].state = other;
                    continue;
                }
            };

            match self.run_step(&step) {
                Ok(result) => self.nodes[slot].state = NodeState::Evaluated(result),
                Err(err) => {
                    self.nodes[slot].state = NodeState::Registered(step);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn run_step(&self, step: &PlanStep<T, R>) -> Result<StaticArray<T, R>> {
        match step {
            PlanStep::Leaf(array) => Ok(array.clone()),
            PlanStep::Gather {
                shape,
                values,
                device,
            } => StaticArray::try_from_slice(values, shape.clone(), device),
            PlanStep::Compute { operands, kernel } => {
                let mut inputs = Vec::with_capacity(operands.len());
                for id in operands {
                    inputs.push(self.node_data(*id)?);
                }
                kernel(&inputs)
            }
        }
    }

    pub(crate) fn node_data(&self, id: NodeId) -> Result<StaticArray<T, R>> {
        let slot = self.slots.get(&id).ok_or(Error::UnknownNode)?;
        match &self.nodes[*slot].state {
            NodeState::Evaluated(array) => Ok(array.clone()),
            NodeState::Registered(_) => Err(Error::NotEvaluated),
            NodeState::InFlight => Err(Error::internal(format!(
                "node {} read while in flight",
                self.nodes[*slot].id
            ))),
        }
    }
}

impl<T: Element, R: Runtime> Default for EvalPlan<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, R: Runtime> std::fmt::Debug for EvalPlan<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalPlan")
            .field("nodes", &self.nodes.len())
            .field("pending", &self.pending())
            .finish()
    }
}
