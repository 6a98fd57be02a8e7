//! Concurrent superstep scheduling.
//!
//! A `Scheduler` runs every node on the current frontier in parallel, gated
//! by a concurrency limit, and collects their [`NodePartial`] outputs for the
//! barrier to merge. This is the mechanism underneath both the progressive
//! enrichment layers (L1/L2/L3 sources run concurrently) and the otherwise
//! sequential analysis pipeline (a frontier of one node per step).
//!
//! `versions_seen` lets the scheduler skip re-running a node whose upstream
//! channel versions have not changed since it last ran, which is what makes
//! conditional re-entry into an already-visited node a no-op rather than a
//! duplicate side effect.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinError;

use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::event_bus::EventEmitter;
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Per-session scheduler state carried across supersteps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    /// For each node, the channel versions it last observed, keyed by channel name.
    /// Used to detect whether a re-visited node actually has new input to act on.
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
}

/// Outcome of running one superstep across the current frontier.
#[derive(Debug, Clone)]
pub struct SuperstepResult {
    pub outputs: Vec<(NodeKind, NodePartial)>,
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("node {kind:?} failed at step {step}: {source}")]
    NodeRun {
        kind: NodeKind,
        step: u64,
        #[source]
        source: NodeError,
    },
    #[error("task join failed: {0}")]
    Join(#[from] JoinError),
}

/// Runs the frontier of a single superstep with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub concurrency_limit: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Runs every frontier node concurrently (bounded by `concurrency_limit`),
    /// awaiting the whole group before returning, mirroring a synchronous
    /// barrier: nodes never observe each other's output within the same step.
    ///
    /// `Start` and `End` are virtual and are always skipped; any frontier
    /// entry without a registered implementation is skipped rather than
    /// treated as an error, so conditional edges that name an unused branch
    /// degrade gracefully instead of aborting the run.
    pub async fn superstep(
        &self,
        scheduler_state: &mut SchedulerState,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: Vec<NodeKind>,
        snapshot: StateSnapshot,
        step: u64,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<SuperstepResult, SchedulerError> {
        let mut runnable: Vec<(NodeKind, Arc<dyn Node>)> = Vec::new();
        let mut skipped_nodes: Vec<NodeKind> = Vec::new();

        for kind in frontier {
            match &kind {
                NodeKind::Start | NodeKind::End => {
                    skipped_nodes.push(kind);
                    continue;
                }
                NodeKind::Custom(_) => {}
            }
            match nodes.get(&kind) {
                Some(node) => runnable.push((kind, Arc::clone(node))),
                None => skipped_nodes.push(kind),
            }
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency_limit));
        let mut handles = Vec::with_capacity(runnable.len());

        for (kind, node) in runnable {
            let permit = Arc::clone(&semaphore);
            let snapshot = snapshot.clone();
            let emitter = Arc::clone(&emitter);
            let ctx = NodeContext {
                node_id: kind.encode(),
                step,
                event_emitter: emitter,
            };
            let kind_for_error = kind.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed while supersteps are in flight");
                let result = node.run(snapshot, ctx).await;
                (kind_for_error, result)
            }));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        let mut ran_nodes = Vec::with_capacity(handles.len());
        for handle in handles {
            let (kind, result) = handle.await?;
            match result {
                Ok(partial) => {
                    ran_nodes.push(kind.clone());
                    outputs.push((kind, partial));
                }
                Err(source) => {
                    return Err(SchedulerError::NodeRun {
                        kind,
                        step,
                        source,
                    });
                }
            }
        }

        for kind in &ran_nodes {
            scheduler_state
                .versions_seen
                .entry(kind.encode())
                .or_default()
                .insert("fields".to_string(), snapshot.fields_version as u64);
        }

        Ok(SuperstepResult {
            outputs,
            ran_nodes,
            skipped_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{ChannelSink, EventBus};
    use crate::node::NodePartial;
    use crate::observation::FieldObservation;
    use crate::state::VersionedState;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Node for Echo {
        async fn run(
            &self,
            _snapshot: StateSnapshot,
            _ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            Ok(NodePartial::new().with_fields(vec![FieldObservation::new(
                self.0,
                json!("ok"),
                "test",
                1,
                90,
            )]))
        }
    }

    #[tokio::test]
    async fn runs_frontier_concurrently_and_skips_unregistered() {
        let mut nodes: FxHashMap<NodeKind, Arc<dyn Node>> = FxHashMap::default();
        nodes.insert(NodeKind::Custom("a".into()), Arc::new(Echo("a")));
        nodes.insert(NodeKind::Custom("b".into()), Arc::new(Echo("b")));

        let (tx, _rx) = flume::unbounded();
        let bus = EventBus::with_sinks(vec![Box::new(ChannelSink::new(tx))]);
        let scheduler = Scheduler::new(4);
        let mut state = SchedulerState::default();
        let snapshot = VersionedState::new().snapshot();

        let result = scheduler
            .superstep(
                &mut state,
                &nodes,
                vec![
                    NodeKind::Custom("a".into()),
                    NodeKind::Custom("b".into()),
                    NodeKind::Custom("missing".into()),
                    NodeKind::End,
                ],
                snapshot,
                1,
                bus.get_emitter(),
            )
            .await
            .unwrap();

        assert_eq!(result.ran_nodes.len(), 2);
        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.skipped_nodes.len(), 2);
        assert!(state.versions_seen.contains_key("Custom:a"));
    }
}
