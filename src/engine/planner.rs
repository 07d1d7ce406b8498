// src/engine/planner.rs

//! Turns a traversal plan into persisted tasks.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::engine::TaskId;
use crate::engine::task::{ActionType, RequestTask, RowPayload, TaskStatus};
use crate::traversal::Traversal;

/// Build one access task per traversal node — and, for erasure requests, one
/// erasure task per node on top.
///
/// Upstream wiring:
/// - an access task waits for the access tasks of all its prerequisites
///   (reference-edge upstreams plus `after` constraints);
/// - an erasure task waits for its own node's access task (which collects
///   the rows to mask) plus the erasure tasks of the node's `after` targets,
///   so operators control masking order with the same knob.
///
/// `downstream_tasks` is the reverse relation and `all_descendant_tasks` its
/// transitive closure, both computed here at plan time.
pub fn plan_tasks(request_id: &str, action: ActionType, traversal: &Traversal) -> Vec<RequestTask> {
    let mut upstreams: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    let mut tasks: BTreeMap<TaskId, RequestTask> = BTreeMap::new();

    for node in traversal.nodes() {
        let access_id = RequestTask::task_id(request_id, ActionType::Access, &node.address);
        let access_upstreams: Vec<TaskId> = node
            .prerequisites()
            .iter()
            .map(|address| RequestTask::task_id(request_id, ActionType::Access, address))
            .collect();

        tasks.insert(
            access_id.clone(),
            RequestTask {
                id: access_id.clone(),
                request_id: request_id.to_string(),
                address: node.address.clone(),
                action: ActionType::Access,
                status: TaskStatus::Pending,
                upstream_tasks: access_upstreams.clone(),
                downstream_tasks: Vec::new(),
                all_descendant_tasks: Vec::new(),
                incoming: node.incoming.clone(),
                seed_fields: node.seed_fields.clone(),
                rows: RowPayload::None,
                rows_masked: None,
                attempts: 0,
            },
        );
        upstreams.insert(access_id, access_upstreams);

        if action == ActionType::Erasure {
            let erasure_id = RequestTask::task_id(request_id, ActionType::Erasure, &node.address);
            let mut erasure_upstreams =
                vec![RequestTask::task_id(request_id, ActionType::Access, &node.address)];
            erasure_upstreams.extend(
                node.after
                    .iter()
                    .map(|address| RequestTask::task_id(request_id, ActionType::Erasure, address)),
            );

            tasks.insert(
                erasure_id.clone(),
                RequestTask {
                    id: erasure_id.clone(),
                    request_id: request_id.to_string(),
                    address: node.address.clone(),
                    action: ActionType::Erasure,
                    status: TaskStatus::Pending,
                    upstream_tasks: erasure_upstreams.clone(),
                    downstream_tasks: Vec::new(),
                    all_descendant_tasks: Vec::new(),
                    incoming: node.incoming.clone(),
                    seed_fields: node.seed_fields.clone(),
                    rows: RowPayload::None,
                    rows_masked: None,
                    attempts: 0,
                },
            );
            upstreams.insert(erasure_id, erasure_upstreams);
        }
    }

    // Downstream wiring is the reverse of upstream.
    let mut downstreams: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    for (id, ups) in &upstreams {
        for upstream in ups {
            downstreams.entry(upstream.clone()).or_default().push(id.clone());
        }
    }
    for (id, task) in tasks.iter_mut() {
        task.downstream_tasks = downstreams.get(id).cloned().unwrap_or_default();
        task.downstream_tasks.sort();
    }

    for id in upstreams.keys() {
        let descendants = descendant_closure(id, &downstreams);
        if let Some(task) = tasks.get_mut(id) {
            task.all_descendant_tasks = descendants;
        }
    }

    debug!(
        request_id,
        action = action.as_str(),
        tasks = tasks.len(),
        "request tasks planned"
    );

    tasks.into_values().collect()
}

fn descendant_closure(id: &TaskId, downstreams: &BTreeMap<TaskId, Vec<TaskId>>) -> Vec<TaskId> {
    let mut seen: BTreeSet<TaskId> = BTreeSet::new();
    let mut stack: Vec<TaskId> = downstreams.get(id).cloned().unwrap_or_default();

    while let Some(next) = stack.pop() {
        if seen.insert(next.clone()) {
            stack.extend(downstreams.get(&next).cloned().unwrap_or_default());
        }
    }

    seen.into_iter().collect()
}
