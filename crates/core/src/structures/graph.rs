use std::collections::{BTreeSet, HashMap, HashSet};

use crate::errors::ValidationError;
use crate::tasks::{Task, TaskId};

pub(crate) fn position(tasks: &[Task], id: &TaskId) -> Option<usize> {
    tasks.iter().position(|task| &task.id == id)
}

/// Kahn's algorithm over parent links. Among ready tasks the one added
/// first runs first.
pub(crate) fn topological_order(tasks: &[Task]) -> Result<Vec<usize>, ValidationError> {
    let index: HashMap<&TaskId, usize> =
        tasks.iter().enumerate().map(|(position, task)| (&task.id, position)).collect();

    let mut in_degree = vec![0usize; tasks.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (position, task) in tasks.iter().enumerate() {
        for parent_id in &task.parent_ids {
            let parent = *index
                .get(parent_id)
                .ok_or_else(|| ValidationError::UnknownTask(parent_id.clone()))?;
            children[parent].push(position);
            in_degree[position] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(at, _)| at)
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &children[next] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < tasks.len() {
        let stuck = tasks
            .iter()
            .zip(&in_degree)
            .filter(|(_, degree)| **degree > 0)
            .map(|(task, _)| task.id.clone())
            .collect();
        return Err(ValidationError::CyclicGraph(stuck));
    }

    Ok(order)
}

/// Whether `to` can be reached from `from` by following child links.
pub(crate) fn reaches(tasks: &[Task], from: &TaskId, to: &TaskId) -> bool {
    let mut stack = vec![from];
    let mut visited: HashSet<&TaskId> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(at) = position(tasks, current) {
            stack.extend(tasks[at].child_ids.iter());
        }
    }

    false
}

/// Adds `parent -> child` on both tasks, refusing edges that close a cycle.
pub(crate) fn link(
    tasks: &mut [Task],
    parent: &TaskId,
    child: &TaskId,
) -> Result<(), ValidationError> {
    let parent_at =
        position(tasks, parent).ok_or_else(|| ValidationError::UnknownTask(parent.clone()))?;
    let child_at =
        position(tasks, child).ok_or_else(|| ValidationError::UnknownTask(child.clone()))?;

    if reaches(tasks, child, parent) {
        return Err(ValidationError::CycleDetected { parent: parent.clone(), child: child.clone() });
    }

    tasks[parent_at].add_child_id(child.clone());
    tasks[child_at].add_parent_id(parent.clone());
    Ok(())
}

pub(crate) fn unlink(tasks: &mut [Task], parent: &TaskId, child: &TaskId) {
    if let Some(at) = position(tasks, parent) {
        tasks[at].remove_child_id(child);
    }
    if let Some(at) = position(tasks, child) {
        tasks[at].remove_parent_id(parent);
    }
}

/// Every link names a known task, is mirrored on the other end, and no id
/// repeats.
pub(crate) fn check_links(tasks: &[Task]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(ValidationError::DuplicateTask(task.id.clone()));
        }
    }

    for task in tasks {
        for parent_id in &task.parent_ids {
            let parent = position(tasks, parent_id)
                .ok_or_else(|| ValidationError::UnknownTask(parent_id.clone()))?;
            if !tasks[parent].child_ids.contains(&task.id) {
                return Err(ValidationError::UnknownTask(task.id.clone()));
            }
        }
        for child_id in &task.child_ids {
            let child = position(tasks, child_id)
                .ok_or_else(|| ValidationError::UnknownTask(child_id.clone()))?;
            if !tasks[child].parent_ids.contains(&task.id) {
                return Err(ValidationError::UnknownTask(task.id.clone()));
            }
        }
    }

    Ok(())
}

/// Each task's only parent is its predecessor and only child its successor.
pub(crate) fn check_chain(tasks: &[Task]) -> Result<(), ValidationError> {
    for (at, task) in tasks.iter().enumerate() {
        let expected_parent = at.checked_sub(1).map(|before| &tasks[before].id);
        let expected_child = tasks.get(at + 1).map(|after| &after.id);

        let chained = task.parent_ids.iter().eq(expected_parent)
            && task.child_ids.iter().eq(expected_child);
        if !chained {
            return Err(ValidationError::BranchingPipeline(task.id.clone()));
        }
    }
    Ok(())
}
