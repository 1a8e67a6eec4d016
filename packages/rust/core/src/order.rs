//! Execution order for a pipeline run.
//!
//! Roles run in phase order (indexers, enrichers, renderers). Within a role
//! components are topologically sorted over their same-role dependencies;
//! ties go to the lowest registration index, so the order is identical on
//! every call for the same registry and request.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use workspacebuilder_shared::{ComponentId, Result, Role, WorkspaceBuilderError};

use crate::component::{ComponentRegistry, RegisteredComponent};

/// Compute the components to run and their order.
///
/// An empty `requested` list selects every registered component. Otherwise
/// the requested components plus everything they transitively depend on
/// are selected.
pub fn resolve_order(
    registry: &ComponentRegistry,
    requested: &[ComponentId],
) -> Result<Vec<ComponentId>> {
    let selected = closure(registry, requested)?;

    let mut order = Vec::with_capacity(selected.len());
    for role in Role::ALL {
        let mut members: Vec<&RegisteredComponent> = selected
            .iter()
            .copied()
            .filter(|c| c.role() == role)
            .collect();
        members.sort_by_key(|c| c.index());
        order.extend(sort_role(registry, &members)?);
    }

    tracing::debug!(
        order = %order.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        "execution order resolved"
    );
    Ok(order)
}

// ---------------------------------------------------------------------------
// Closure
// ---------------------------------------------------------------------------

fn closure<'r>(
    registry: &'r ComponentRegistry,
    requested: &[ComponentId],
) -> Result<Vec<&'r RegisteredComponent>> {
    let mut queue: VecDeque<&RegisteredComponent> = VecDeque::new();
    if requested.is_empty() {
        queue.extend(registry.iter());
    } else {
        for id in requested {
            let component = registry
                .get(id)
                .ok_or_else(|| WorkspaceBuilderError::ComponentNotFound { id: id.clone() })?;
            queue.push_back(component);
        }
    }

    let mut seen: HashSet<&ComponentId> = HashSet::new();
    let mut selected = Vec::new();
    while let Some(component) = queue.pop_front() {
        if !seen.insert(component.id()) {
            continue;
        }
        for dep in component.dependencies() {
            let dep_id = dep.id();
            let upstream = registry.get(&dep_id).ok_or_else(|| {
                WorkspaceBuilderError::ComponentDependencyNotFound {
                    missing: dep_id.clone(),
                    declared_by: component.id().clone(),
                }
            })?;
            if dep.role > component.role() {
                return Err(WorkspaceBuilderError::InvalidDependencyRole {
                    dependency: dep_id,
                    declared_by: component.id().clone(),
                });
            }
            queue.push_back(upstream);
        }
        selected.push(component);
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Per-role topological sort
// ---------------------------------------------------------------------------

/// Kahn's algorithm over same-role edges. `members` is sorted by
/// registration index.
fn sort_role(
    registry: &ComponentRegistry,
    members: &[&RegisteredComponent],
) -> Result<Vec<ComponentId>> {
    let by_index: HashMap<usize, &RegisteredComponent> =
        members.iter().map(|c| (c.index(), *c)).collect();

    // Same-role upstream indexes per member, and the reverse edges.
    let mut upstream: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    let mut downstream: HashMap<usize, Vec<usize>> = HashMap::new();
    for member in members {
        let deps: BTreeSet<usize> = member
            .dependencies()
            .iter()
            .filter(|d| d.role == member.role())
            .filter_map(|d| registry.get(&d.id()))
            .map(RegisteredComponent::index)
            .collect();
        for &dep in &deps {
            downstream.entry(dep).or_default().push(member.index());
        }
        upstream.insert(member.index(), deps);
    }

    let mut remaining: HashMap<usize, usize> = upstream
        .iter()
        .map(|(&idx, deps)| (idx, deps.len()))
        .collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(&idx, _)| idx)
        .collect();

    let mut sorted = Vec::with_capacity(members.len());
    while let Some(idx) = ready.pop_first() {
        remaining.remove(&idx);
        sorted.push(by_index[&idx].id().clone());
        for next in downstream.get(&idx).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if !remaining.is_empty() {
        let cycle = find_cycle(&upstream, &remaining, &by_index);
        if let Some(member) = cycle.first().cloned() {
            return Err(WorkspaceBuilderError::ComponentDependencyCycle { member, cycle });
        }
        return Err(WorkspaceBuilderError::validation(format!(
            "{} components could not be ordered",
            remaining.len()
        )));
    }
    Ok(sorted)
}

/// Walk dependency edges among the unsorted nodes until a node repeats.
///
/// Every unsorted node still has an unsorted dependency, so the walk always
/// closes a loop.
fn find_cycle(
    upstream: &HashMap<usize, BTreeSet<usize>>,
    remaining: &HashMap<usize, usize>,
    by_index: &HashMap<usize, &RegisteredComponent>,
) -> Vec<ComponentId> {
    let Some(&start) = remaining.keys().min() else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = path.iter().position(|&n| n == current) {
            return path[pos..]
                .iter()
                .map(|idx| by_index[idx].id().clone())
                .collect();
        }
        path.push(current);
        let next = upstream
            .get(&current)
            .and_then(|deps| deps.iter().find(|d| remaining.contains_key(d)));
        match next {
            Some(&n) => current = n,
            None => return Vec::new(),
        }
    }
}
