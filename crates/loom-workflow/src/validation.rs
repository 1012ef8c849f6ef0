//! Structural workflow validation: ids, references, cycles. Runs before
//! execution so a bad definition never starts.

use std::collections::{HashMap, HashSet};

use crate::error::WorkflowError;
use crate::types::{StepKind, Workflow, WorkflowStep};

pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
    let mut seen_ids = HashSet::new();
    collect_ids(&workflow.steps, &mut seen_ids)?;

    let top_level: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    for step in &workflow.steps {
        for dep in &step.depends_on {
            if !top_level.contains(dep.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.id
                )));
            }
            if dep == &step.id {
                return Err(WorkflowError::Validation(format!(
                    "step '{}' depends on itself",
                    step.id
                )));
            }
        }
        validate_kind(step)?;
    }

    // Cycle check doubles as the ordering proof.
    topological_order(&workflow.steps)?;
    Ok(())
}

fn collect_ids<'a>(
    steps: &'a [WorkflowStep],
    seen: &mut HashSet<&'a str>,
) -> Result<(), WorkflowError> {
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "step id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::Validation(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        collect_ids(step.kind.sub_steps(), seen)?;
    }
    Ok(())
}

fn validate_kind(step: &WorkflowStep) -> Result<(), WorkflowError> {
    match &step.kind {
        StepKind::Tool { tool, .. } if tool.trim().is_empty() => Err(WorkflowError::Validation(
            format!("step '{}' has an empty tool name", step.id),
        )),
        StepKind::Agent { agent_id, .. } if agent_id.trim().is_empty() => Err(
            WorkflowError::Validation(format!("step '{}' has an empty agent id", step.id)),
        ),
        StepKind::Loop { items, count, .. } if items.is_none() && count.is_none() => Err(
            WorkflowError::Validation(format!("loop step '{}' needs items or count", step.id)),
        ),
        StepKind::Wait {
            duration_ms,
            condition,
            ..
        } if duration_ms.is_none() && condition.is_none() => Err(WorkflowError::Validation(
            format!("wait step '{}' needs a duration or a condition", step.id),
        )),
        _ => Ok(()),
    }
}

/// Depth-first topological visit over the dependency DAG, preserving declared
/// order among independent steps. Cycles are a validation error.
pub fn topological_order(steps: &[WorkflowStep]) -> Result<Vec<&WorkflowStep>, WorkflowError> {
    let by_id: HashMap<&str, &WorkflowStep> =
        steps.iter().map(|step| (step.id.as_str(), step)).collect();

    let mut order = Vec::with_capacity(steps.len());
    let mut done: HashSet<&str> = HashSet::new();
    let mut visiting: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        step: &'a WorkflowStep,
        by_id: &HashMap<&str, &'a WorkflowStep>,
        done: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        order: &mut Vec<&'a WorkflowStep>,
    ) -> Result<(), WorkflowError> {
        if done.contains(step.id.as_str()) {
            return Ok(());
        }
        if !visiting.insert(step.id.as_str()) {
            return Err(WorkflowError::Validation(format!(
                "dependency cycle involving step '{}'",
                step.id
            )));
        }

        for dep in &step.depends_on {
            if let Some(dep_step) = by_id.get(dep.as_str()) {
                visit(dep_step, by_id, done, visiting, order)?;
            }
        }

        visiting.remove(step.id.as_str());
        done.insert(step.id.as_str());
        order.push(step);
        Ok(())
    }

    for step in steps {
        visit(step, &by_id, &mut done, &mut visiting, &mut order)?;
    }

    Ok(order)
}
