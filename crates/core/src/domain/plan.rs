use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompensationSpec {
    pub tool: String,
    pub params: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub tool: String,
    pub params: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationSpec>,
}

impl PlanStep {
    pub fn new(name: impl Into<String>, tool: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            params,
            depends_on: Vec::new(),
            compensation: None,
        }
    }

    pub fn depends_on(mut self, dependencies: &[&str]) -> Self {
        self.depends_on = dependencies.iter().map(|name| name.to_string()).collect();
        self
    }
}

/// A DAG of named steps. Insertion order is preserved so that topological
/// ordering is deterministic for identical input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate step name `{0}`")]
    DuplicateStep(String),
    #[error("unknown step `{0}`")]
    UnknownStep(String),
    #[error("step `{step}` depends on undefined step `{dependency}`")]
    DanglingDependency { step: String, dependency: String },
    #[error("cyclic or unresolved dependencies among steps: {0:?}")]
    CyclicDependencies(Vec<String>),
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: PlanStep) -> Result<(), PlanError> {
        if self.step(&step.name).is_some() {
            return Err(PlanError::DuplicateStep(step.name));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn add_compensation(
        &mut self,
        step_name: &str,
        compensation: CompensationSpec,
    ) -> Result<(), PlanError> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.name == step_name)
            .ok_or_else(|| PlanError::UnknownStep(step_name.to_string()))?;
        step.compensation = Some(compensation);
        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let names: BTreeSet<&str> = self.steps.iter().map(|step| step.name.as_str()).collect();
        for step in &self.steps {
            for dependency in &step.depends_on {
                if !names.contains(dependency.as_str()) {
                    return Err(PlanError::DanglingDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over the dependency graph. Ties among zero-in-degree
    /// steps resolve in insertion order.
    pub fn topo_order(&self) -> Result<Vec<&PlanStep>, PlanError> {
        self.validate()?;

        let index_by_name: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.name.as_str(), index))
            .collect();

        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (index, step) in self.steps.iter().enumerate() {
            for dependency in &step.depends_on {
                let dep_index = index_by_name[dependency.as_str()];
                in_degree[index] += 1;
                dependents[dep_index].push(index);
            }
        }

        let mut order = Vec::with_capacity(self.steps.len());
        let mut emitted = vec![false; self.steps.len()];
        loop {
            let free: Vec<usize> = (0..self.steps.len())
                .filter(|&index| !emitted[index] && in_degree[index] == 0)
                .collect();
            if free.is_empty() {
                break;
            }
            for index in free {
                emitted[index] = true;
                order.push(&self.steps[index]);
                for &dependent in &dependents[index] {
                    in_degree[dependent] -= 1;
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck = self
                .steps
                .iter()
                .enumerate()
                .filter(|(index, _)| !emitted[*index])
                .map(|(_, step)| step.name.clone())
                .collect();
            return Err(PlanError::CyclicDependencies(stuck));
        }

        Ok(order)
    }
}
