//! Execution plan: a server-proposed breakdown of a task into phases and tasks, or, for
//! project execution, into deliverables made of sections.
//!
//! The current plan is replaced wholesale whenever the server sends one. The only in-place
//! changes are local edits made while the user reviews a proposal; those are sent back with
//! `update_plan`. Fields this client does not model are kept in `extra` so the plan goes back
//! to the server with everything it arrived with.

use serde::{Deserialize, Serialize};

pub type Extra = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    #[serde(alias = "draft", alias = "pending_approval")]
    Pending,
    Approved,
    #[serde(alias = "in_progress", alias = "paused")]
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(alias = "running")]
    InProgress,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub done_when: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub objective: String,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// One part of a deliverable (a chapter, a chart, a slide).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section_type: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One output of a project (report, code archive, presentation...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deliverable_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_format: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub objective: String,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliverables: Vec<Deliverable>,
    /// Deliverable ids in the order the server will produce them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_order: Vec<String>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default, alias = "current_phase_index", skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<usize>,
    #[serde(default, alias = "current_task_index", skip_serializing_if = "Option::is_none")]
    pub current_task: Option<usize>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Local edit rejected because the phase or task does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanEditError {
    #[error("no phase with id {0:?}")]
    UnknownPhase(String),
    #[error("no task with id {task:?} in phase {phase:?}")]
    UnknownTask { phase: String, task: String },
    #[error("no deliverable with id {0:?}")]
    UnknownDeliverable(String),
    #[error("no section with id {section:?} in deliverable {deliverable:?}")]
    UnknownSection { deliverable: String, section: String },
}

impl ExecutionPlan {
    pub fn total_tasks(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }

    pub fn completed_tasks(&self) -> usize {
        self.phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Completed fraction in `0.0..=1.0`; an empty plan reports 0.
    pub fn progress(&self) -> f64 {
        match self.total_tasks() {
            0 => 0.0,
            total => self.completed_tasks() as f64 / total as f64,
        }
    }

    /// Mark the plan finished. Every task and phase not already terminal is completed.
    pub fn mark_completed(&mut self) {
        self.status = PlanStatus::Completed;
        for phase in &mut self.phases {
            for task in &mut phase.tasks {
                if matches!(task.status, TaskStatus::Pending | TaskStatus::InProgress) {
                    task.status = TaskStatus::Completed;
                }
            }
            if phase.status != TaskStatus::Failed {
                phase.status = TaskStatus::Completed;
            }
        }
        self.current_phase = None;
        self.current_task = None;
    }

    fn phase_mut(&mut self, phase_id: &str) -> Result<&mut Phase, PlanEditError> {
        self.phases
            .iter_mut()
            .find(|p| p.id == phase_id)
            .ok_or_else(|| PlanEditError::UnknownPhase(phase_id.to_string()))
    }

    pub fn rename_phase(&mut self, phase_id: &str, name: impl Into<String>) -> Result<(), PlanEditError> {
        self.phase_mut(phase_id)?.name = name.into();
        Ok(())
    }

    pub fn rename_task(
        &mut self,
        phase_id: &str,
        task_id: &str,
        name: impl Into<String>,
    ) -> Result<(), PlanEditError> {
        let phase = self.phase_mut(phase_id)?;
        let task = phase
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| PlanEditError::UnknownTask {
                phase: phase_id.to_string(),
                task: task_id.to_string(),
            })?;
        task.name = name.into();
        Ok(())
    }

    pub fn remove_task(&mut self, phase_id: &str, task_id: &str) -> Result<PlanTask, PlanEditError> {
        let phase = self.phase_mut(phase_id)?;
        let idx = phase
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| PlanEditError::UnknownTask {
                phase: phase_id.to_string(),
                task: task_id.to_string(),
            })?;
        Ok(phase.tasks.remove(idx))
    }

    /// Append a task to a phase. The id is derived from the phase id and position so it is
    /// unique within the plan until the server assigns its own.
    pub fn add_task(&mut self, phase_id: &str, name: impl Into<String>) -> Result<String, PlanEditError> {
        let phase = self.phase_mut(phase_id)?;
        let mut n = phase.tasks.len() + 1;
        let mut id = format!("{}-local-{}", phase.id, n);
        while phase.tasks.iter().any(|t| t.id == id) {
            n += 1;
            id = format!("{}-local-{}", phase.id, n);
        }
        phase.tasks.push(PlanTask {
            id: id.clone(),
            name: name.into(),
            done_when: String::new(),
            status: TaskStatus::Pending,
        });
        Ok(id)
    }

    fn deliverable_mut(&mut self, deliverable_id: &str) -> Result<&mut Deliverable, PlanEditError> {
        self.deliverables
            .iter_mut()
            .find(|d| d.id == deliverable_id)
            .ok_or_else(|| PlanEditError::UnknownDeliverable(deliverable_id.to_string()))
    }

    fn section_index(deliverable: &Deliverable, section_id: &str) -> Result<usize, PlanEditError> {
        deliverable
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or_else(|| PlanEditError::UnknownSection {
                deliverable: deliverable.id.clone(),
                section: section_id.to_string(),
            })
    }

    pub fn rename_deliverable(&mut self, deliverable_id: &str, name: impl Into<String>) -> Result<(), PlanEditError> {
        self.deliverable_mut(deliverable_id)?.name = name.into();
        Ok(())
    }

    pub fn rename_section(
        &mut self,
        deliverable_id: &str,
        section_id: &str,
        title: impl Into<String>,
    ) -> Result<(), PlanEditError> {
        let deliverable = self.deliverable_mut(deliverable_id)?;
        let idx = Self::section_index(deliverable, section_id)?;
        deliverable.sections[idx].title = title.into();
        Ok(())
    }

    pub fn remove_section(&mut self, deliverable_id: &str, section_id: &str) -> Result<Section, PlanEditError> {
        let deliverable = self.deliverable_mut(deliverable_id)?;
        let idx = Self::section_index(deliverable, section_id)?;
        Ok(deliverable.sections.remove(idx))
    }

    /// Append a text section to a deliverable, ordered after the existing ones.
    pub fn add_section(&mut self, deliverable_id: &str, title: impl Into<String>) -> Result<String, PlanEditError> {
        let deliverable = self.deliverable_mut(deliverable_id)?;
        let mut n = deliverable.sections.len() + 1;
        let mut id = format!("{}-local-{}", deliverable.id, n);
        while deliverable.sections.iter().any(|s| s.id == id) {
            n += 1;
            id = format!("{}-local-{}", deliverable.id, n);
        }
        let order = deliverable.sections.iter().map(|s| s.order + 1).max().unwrap_or(0);
        deliverable.sections.push(Section {
            id: id.clone(),
            title: title.into(),
            section_type: "text".to_string(),
            order,
            optional: false,
            extra: Extra::new(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionPlan {
        serde_json::from_value(serde_json::json!({
            "id": "p1",
            "title": "Write report",
            "status": "pending_approval",
            "phases": [
                {"id": "ph1", "name": "Research", "tasks": [
                    {"id": "t1", "name": "Search", "status": "completed"},
                    {"id": "t2", "name": "Summarise", "status": "in_progress"}
                ], "status": "in_progress"},
                {"id": "ph2", "name": "Write", "tasks": [
                    {"id": "t3", "name": "Draft"}
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn backend_status_aliases_map_to_plan_status() {
        let p = sample();
        assert_eq!(p.status, PlanStatus::Pending);
        assert_eq!(p.phases[0].status, TaskStatus::InProgress);
        assert_eq!(p.phases[1].status, TaskStatus::Pending);

        let p: ExecutionPlan = serde_json::from_str(r#"{"status":"in_progress"}"#).unwrap();
        assert_eq!(p.status, PlanStatus::Running);
    }

    #[test]
    fn progress_counts_completed_tasks() {
        let p = sample();
        assert_eq!(p.total_tasks(), 3);
        assert_eq!(p.completed_tasks(), 1);
        assert!((p.progress() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(ExecutionPlan::default_empty().progress(), 0.0);
    }

    #[test]
    fn mark_completed_finishes_open_tasks() {
        let mut p = sample();
        p.mark_completed();
        assert_eq!(p.status, PlanStatus::Completed);
        assert_eq!(p.completed_tasks(), 3);
        assert!(p.phases.iter().all(|ph| ph.status == TaskStatus::Completed));
    }

    #[test]
    fn local_edits_patch_in_place() {
        let mut p = sample();
        p.rename_task("ph2", "t3", "Draft sections").unwrap();
        assert_eq!(p.phases[1].tasks[0].name, "Draft sections");

        let id = p.add_task("ph2", "Proofread").unwrap();
        assert_eq!(id, "ph2-local-2");
        assert_eq!(p.phases[1].tasks.len(), 2);

        let removed = p.remove_task("ph1", "t1").unwrap();
        assert_eq!(removed.name, "Search");
        assert_eq!(p.total_tasks(), 3);

        p.rename_phase("ph1", "Investigate").unwrap();
        assert_eq!(p.phases[0].name, "Investigate");
    }

    #[test]
    fn edits_on_unknown_ids_fail() {
        let mut p = sample();
        assert_eq!(
            p.rename_phase("nope", "x"),
            Err(PlanEditError::UnknownPhase("nope".into()))
        );
        assert!(matches!(
            p.remove_task("ph1", "nope"),
            Err(PlanEditError::UnknownTask { .. })
        ));
    }

    fn project() -> ExecutionPlan {
        serde_json::from_value(serde_json::json!({
            "task": "Market study with slides",
            "title": "Market study",
            "deliverables": [
                {"id": "report", "deliverable_type": "report", "name": "Study", "output_format": "pdf",
                 "sections": [
                     {"id": "intro", "title": "Introduction", "section_type": "text", "order": 1,
                      "description": "", "subsections": [], "content_hint": "context"},
                     {"id": "market", "title": "Market", "section_type": "chart", "order": 2}
                 ],
                 "depends_on": [], "tools_required": ["web_search"], "quality_gates": []},
                {"id": "slides", "deliverable_type": "presentation", "name": "Deck", "output_format": "pptx",
                 "sections": [], "depends_on": ["report"]}
            ],
            "execution_order": ["report", "slides"],
            "cross_references": {},
            "user_modified": false
        }))
        .unwrap()
    }

    #[test]
    fn project_plan_keeps_deliverables_and_unknown_fields() {
        let p = project();
        assert_eq!(p.deliverables.len(), 2);
        assert_eq!(p.deliverables[0].sections[1].section_type, "chart");
        assert_eq!(p.deliverables[1].depends_on, vec!["report".to_string()]);
        assert_eq!(p.execution_order, vec!["report", "slides"]);
        assert_eq!(p.extra["task"], "Market study with slides");

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["execution_order"], serde_json::json!(["report", "slides"]));
        assert_eq!(back["user_modified"], false);
        assert_eq!(back["deliverables"][0]["output_format"], "pdf");
        assert_eq!(back["deliverables"][0]["tools_required"], serde_json::json!(["web_search"]));
        assert_eq!(back["deliverables"][0]["sections"][0]["content_hint"], "context");
        let again: ExecutionPlan = serde_json::from_value(back).unwrap();
        assert_eq!(again, p);
    }

    #[test]
    fn planning_plan_reads_objective() {
        let p: ExecutionPlan = serde_json::from_str(
            r#"{"id":"p","title":"T","objective":"Ship it","phases":[],"deliverables":[{"id":"d","name":"Doc","format":"md"}]}"#,
        )
        .unwrap();
        assert_eq!(p.objective, "Ship it");
        assert_eq!(p.deliverables[0].extra["format"], "md");
    }

    #[test]
    fn deliverable_edits_patch_in_place() {
        let mut p = project();
        p.rename_deliverable("slides", "Pitch deck").unwrap();
        assert_eq!(p.deliverables[1].name, "Pitch deck");

        p.rename_section("report", "market", "Market size").unwrap();
        assert_eq!(p.deliverables[0].sections[1].title, "Market size");

        let id = p.add_section("report", "Conclusion").unwrap();
        assert_eq!(id, "report-local-3");
        let added = &p.deliverables[0].sections[2];
        assert_eq!((added.order, added.section_type.as_str()), (3, "text"));

        let removed = p.remove_section("report", "intro").unwrap();
        assert_eq!(removed.title, "Introduction");
        assert_eq!(p.deliverables[0].sections.len(), 2);

        assert_eq!(
            p.rename_deliverable("nope", "x"),
            Err(PlanEditError::UnknownDeliverable("nope".into()))
        );
        assert!(matches!(
            p.remove_section("report", "intro"),
            Err(PlanEditError::UnknownSection { .. })
        ));
    }

    impl ExecutionPlan {
        fn default_empty() -> Self {
            serde_json::from_str("{}").unwrap()
        }
    }
}
