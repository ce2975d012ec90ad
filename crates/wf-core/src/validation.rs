use crate::error::JobError;
use crate::types::{BuildJob, DependencyGraph, JobStatus, PHASE_COUNT, ProjectFile};
use std::collections::{HashMap, HashSet};

pub fn validate_job_status_transition(from: JobStatus, to: JobStatus) -> Result<(), JobError> {
    use JobStatus::{Building, Cancelled, Completed, FailedPhase, FailedTimeout, Planning};

    if from == to {
        return Ok(());
    }

    let valid = match (from, to) {
        (Planning, Building(1)) => true,
        (Planning | Building(_), Cancelled | FailedTimeout) => true,
        (Building(current), Building(next)) => next > current,
        (Building(_), Completed) => true,
        (Building(current), FailedPhase(failed)) => current == failed,
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidTransition { from, to })
    }
}

pub fn validate_phase(phase: u8) -> Result<(), JobError> {
    if (1..=PHASE_COUNT).contains(&phase) {
        Ok(())
    } else {
        Err(JobError::InvalidInput {
            message: format!("phase must be between 1 and {PHASE_COUNT}, got {phase}"),
        })
    }
}

pub fn validate_dependency_graph(graph: &DependencyGraph) -> Result<(), JobError> {
    let invalid = |message: String| JobError::InvalidGraph { message };

    let mut phases: HashMap<&str, u8> = HashMap::new();
    for file in &graph.files {
        if file.path.trim().is_empty() {
            return Err(invalid("planned file has empty path".to_string()));
        }
        if !(1..=PHASE_COUNT).contains(&file.phase) {
            return Err(invalid(format!(
                "{} has phase {} outside 1..={PHASE_COUNT}",
                file.path, file.phase
            )));
        }
        if phases.insert(file.path.as_str(), file.phase).is_some() {
            return Err(invalid(format!("{} planned twice", file.path)));
        }
    }

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for file in &graph.files {
        for dependency in &file.depends_on {
            let Some(dependency_phase) = phases.get(dependency.as_str()) else {
                return Err(invalid(format!(
                    "{} depends on unplanned {dependency}",
                    file.path
                )));
            };
            if *dependency_phase > file.phase {
                return Err(invalid(format!(
                    "{} (phase {}) depends on {dependency} from later phase {dependency_phase}",
                    file.path, file.phase
                )));
            }
            edges
                .entry(file.path.as_str())
                .or_default()
                .push(dependency.as_str());
        }
    }

    for file in &graph.files {
        validate_dependency_cycle(file.path.as_str(), &edges)?;
    }
    Ok(())
}

fn validate_dependency_cycle(start: &str, edges: &HashMap<&str, Vec<&str>>) -> Result<(), JobError> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = edges.get(start).cloned().unwrap_or_default();

    while let Some(current) = stack.pop() {
        if current == start {
            return Err(JobError::InvalidGraph {
                message: format!("dependency cycle through {start}"),
            });
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(children) = edges.get(current) {
            stack.extend(children.iter().copied());
        }
    }

    Ok(())
}

/// Phases own disjoint file sets; a report may not reuse a path recorded by another phase.
pub fn validate_phase_files(
    job: &BuildJob,
    phase: u8,
    files: &[ProjectFile],
) -> Result<(), JobError> {
    validate_phase(phase)?;
    if job.status.is_terminal() {
        return Err(JobError::PhaseConflict {
            phase,
            message: format!("job is already {}", job.status),
        });
    }
    if files.is_empty() {
        return Err(JobError::InvalidInput {
            message: "phase report has no files".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for file in files {
        if !seen.insert(file.path.as_str()) {
            return Err(JobError::InvalidInput {
                message: format!("{} reported twice", file.path),
            });
        }
    }

    for (other_phase, other_files) in &job.phase_files {
        if *other_phase == phase {
            continue;
        }
        if let Some(file) = other_files
            .iter()
            .find(|file| seen.contains(file.path.as_str()))
        {
            return Err(JobError::PhaseConflict {
                phase,
                message: format!("{} already produced by phase {other_phase}", file.path),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlannedFile;

    fn planned(path: &str, phase: u8, depends_on: &[&str]) -> PlannedFile {
        PlannedFile {
            path: path.to_string(),
            phase,
            depends_on: depends_on.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn building_advances_forward_only() {
        assert!(validate_job_status_transition(JobStatus::Building(1), JobStatus::Building(3)).is_ok());
        assert!(
            validate_job_status_transition(JobStatus::Building(3), JobStatus::Building(2)).is_err()
        );
        assert!(validate_job_status_transition(JobStatus::Planning, JobStatus::Building(1)).is_ok());
        assert!(validate_job_status_transition(JobStatus::Planning, JobStatus::Building(2)).is_err());
    }

    #[test]
    fn completion_and_failure_from_building() {
        assert!(validate_job_status_transition(JobStatus::Building(2), JobStatus::Completed).is_ok());
        assert!(
            validate_job_status_transition(JobStatus::Building(2), JobStatus::FailedPhase(2)).is_ok()
        );
        assert!(
            validate_job_status_transition(JobStatus::Building(2), JobStatus::FailedPhase(3))
                .is_err()
        );
        assert!(validate_job_status_transition(JobStatus::Planning, JobStatus::Completed).is_err());
    }

    #[test]
    fn any_active_state_can_cancel_or_time_out() {
        for from in [JobStatus::Planning, JobStatus::Building(4)] {
            assert!(validate_job_status_transition(from, JobStatus::Cancelled).is_ok());
            assert!(validate_job_status_transition(from, JobStatus::FailedTimeout).is_ok());
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [
            JobStatus::Completed,
            JobStatus::FailedPhase(1),
            JobStatus::FailedTimeout,
            JobStatus::Cancelled,
        ] {
            assert!(validate_job_status_transition(from, from).is_ok());
            assert!(matches!(
                validate_job_status_transition(from, JobStatus::Building(1)),
                Err(JobError::InvalidTransition { .. })
            ));
            if from != JobStatus::Cancelled {
                assert!(validate_job_status_transition(from, JobStatus::Cancelled).is_err());
            }
        }
    }

    #[test]
    fn graph_accepts_phase_ordered_dependencies() {
        let graph = DependencyGraph {
            files: vec![
                planned("src/theme.css", 1, &[]),
                planned("src/Header.tsx", 2, &["src/theme.css"]),
                planned("src/App.tsx", 3, &["src/Header.tsx", "src/theme.css"]),
            ],
        };
        assert!(validate_dependency_graph(&graph).is_ok());
    }

    #[test]
    fn graph_rejects_bad_shapes() {
        let duplicate = DependencyGraph {
            files: vec![planned("a.css", 1, &[]), planned("a.css", 2, &[])],
        };
        let out_of_range = DependencyGraph {
            files: vec![planned("a.css", 5, &[])],
        };
        let unknown = DependencyGraph {
            files: vec![planned("a.tsx", 1, &["b.tsx"])],
        };
        let later = DependencyGraph {
            files: vec![planned("a.tsx", 1, &["b.tsx"]), planned("b.tsx", 2, &[])],
        };
        for graph in [duplicate, out_of_range, unknown, later] {
            assert!(matches!(
                validate_dependency_graph(&graph),
                Err(JobError::InvalidGraph { .. })
            ));
        }
    }

    #[test]
    fn graph_rejects_cycles_within_a_phase() {
        let graph = DependencyGraph {
            files: vec![
                planned("a.tsx", 2, &["c.tsx"]),
                planned("b.tsx", 2, &["a.tsx"]),
                planned("c.tsx", 2, &["b.tsx"]),
            ],
        };
        let err = validate_dependency_graph(&graph).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
