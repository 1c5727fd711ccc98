use crate::error::{GraphError, Result};
use crate::usage::UsageEdges;
use std::fs;
use std::path::Path;

/// Parse a YAML document holding a list of plan-step strings.
pub fn plan_steps_from_yaml(yaml: &str) -> Result<Vec<String>> {
    let steps: Vec<String> = serde_yaml::from_str(yaml)?;
    Ok(steps)
}

/// Read a `.yaml`/`.yml` plan-step list from disk.
pub fn load_plan_steps(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if !is_yaml {
        return Err(GraphError::InvalidPlanSource {
            path: path.display().to_string(),
            reason: "plan steps must be a .yaml or .yml file".to_string(),
        });
    }

    let content = fs::read_to_string(path)?;
    let steps = plan_steps_from_yaml(&content)?;
    log::debug!("Loaded {} plan steps from {}", steps.len(), path.display());
    Ok(steps)
}

/// Read a JSON usage-edge declaration from disk.
pub fn load_usage_edges(path: impl AsRef<Path>) -> Result<UsageEdges> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let usage = UsageEdges::from_json_str(&content)?;
    log::debug!(
        "Loaded {} usage declarations from {}",
        usage.usage_count(),
        path.display()
    );
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_yaml_step_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(
            &path,
            "- \"Step 1:Create a class called Foo.This class will be responsible for math.\"\n\
             - \"Step 2:Create a class called Bar.This class will be responsible for I/O.\"\n",
        )
        .unwrap();

        let steps = load_plan_steps(&path).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[1].contains("Bar"));
    }

    #[test]
    fn rejects_non_yaml_step_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.txt");
        fs::write(&path, "- step").unwrap();

        assert!(matches!(
            load_plan_steps(&path),
            Err(GraphError::InvalidPlanSource { .. })
        ));
    }

    #[test]
    fn step_list_must_be_a_sequence() {
        assert!(matches!(
            plan_steps_from_yaml("steps: 3"),
            Err(GraphError::YamlError(_))
        ));
    }

    #[test]
    fn missing_usage_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_usage_edges(dir.path().join("absent.json")),
            Err(GraphError::IoError(_))
        ));
    }
}
