use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Execution stopped")]
    Stopped,

    #[error("Invalid flow: {0}")]
    InvalidFlow(String),

    #[error("Step {0} not found in flow")]
    MissingStep(usize),

    #[error("Host operation failed: {0}")]
    Host(String),

    #[error("Action failed: {0}")]
    Action(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_display() {
        assert_eq!(CoreError::Stopped.to_string(), "Execution stopped");
    }

    #[test]
    fn test_invalid_flow_display() {
        let error = CoreError::InvalidFlow("unknown variant `teleport`".to_string());
        assert_eq!(error.to_string(), "Invalid flow: unknown variant `teleport`");
    }

    #[test]
    fn test_missing_step_display() {
        assert_eq!(
            CoreError::MissingStep(7).to_string(),
            "Step 7 not found in flow"
        );
    }

    #[test]
    fn test_host_display() {
        let error = CoreError::Host("clipboard busy".to_string());
        assert_eq!(error.to_string(), "Host operation failed: clipboard busy");
    }
}
