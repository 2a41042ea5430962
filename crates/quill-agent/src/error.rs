//! Failures raised inside one loop iteration.

use quill_providers::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The task was aborted. Never counted against the error budget.
    #[error("task aborted")]
    Cancelled,

    #[error("LLM request failed: {0}")]
    Provider(ProviderError),

    #[error("the same tool call ({tool}) was repeated {count} times in a row; try a different approach")]
    RepeatedToolCalls { tool: String, count: u32 },
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        if err.is_cancelled() {
            AgentError::Cancelled
        } else {
            AgentError::Provider(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_cancellation_maps_to_cancelled() {
        assert!(AgentError::from(ProviderError::Cancelled).is_cancelled());
        let err = AgentError::from(ProviderError::Request("connection reset".into()));
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "LLM request failed: request failed: connection reset");
    }
}
