//! # Pipeline Stages
//!
//! The three strictly ordered phases of a run.

use serde::{Deserialize, Serialize};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Lead agent locating company documents
    Locating,
    /// Per-company analysts running
    Analyzing,
    /// Building the final report
    Synthesizing,
    Complete,
    Failed,
}

impl PipelineStage {
    /// 1-based phase number for working stages
    pub fn phase_number(&self) -> Option<u8> {
        match self {
            PipelineStage::Locating => Some(1),
            PipelineStage::Analyzing => Some(2),
            PipelineStage::Synthesizing => Some(3),
            PipelineStage::Complete | PipelineStage::Failed => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PipelineStage::Locating => "Document Location",
            PipelineStage::Analyzing => "Company Analysis",
            PipelineStage::Synthesizing => "Report Synthesis",
            PipelineStage::Complete => "Complete",
            PipelineStage::Failed => "Failed",
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stage: PipelineStage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Locating,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next stage. Terminal stages stay put.
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Locating => PipelineStage::Analyzing,
            PipelineStage::Analyzing => PipelineStage::Synthesizing,
            PipelineStage::Synthesizing => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        };
    }

    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_advance() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.stage, PipelineStage::Locating);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Analyzing);
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Synthesizing);
        assert!(!pipeline.is_complete());

        pipeline.advance();
        assert!(pipeline.is_success());
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Complete);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut pipeline = Pipeline::new();
        pipeline.advance();
        pipeline.fail();
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Failed);
        assert!(pipeline.is_complete());
        assert!(!pipeline.is_success());
    }

    #[test]
    fn test_phase_numbers() {
        assert_eq!(PipelineStage::Analyzing.phase_number(), Some(2));
        assert_eq!(PipelineStage::Synthesizing.title(), "Report Synthesis");
        assert_eq!(PipelineStage::Complete.phase_number(), None);
    }
}
