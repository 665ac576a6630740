// src/transformation/body.rs

use serde::{Deserialize, Serialize};

use crate::errors::{McProdError, Result};

/// One application step of a production workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub application: String,
    /// `gen`, `sim`, `rec` or `dst`; reconstruction steps declare both
    /// `rec` and `dst` outputs.
    pub datatype: String,
    /// Directory the step writes into (without the per-production part).
    pub output_path: String,
    /// Declared `OutputFile` names.
    pub output_files: Vec<String>,
}

/// Serialized body of a transformation, stored as TOML.
///
/// ```toml
/// kind = "transfer"
/// source_ses = ["CERN-DST-EOS"]
/// target_ses = ["DESY-SRM"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationBody {
    Workflow { steps: Vec<WorkflowStep> },
    Transfer {
        source_ses: Vec<String>,
        target_ses: Vec<String>,
    },
}

impl TransformationBody {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Source and target storage elements of a transfer body.
    pub fn transfer_ses(&self) -> Result<(&[String], &[String])> {
        match self {
            TransformationBody::Transfer {
                source_ses,
                target_ses,
            } if !target_ses.is_empty() => Ok((source_ses, target_ses)),
            TransformationBody::Transfer { .. } => Err(McProdError::ConfigError(
                "transfer body has no target storage elements".to_string(),
            )),
            TransformationBody::Workflow { .. } => Err(McProdError::ConfigError(
                "expected a transfer body, found a workflow".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_body_parses_from_toml() {
        let body = TransformationBody::parse(
            r#"
            kind = "transfer"
            source_ses = ["CERN-DST-EOS"]
            target_ses = ["DESY-SRM", "KEK-SRM"]
            "#,
        )
        .unwrap();
        let (src, dst) = body.transfer_ses().unwrap();
        assert_eq!(src, ["CERN-DST-EOS".to_string()]);
        assert_eq!(dst.len(), 2);
    }

    #[test]
    fn workflow_body_survives_serialization() {
        let body = TransformationBody::Workflow {
            steps: vec![WorkflowStep {
                application: "ddsim".into(),
                datatype: "sim".into(),
                output_path: "/ilc/prod/ilc/mc-opt/ild/sim/500-TDR_ws/4f/ae_ell/ILD_l5_v02/v02-00".into(),
                output_files: vec!["x_sim.slcio".into()],
            }],
        };
        let text = body.to_toml().unwrap();
        assert_eq!(TransformationBody::parse(&text).unwrap(), body);
    }

    #[test]
    fn missing_target_group_is_a_configuration_error() {
        let body = TransformationBody::Transfer {
            source_ses: vec!["A".into()],
            target_ses: vec![],
        };
        assert!(matches!(
            body.transfer_ses(),
            Err(McProdError::ConfigError(_))
        ));
    }
}
