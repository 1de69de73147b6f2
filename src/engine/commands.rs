//! Operator command surface
//!
//! Every command is also expressible as a tagged JSON object so
//! line-oriented hosts can drive the engine:
//!
//! ```json
//! {"command": "selectUnit", "cellId": "B01-L01"}
//! {"command": "rework", "cellId": "B01-L01"}
//! {"command": "evaluate", "metrics": {"pour_temp_c": 16.4}}
//! {"command": "acknowledgeImpact", "type": "schedule", "id": "IMP-000003"}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ImpactType, MetricsInput, RulePatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum OperatorCommand {
    /// Make a pending cell the active unit
    #[serde(rename_all = "camelCase")]
    SelectUnit { cell_id: String },
    Approve,
    Reject,
    /// Return a rejected cell to pending; the focused cell when no id is given
    #[serde(rename_all = "camelCase")]
    Rework {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cell_id: Option<String>,
    },
    DismissAlarm { id: String },
    AcknowledgeImpact {
        #[serde(rename = "type")]
        kind: ImpactType,
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    PatchRule { rule_id: String, patch: RulePatch },
    ToggleAutoAdvance { enabled: bool },
    /// Evaluate the active cell's current stage with metric overrides
    Evaluate {
        #[serde(default)]
        metrics: MetricsInput,
    },
    Snapshot,
}

impl OperatorCommand {
    /// Command name as used in the JSON tag
    pub fn name(&self) -> &'static str {
        match self {
            OperatorCommand::SelectUnit { .. } => "selectUnit",
            OperatorCommand::Approve => "approve",
            OperatorCommand::Reject => "reject",
            OperatorCommand::Rework { .. } => "rework",
            OperatorCommand::DismissAlarm { .. } => "dismissAlarm",
            OperatorCommand::AcknowledgeImpact { .. } => "acknowledgeImpact",
            OperatorCommand::PatchRule { .. } => "patchRule",
            OperatorCommand::ToggleAutoAdvance { .. } => "toggleAutoAdvance",
            OperatorCommand::Evaluate { .. } => "evaluate",
            OperatorCommand::Snapshot => "snapshot",
        }
    }

    /// Commands that only read state
    pub fn is_read_only(&self) -> bool {
        matches!(self, OperatorCommand::Snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[test]
    fn test_parse_select_unit() {
        let cmd: OperatorCommand =
            serde_json::from_str(r#"{"command":"selectUnit","cellId":"B01-L01"}"#).expect("parse");
        assert_eq!(cmd, OperatorCommand::SelectUnit { cell_id: "B01-L01".to_string() });
        assert_eq!(cmd.name(), "selectUnit");
    }

    #[test]
    fn test_parse_unit_commands() {
        let cmd: OperatorCommand = serde_json::from_str(r#"{"command":"approve"}"#).expect("parse");
        assert_eq!(cmd, OperatorCommand::Approve);
        let cmd: OperatorCommand = serde_json::from_str(r#"{"command":"snapshot"}"#).expect("parse");
        assert!(cmd.is_read_only());
    }

    #[test]
    fn test_parse_rework_with_and_without_cell() {
        let cmd: OperatorCommand = serde_json::from_str(r#"{"command":"rework"}"#).expect("parse");
        assert_eq!(cmd, OperatorCommand::Rework { cell_id: None });
        let cmd: OperatorCommand =
            serde_json::from_str(r#"{"command":"rework","cellId":"B02-L01"}"#).expect("parse");
        assert_eq!(cmd, OperatorCommand::Rework { cell_id: Some("B02-L01".to_string()) });
        assert_eq!(cmd.name(), "rework");
    }

    #[test]
    fn test_parse_patch_and_impact() {
        let cmd: OperatorCommand = serde_json::from_str(
            r#"{"command":"patchRule","ruleId":"PLC-001","patch":{"severity":"LOW"}}"#,
        )
        .expect("parse");
        match cmd {
            OperatorCommand::PatchRule { rule_id, patch } => {
                assert_eq!(rule_id, "PLC-001");
                assert_eq!(patch.severity, Some(Severity::Low));
                assert!(patch.threshold_low.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        let cmd: OperatorCommand = serde_json::from_str(
            r#"{"command":"acknowledgeImpact","type":"scm","id":"IMP-000001"}"#,
        )
        .expect("parse");
        assert_eq!(
            cmd,
            OperatorCommand::AcknowledgeImpact { kind: ImpactType::Scm, id: "IMP-000001".into() }
        );
    }

    #[test]
    fn test_evaluate_metrics_default_empty() {
        let cmd: OperatorCommand = serde_json::from_str(r#"{"command":"evaluate"}"#).expect("parse");
        assert_eq!(cmd, OperatorCommand::Evaluate { metrics: MetricsInput::new() });
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<OperatorCommand>(r#"{"command":"launch"}"#).is_err());
    }
}
