//! Notification vocabulary

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyEvent {
    /// A breakdown was accepted and saved as a draft
    BreakdownReady {
        task_id: String,
        title: String,
        step_count: usize,
        total_minutes: u32,
        /// Built from the offline template rather than the model
        fallback: bool,
    },
    /// A step got children on demand
    StepRefined {
        task_id: String,
        /// 1-based positions from the top level down to the refined step
        path: Vec<u32>,
        child_count: usize,
    },
    /// The draft steps of a task became active
    BreakdownApproved { task_id: String, step_count: usize },
}

impl NotifyEvent {
    pub fn task_id(&self) -> &str {
        match self {
            NotifyEvent::BreakdownReady { task_id, .. }
            | NotifyEvent::StepRefined { task_id, .. }
            | NotifyEvent::BreakdownApproved { task_id, .. } => task_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            NotifyEvent::BreakdownReady { .. } => "BreakdownReady",
            NotifyEvent::StepRefined { .. } => "StepRefined",
            NotifyEvent::BreakdownApproved { .. } => "BreakdownApproved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = NotifyEvent::StepRefined {
            task_id: "t-1".to_string(),
            path: vec![2, 1],
            child_count: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StepRefined");
        assert_eq!(json["path"], serde_json::json!([2, 1]));

        let back: NotifyEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.task_id(), "t-1");
    }
}
