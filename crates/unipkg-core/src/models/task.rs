use serde::{Deserialize, Serialize};

use crate::models::ManagerAction;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum TaskType {
    Detection,
    Refresh,
    Search,
    Details,
    Sources,
    Install,
    Update,
    Uninstall,
}

impl TaskType {
    pub fn for_action(action: ManagerAction) -> Self {
        match action {
            ManagerAction::Detect => Self::Detection,
            ManagerAction::ListInstalled | ManagerAction::ListUpdates => Self::Refresh,
            ManagerAction::Search => Self::Search,
            ManagerAction::Details => Self::Details,
            ManagerAction::ListSources
            | ManagerAction::AddSource
            | ManagerAction::RemoveSource
            | ManagerAction::RefreshSources => Self::Sources,
            ManagerAction::Install => Self::Install,
            ManagerAction::Update => Self::Update,
            ManagerAction::Uninstall => Self::Uninstall,
        }
    }
}

/// Mutating operation run through the installation coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Install,
    Update,
    Uninstall,
}

impl OperationKind {
    pub fn action(self) -> ManagerAction {
        match self {
            Self::Install => ManagerAction::Install,
            Self::Update => ManagerAction::Update,
            Self::Uninstall => ManagerAction::Uninstall,
        }
    }

    pub fn task_type(self) -> TaskType {
        TaskType::for_action(self.action())
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Install => "installation",
            Self::Update => "update",
            Self::Uninstall => "uninstallation",
        }
    }
}
