use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::models::{ManagerAction, ManagerId, TaskType};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum CoreErrorKind {
    NotInstalled,
    UnsupportedCapability,
    InvalidInput,
    ParseFailure,
    Timeout,
    Cancelled,
    ProcessFailure,
    StorageFailure,
    Network,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CoreError {
    pub manager: Option<ManagerId>,
    pub task: Option<TaskType>,
    pub action: Option<ManagerAction>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            manager: None,
            task: None,
            action: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_manager(mut self, manager: ManagerId) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn for_action(mut self, action: ManagerAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.manager {
            Some(manager) => write!(
                f,
                "{:?} [{}]: {}",
                self.kind,
                manager.display_name(),
                self.message
            ),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for CoreError {}
