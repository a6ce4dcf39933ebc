use serde::Serialize;

/// Result code reported when an install, update or uninstall finishes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum OperationResultCode {
    OperationSucceeded,
    Failed,
    IncorrectHash,
    NeedsRestart,
    NoApplicableUpdateFound,
    NeedsElevation,
    NeedsScoopElevation,
    NeedsPipElevation,
    Cancelled,
    Other(i32),
}

impl OperationResultCode {
    pub fn code(self) -> i32 {
        match self {
            Self::OperationSucceeded => 0,
            Self::Failed => 1,
            Self::IncorrectHash => 2,
            Self::NeedsRestart => 3,
            Self::NoApplicableUpdateFound => 92849,
            Self::NeedsElevation => 1603,
            Self::NeedsScoopElevation => -200,
            Self::NeedsPipElevation => -100,
            Self::Cancelled => 4,
            Self::Other(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::OperationSucceeded | Self::NeedsRestart | Self::NoApplicableUpdateFound
        )
    }

    pub fn needs_elevation(self) -> bool {
        matches!(
            self,
            Self::NeedsElevation | Self::NeedsScoopElevation | Self::NeedsPipElevation
        )
    }
}
