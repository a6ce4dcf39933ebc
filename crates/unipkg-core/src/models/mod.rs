pub mod error;
pub mod ignored;
pub mod manager;
pub mod options;
pub mod package;
pub mod result_code;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use ignored::IgnoredUpdate;
pub use manager::{
    ActionSafety, Capability, DetectionInfo, ManagerAction, ManagerCapabilities,
    ManagerDescriptor, ManagerId,
};
pub use options::{InstallationOptions, InstallationScope};
pub use package::{
    ManagerSource, NOT_AVAILABLE, Package, PackageDetails, PackageKey, UNKNOWN_SOURCE,
    UpgradablePackage, qualified_source,
};
pub use result_code::OperationResultCode;
pub use task::{OperationKind, TaskId, TaskType};
