pub mod typ;
pub use typ::CapCode;

pub mod packet;
pub use packet::{CapabilityHeader, CapabilityPacket};

pub mod mp;
pub use mp::CapMultiProtocol;

pub mod refresh;
pub use refresh::{CapEnhancedRefresh, CapRefresh, CapRefreshCisco};

pub mod extend;
pub use extend::CapExtended;

pub mod graceful;
pub use graceful::{CapRestart, RestartValue};

pub mod as4;
pub use as4::CapAs4;

pub mod dynamic;
pub use dynamic::CapDynamic;

pub mod addpath;
pub use addpath::{AddPathSendReceive, AddPathValue, CapAddPath};

pub mod llgr;
pub use llgr::{CapLlgr, LlgrValue};

pub mod fqdn;
pub use fqdn::CapFqdn;

pub mod version;
pub use version::CapVersion;

pub mod path_limit;
pub use path_limit::{CapPathLimit, PathLimitValue};

pub mod unknown;
pub use unknown::CapUnknown;

pub mod emit;
pub use emit::CapEmit;
