pub mod context;
pub mod error;
pub mod hostspec;
pub mod profile;
pub mod time;

pub use context::{ContextFlags, ContextHandle, ContextKind};
pub use error::{Error, Result};
pub use hostspec::{HostAttributes, HostSpec, parse_host_target};
pub use profile::{InDomProfile, InstanceProfile, ProfileState};
pub use time::{Direction, TimeMode, Timeval, WindowState};
