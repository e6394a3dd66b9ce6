//! 内存区域：本地注册、远端句柄与线缆描述符。

mod descriptor;
mod local;
mod remote;
mod usage;

pub use descriptor::{MR_DESCRIPTOR_SIZE, MrDescriptor, mr_descriptor_size};
pub use local::LocalMr;
pub use remote::RemoteMr;
pub use usage::MrUsage;
