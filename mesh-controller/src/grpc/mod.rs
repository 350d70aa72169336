mod proto;

pub use proto::instance_control_client::InstanceControlClient;
pub use proto::*;
