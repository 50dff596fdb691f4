extern crate self as strand;

pub use core_affinity;
pub use strand_bytes as bytes;
pub use strand_net as net;
pub use strand_server as server;
pub use strand_store as store;
pub use strand_utils as utils;
pub use strand_wire as wire;
pub use tracing;
