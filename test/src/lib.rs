pub mod helpers;
pub mod local_link;
pub mod test_protocol;

pub use helpers::*;
pub use local_link::{LocalClientLink, LocalLinkPair, LocalServerLink};
pub use test_protocol::*;
