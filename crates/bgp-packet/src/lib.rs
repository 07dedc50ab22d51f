pub mod notification;
pub mod open;
pub mod packet;
pub mod parser;
pub mod update;

pub use notification::*;
pub use open::*;
pub use packet::*;
pub use parser::*;
pub use update::*;

pub mod caps;
pub use caps::*;

pub mod afi;
pub use afi::*;

pub mod attrs;
pub use attrs::*;

pub mod error;
pub use error::*;

pub mod label;
pub use label::*;

pub mod bgp_attr;
pub use bgp_attr::*;

pub mod bgp_nexthop;
pub use bgp_nexthop::*;

pub mod bgp_cap;
pub use bgp_cap::*;

pub mod many;
pub use many::many0;

pub mod parse_be;
pub use parse_be::{ParseBe, ParseNlri};

pub mod util;
pub use util::u32_u24;
