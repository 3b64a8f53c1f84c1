mod rw_split;
mod selector;

pub use rw_split::{Dispatcher, Resolution, RouteTarget, RwSplitter};
pub use selector::{ReadRouter, RoundRobinCursor, RouteSource, RouterError, RoutingDecision};
