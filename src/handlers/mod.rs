pub mod registry;
pub mod router;
pub mod traits;

pub use registry::{HandlerRegistry, Subscription};
pub use router::PublishReport;
pub use traits::{FnHandler, MessageContext, Reply, TextHandler};
