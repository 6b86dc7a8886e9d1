pub mod change;
pub mod checkout;
pub mod coalesce;
pub mod errors;
pub mod request;
pub mod source;
pub mod store;

pub use change::{Change, ChangeId};
pub use checkout::{Checkout, CheckoutConfig, CheckoutOutcome, StepStatus};
pub use coalesce::{CoalesceConfig, Coalesced, Coalescer};
pub use errors::{CheckoutError, RequestError, SourceError, StoreError};
pub use request::BuildRequest;
pub use source::{Patch, Revision, SourceSpecifier};
pub use store::{MemoryStore, RecordStore};
