pub mod allocator;
pub mod memory_store;
pub mod metrics;
pub mod mongo_store;
pub mod notify;
pub mod store;

pub use allocator::{ClaimAllocator, ClaimError, ClaimOutcome, LeadEligibility, RemainderInfo};
pub use memory_store::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use mongo_store::MongoStore;
pub use notify::Notifier;
pub use store::CrmStore;
