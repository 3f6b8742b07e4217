mod requester;

pub use requester::{RequesterContext, Role};
