pub mod common;
pub mod processor;
pub mod query;
pub mod source;

// Re-export commonly used items
pub use common::{BodyPart, ExtractionRun, MediaType, RawMessage, SkippedMessage, TransferEncoding};
pub use processor::OrderEmailProcessor;
pub use query::ExtractionQuery;
pub use source::{MailSource, MessagePage, SearchPager, SourceFuture};
