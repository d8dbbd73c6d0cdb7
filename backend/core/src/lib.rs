pub mod binding;
pub mod error;
pub mod report;
pub mod schedule;
pub mod traits;
pub mod types;

pub use binding::ChatBinding;
pub use error::{PersistenceError, PersistenceErrorKind, ReportError, TransportError};
pub use report::{Nicknames, Report, ReportGenerator, ReportTemplates};
pub use schedule::{describe_remaining, BoundaryParseError, WeeklyBoundary};
pub use traits::{Announcer, PersistenceGateway};
pub use types::{ActivityRecord, ChatId, InboundEvent, UserId};
