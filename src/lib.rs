pub mod api_server;
pub mod audit;
pub mod clock;
pub mod config;
pub mod drafts;
pub mod error;
pub mod events;
pub mod models;
pub mod parser;
pub mod reply;
pub mod scheduling;
pub mod session;
pub mod storage;
pub mod sweeper;
pub mod validation;
pub mod websocket;

pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use drafts::{Confirmation, DraftEdits, DraftLifecycleManager};
pub use error::{CoreError, CoreResult, StoreError};
pub use events::{EventManager, EventPatch, EventRange, NewEvent};
pub use models::{Caller, CalendarEvent, Draft, DraftState, Invite, InviteStatus};
pub use parser::{ExtractionContext, Intent, Interpretation, Interpreter, Language, RuleTables};
pub use scheduling::{AlertDispatcher, AlertSchedule, LogDispatcher};
pub use session::{Outcome, Services, SessionHandler};
pub use storage::Store;
