mod match_service;
mod sync_service;

#[cfg(test)]
mod sync_service_tests;

pub use match_service::{
    ExpressInterestRequest, InterestOutcome, MatchService, MatchServiceDependencies,
};
pub use sync_service::{
    ChatSyncService, ChatSyncServiceDependencies, ResyncSummary, RoomTimeline,
    SendMessageRequest, SendOutcome,
};
