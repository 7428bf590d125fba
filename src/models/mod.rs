pub mod enrichment;
pub mod event;
pub mod records;

pub use enrichment::{
    is_unknown_organization, Enrichment, GeoLocation, NetworkProfile, UNKNOWN_ISP,
    UNKNOWN_ORGANIZATION,
};
pub use event::{CollectRequest, Event, ValidationError, SCREEN_RESOLUTION_KEY};
pub use records::{Lead, NewEvent, PruneReport, Session, StoredEvent, Visitor, VisitorUpsert};
