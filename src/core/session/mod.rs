//! Session lifecycle, segmentation and ordered delivery.

pub mod delivery;
pub mod manager;
pub mod segmenter;
pub mod session;

pub use delivery::{DeliveryResult, Reassembler};
pub use manager::{SessionManager, SessionManagerConfig};
pub use segmenter::{Emission, Segmenter, LONG_PAUSE_CHUNKS, PARTIAL_STEP_CHUNKS, PRE_ROLL_CHUNKS};
pub use session::{EventSink, Session, SessionEvent, SessionInner, SessionRegistry, SttStats};
