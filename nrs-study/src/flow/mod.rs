//! Experiment flow controller
//!
//! - `gate`: which step a session may enter
//! - `condition`: experimental arm for new participants
//! - `selector`: main article and recommendations per round
//! - `recorder`: transactional writes of answers and ratings

pub mod condition;
pub mod gate;
pub mod recorder;
pub mod selector;

pub use condition::ConditionAssigner;
pub use gate::{Access, Step};
pub use recorder::{persist, record, RecordContext, RoundUpdate, SectionData};
pub use selector::{MainCheck, RoundTopics, SelectionError, Selector};
