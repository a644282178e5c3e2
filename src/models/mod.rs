// Model exports
pub mod candidate;
pub mod profile;
pub mod responses;

pub use candidate::{Candidate, Coordinates, Gender, Job, ParseError, MILES_TO_KM, UNKNOWN_NAME};
pub use profile::{Account, GenderFilter, Profile};
pub use responses::{Decision, LikeOutcome};
