// Service exports
pub mod archive;
pub mod geocoder;
pub mod ledger;
pub mod remote;
pub mod transfer;
pub mod vision;

pub use archive::{ArchiveError, ArchiveOutcome, ImageArchive};
pub use geocoder::{DisabledGeocoder, Geocoder, NominatimGeocoder};
pub use ledger::{LedgerError, ProcessedLedger};
pub use remote::{MatchService, RateGate, RemoteClient, RemoteError, DEFAULT_BASE_URL};
pub use transfer::{HttpImageFetcher, ImageFetcher, TransferError};
pub use vision::{
    to_classifier_input, Certainties, Classifier, Detector, HttpClassifier, HttpDetector,
    VisionError, WholeFrameDetector,
};
