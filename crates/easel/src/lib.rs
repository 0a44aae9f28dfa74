pub mod batch;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod generate;
pub mod logging;
pub mod review;

pub use batch::{BatchAccepted, BatchRunner, BatchStatusHandle, BatchStatusSnapshot};
pub use broadcast::{Event, Notification, NotificationHub, Recipient};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, EaselError, ReviewError, Result};
pub use generate::{
    placeholder_url, GenerationQueue, ImageProvider, OpenAiImageProvider, ProviderError,
    SafetyClassifier, WeightedStubClassifier,
};
pub use logging::init_logging;
pub use review::status::{ImageStatus, PromptStatus, ReviewDecision, SafetyLevel};
pub use review::{PromptReviewOutcome, ReviewService, StudentStatus};
