pub mod api;
pub mod config;
pub mod detection;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod state;

pub use config::MoodServiceConfig;
pub use error::PredictError;
pub use pipeline::InferencePipeline;
pub use state::MoodServiceState;
