//! Concrete stage implementations

mod execute_turn1;
mod execute_turn2;
mod fetch_historical;
mod fetch_images;
mod finalize_results;
mod initialize;
mod prepare_prompt;
mod store_results;
mod turn_common;

pub use execute_turn1::ExecuteTurn1Stage;
pub use execute_turn2::ExecuteTurn2Stage;
pub use fetch_historical::FetchHistoricalStage;
pub use fetch_images::FetchImagesStage;
pub use finalize_results::FinalizeResultsStage;
pub use initialize::InitializeStage;
pub use prepare_prompt::PrepareSystemPromptStage;
pub use store_results::StoreResultsStage;
