pub mod api;
pub mod card_service;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod models;
pub mod review_session;
pub mod scheduler;
pub mod store;

pub use card_service::CardService;
pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use models::*;
pub use review_session::{CompletionReason, PendingRating, ReviewSession, SessionSnapshot, SessionState};
pub use scheduler::{Quality, Rating, Sm2Scheduler};
pub use store::{CardStore, InMemoryCardStore};
