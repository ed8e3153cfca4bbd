pub mod convert;
pub mod error;
pub mod geocode;
pub mod guard;
pub mod handlers;
pub mod image;
pub mod listings;
pub mod middleware;
pub mod normalize;
pub mod reviews;
pub mod state;
pub mod validate;
