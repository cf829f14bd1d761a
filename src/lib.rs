pub mod codec;
pub mod data;
pub mod error;
pub mod import;
pub mod state;
