pub mod config;
pub mod errors;
pub mod logging;
pub mod seeder;
