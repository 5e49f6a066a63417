pub mod background_jobs;
pub mod comment_service;
pub mod vote_service;
