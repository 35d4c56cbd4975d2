pub mod app;
pub mod auth;
pub mod components;
pub mod config;
pub mod favorites;
pub mod firestore;
pub mod media;
pub mod models;
pub mod session;
pub mod tmdb;
