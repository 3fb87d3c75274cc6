#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod chats;
pub mod error;
pub mod frames;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod notify;
pub mod registry;
pub mod state;

#[cfg(test)]
mod api_tests;


#[cfg(test)]
mod gateway_tests;


#[cfg(test)]
mod notify_tests;

#[cfg(test)]
mod registry_tests;
