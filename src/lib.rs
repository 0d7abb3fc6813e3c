//! Football match tracker: match store, mutation handlers, and live score
//! streaming to server-sent-event subscribers.

pub mod api;
pub mod config;
pub mod db;
pub mod live;
pub mod matches;
