//! HTTP front door for the delivery engine.
//!
//! - `POST /api/notifications` submits and makes the first attempt
//! - `GET  /api/notifications[?state=...]` lists, newest first
//! - `GET  /api/notifications/stats`
//! - `GET  /api/notifications/{id}` returns status with full attempt history
//! - `POST /api/notifications/{id}/retry` forces an attempt on the current channel
//! - `POST /api/notifications/{id}/cancel` aborts
//! - `GET  /health`

pub mod routes;
pub mod state;
