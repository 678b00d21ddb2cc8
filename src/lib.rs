//! Live pose overlay for golf swing capture.
//!
//! Camera frames flow through [`pipeline::VisionProcessor`], which runs a pose
//! detector one frame at a time and hands results to a
//! [`pipeline::ResultHandler`] such as [`swing::SwingTracker`].

pub mod analyzer;
pub mod pipeline;
pub mod pose;
pub mod settings;
pub mod swing;
pub mod types;
