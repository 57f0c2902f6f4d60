//! Shapeview: a primitive and OBJ model viewer.
//!
//! The [`scene::SceneController`] keeps an [`engine::Engine`] in step with
//! the selected shape, material and environment; the engine draws through a
//! wgpu [`engine::Renderer`]. The winit front-end in [`app`] presents frames
//! with an egui selector panel on top and drives the controller from the
//! panel, keyboard shortcuts, mouse and dropped files.

pub mod app;
pub mod assets;
pub mod config;
pub mod engine;
pub mod render;
pub mod scene;
pub mod ui;
